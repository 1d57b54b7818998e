//! Sorting view contract and the in-memory implementation.

use crate::error::{Error, Result};
use crate::extractor::recording::check_segment;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Unit identifier within a sorting.
pub type UnitId = u32;

/// Per-unit spike frame indices, frame-aligned with a companion recording.
///
/// Immutable once constructed; unit IDs are stable unless an explicit
/// subset view is taken with [`VecSortingView::select_units`].
pub trait SortingView: Send + Sync {
    /// Number of segments, matching the companion recording.
    fn num_segments(&self) -> usize;

    /// Ordered unit IDs.
    fn unit_ids(&self) -> &[UnitId];

    /// Spike frames of one unit in one segment, monotonically non-decreasing.
    ///
    /// Fails with [`Error::UnknownUnit`] for absent unit IDs.
    fn unit_spike_frames(&self, unit_id: UnitId, segment: usize) -> Result<&[u64]>;

    /// Fingerprint of this sorting's construction history.
    fn fingerprint(&self) -> &Fingerprint;

    /// Total spike count of one unit across all segments.
    fn unit_spike_count(&self, unit_id: UnitId) -> Result<u64> {
        let mut total = 0u64;
        for segment in 0..self.num_segments() {
            total += self.unit_spike_frames(unit_id, segment)?.len() as u64;
        }
        Ok(total)
    }
}

/// JSON interchange form of a sorting.
#[derive(Debug, Serialize, Deserialize)]
struct SortingJson {
    num_segments: usize,
    units: BTreeMap<String, Vec<Vec<u64>>>,
}

/// In-memory sorting, also the parse target for sorter outputs.
#[derive(Debug)]
pub struct VecSortingView {
    unit_ids: Vec<UnitId>,
    // unit -> per-segment spike frames
    spikes: BTreeMap<UnitId, Vec<Vec<u64>>>,
    num_segments: usize,
    fingerprint: Fingerprint,
}

impl VecSortingView {
    /// Build a sorting from per-unit, per-segment spike frames.
    ///
    /// Every unit must carry exactly `num_segments` frame vectors, each
    /// sorted in non-decreasing order.
    pub fn new(spikes: BTreeMap<UnitId, Vec<Vec<u64>>>, num_segments: usize) -> Result<Self> {
        for (unit_id, segments) in &spikes {
            if segments.len() != num_segments {
                return Err(Error::Internal {
                    message: format!(
                        "unit {unit_id} has {} segments, expected {num_segments}",
                        segments.len()
                    ),
                });
            }
            for (segment, frames) in segments.iter().enumerate() {
                if frames.windows(2).any(|w| w[0] > w[1]) {
                    return Err(Error::UnsortedSpikeFrames {
                        unit_id: *unit_id,
                        segment,
                    });
                }
            }
        }
        let unit_ids: Vec<UnitId> = spikes.keys().copied().collect();
        let fingerprint = Self::fingerprint_of(&spikes, num_segments)?;
        Ok(Self {
            unit_ids,
            spikes,
            num_segments,
            fingerprint,
        })
    }

    /// Load a sorting from its JSON interchange file.
    ///
    /// This is the artifact format of the JSON sorter protocol and of
    /// companion sortings referenced by recording descriptors. Spike
    /// frames are sorted on load; external tools are not trusted to emit
    /// them in order.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::SortingParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let parsed: SortingJson =
            serde_json::from_str(&text).map_err(|e| Error::SortingParse {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;

        let mut spikes = BTreeMap::new();
        for (unit_key, mut segments) in parsed.units {
            let unit_id: UnitId = unit_key.parse().map_err(|_| Error::SortingParse {
                path: path.to_path_buf(),
                source: format!("unit id '{unit_key}' is not an integer").into(),
            })?;
            if segments.len() != parsed.num_segments {
                return Err(Error::SortingParse {
                    path: path.to_path_buf(),
                    source: format!(
                        "unit {unit_id} has {} segments, descriptor says {}",
                        segments.len(),
                        parsed.num_segments
                    )
                    .into(),
                });
            }
            for frames in &mut segments {
                frames.sort_unstable();
            }
            spikes.insert(unit_id, segments);
        }
        Self::new(spikes, parsed.num_segments)
    }

    /// Write the sorting to its JSON interchange file.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let units: BTreeMap<String, &Vec<Vec<u64>>> = self
            .spikes
            .iter()
            .map(|(unit, segments)| (unit.to_string(), segments))
            .collect();
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "num_segments": self.num_segments,
            "units": units,
        }))
        .map_err(|e| Error::Internal {
            message: format!("failed to serialize sorting: {e}"),
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Subset view keeping only the given units, IDs unchanged.
    pub fn select_units(&self, keep: &[UnitId]) -> Result<Self> {
        let mut spikes = BTreeMap::new();
        for unit_id in keep {
            let segments = self
                .spikes
                .get(unit_id)
                .ok_or(Error::UnknownUnit { id: *unit_id })?;
            spikes.insert(*unit_id, segments.clone());
        }
        Self::new(spikes, self.num_segments)
    }

    // Content digest over the spike trains themselves: in-memory sortings
    // have no source path to identify them by.
    fn fingerprint_of(
        spikes: &BTreeMap<UnitId, Vec<Vec<u64>>>,
        num_segments: usize,
    ) -> Result<Fingerprint> {
        let identity: BTreeMap<String, serde_json::Value> = spikes
            .iter()
            .map(|(unit, segments)| {
                let digest: Vec<serde_json::Value> = segments
                    .iter()
                    .map(|frames| {
                        serde_json::json!({
                            "n": frames.len(),
                            "first": frames.first(),
                            "last": frames.last(),
                            "sum": frames.iter().copied().fold(0u64, u64::wrapping_add),
                        })
                    })
                    .collect();
                (unit.to_string(), serde_json::Value::Array(digest))
            })
            .collect();
        Fingerprint::leaf(
            "vec-sorting",
            &serde_json::json!({
                "num_segments": num_segments,
                "units": identity,
            }),
        )
    }
}

impl SortingView for VecSortingView {
    fn num_segments(&self) -> usize {
        self.num_segments
    }

    fn unit_ids(&self) -> &[UnitId] {
        &self.unit_ids
    }

    fn unit_spike_frames(&self, unit_id: UnitId, segment: usize) -> Result<&[u64]> {
        check_segment(segment, self.num_segments)?;
        let segments = self
            .spikes
            .get(&unit_id)
            .ok_or(Error::UnknownUnit { id: unit_id })?;
        Ok(&segments[segment])
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
