//! Common reference transform.
//!
//! Subtracts a per-frame reference computed across all parent channels
//! (median or average). The reference always uses the full channel set,
//! so a read for a channel subset still fetches every parent channel.

use crate::error::Result;
use crate::extractor::recording::{
    ChannelId, ChannelInfo, RecordingView, Traces, resolve_channels,
};
use crate::fingerprint::Fingerprint;
use crate::transform::node::check_parent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reference statistic computed across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    /// Per-frame median across channels.
    Median,
    /// Per-frame mean across channels.
    Average,
}

#[derive(Serialize)]
struct CommonReferenceParams {
    mode: ReferenceMode,
}

/// Recording view re-referencing its parent on demand.
pub struct CommonReference {
    parent: Arc<dyn RecordingView>,
    mode: ReferenceMode,
    fingerprint: Fingerprint,
}

impl CommonReference {
    /// Wrap a parent view with a common reference.
    pub fn new(parent: Arc<dyn RecordingView>, mode: ReferenceMode) -> Result<Self> {
        check_parent("common-reference", &parent)?;
        let fingerprint = Fingerprint::chained(
            parent.fingerprint(),
            "common-reference",
            &CommonReferenceParams { mode },
        )?;
        Ok(Self {
            parent,
            mode,
            fingerprint,
        })
    }

    fn reference(&self, row: &[f32], scratch: &mut Vec<f32>) -> f32 {
        match self.mode {
            ReferenceMode::Average => {
                let sum: f32 = row.iter().sum();
                #[allow(clippy::cast_precision_loss)]
                let n = row.len() as f32;
                sum / n
            }
            ReferenceMode::Median => {
                scratch.clear();
                scratch.extend_from_slice(row);
                scratch.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = scratch.len() / 2;
                if scratch.len() % 2 == 0 {
                    f32::midpoint(scratch[mid - 1], scratch[mid])
                } else {
                    scratch[mid]
                }
            }
        }
    }
}

impl RecordingView for CommonReference {
    fn num_segments(&self) -> usize {
        self.parent.num_segments()
    }

    fn sampling_rate(&self) -> f64 {
        self.parent.sampling_rate()
    }

    fn num_frames(&self, segment: usize) -> Result<u64> {
        self.parent.num_frames(segment)
    }

    fn channels(&self) -> &[ChannelInfo] {
        self.parent.channels()
    }

    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[ChannelId]>,
    ) -> Result<Traces> {
        let columns = resolve_channels(self.parent.channels(), channels)?;
        let full = self.parent.traces(segment, start, end, None)?;

        let mut scratch = Vec::with_capacity(full.num_channels());
        let mut out = Vec::with_capacity(full.num_frames() * columns.len());
        for frame in 0..full.num_frames() {
            let row = full.frame(frame);
            let reference = self.reference(row, &mut scratch);
            for &col in &columns {
                out.push(row[col] - reference);
            }
        }
        Traces::new(out, full.num_frames(), columns.len())
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extractor::memory::VecRecordingView;

    fn recording() -> Arc<dyn RecordingView> {
        // one frame per test case: [1, 2, 6]
        let t = Traces::new(vec![1.0, 2.0, 6.0], 1, 3).unwrap();
        Arc::new(
            VecRecordingView::new(vec![t], (0..3).map(ChannelInfo::bare).collect(), 30_000.0)
                .unwrap(),
        )
    }

    #[test]
    fn test_median_reference() {
        let view = CommonReference::new(recording(), ReferenceMode::Median).unwrap();
        let t = view.traces(0, 0, 1, None).unwrap();
        assert_eq!(t.frame(0), &[-1.0, 0.0, 4.0]);
    }

    #[test]
    fn test_average_reference() {
        let view = CommonReference::new(recording(), ReferenceMode::Average).unwrap();
        let t = view.traces(0, 0, 1, None).unwrap();
        assert_eq!(t.frame(0), &[-2.0, -1.0, 3.0]);
    }

    #[test]
    fn test_subset_still_references_all_channels() {
        let view = CommonReference::new(recording(), ReferenceMode::Median).unwrap();
        let t = view.traces(0, 0, 1, Some(&[0])).unwrap();
        // reference is the median of all three channels, not of the subset
        assert_eq!(t.frame(0), &[-1.0]);
    }

    #[test]
    fn test_mode_changes_fingerprint() {
        let rec = recording();
        let median = CommonReference::new(Arc::clone(&rec), ReferenceMode::Median).unwrap();
        let average = CommonReference::new(rec, ReferenceMode::Average).unwrap();
        assert_ne!(median.fingerprint(), average.fingerprint());
    }
}
