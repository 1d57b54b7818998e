//! On-disk waveform cache layout.
//!
//! One directory per combined fingerprint. Each directory holds
//! `waveforms.json` (the metadata descriptor) plus one little-endian `f32`
//! binary file per unit. Binary files are written first through a
//! temp-and-rename, the metadata descriptor is rewritten last, so a crash
//! can never leave a unit readable as ready: a unit is served only when
//! its metadata record and its binary file's length agree.

use crate::cache::policy::{SamplingPolicy, SnippetWindow};
use crate::constants::{TMP_SUFFIX, cache_files};
use crate::error::{Error, Result};
use crate::extractor::sorting::UnitId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Metadata descriptor for one cache entry directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Combined fingerprint the directory is keyed by.
    pub fingerprint: String,
    /// When the entry directory was first created.
    pub created_at: DateTime<Utc>,
    /// Sampling rate the windows were converted against.
    pub sampling_rate: f64,
    /// Snippet window in milliseconds.
    pub window: SnippetWindow,
    /// Sampling policy used for every unit in this entry.
    pub policy: SamplingPolicy,
    /// Per-unit records, keyed by unit ID.
    #[serde(default)]
    pub units: BTreeMap<UnitId, UnitRecord>,
}

/// Coverage and shape record for one unit's waveform file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Binary file name within the entry directory.
    pub file: String,
    /// Extracted snippet count.
    pub num_spikes: usize,
    /// Spikes selected by the policy before boundary skips.
    pub requested_spikes: usize,
    /// Frames per snippet.
    pub snippet_frames: usize,
    /// Channels per snippet.
    pub num_channels: usize,
}

impl UnitRecord {
    fn expected_bytes(&self) -> u64 {
        (self.num_spikes * self.snippet_frames * self.num_channels * 4) as u64
    }
}

/// Filesystem half of the waveform cache.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Store rooted at `root`, created on first use.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry directory for a fingerprint.
    pub fn entry_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    /// Load the metadata descriptor of an entry, if the entry exists.
    pub fn load_metadata(&self, fingerprint: &str) -> Result<Option<CacheMetadata>> {
        let path = self.entry_dir(fingerprint).join(cache_files::METADATA);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata: CacheMetadata =
            serde_json::from_str(&text).map_err(|e| Error::CacheCorruption {
                path,
                reason: format!("unparseable metadata: {e}"),
            })?;
        Ok(Some(metadata))
    }

    /// Load one unit's waveform data, if it is ready.
    ///
    /// Returns `Ok(None)` when the entry or unit simply is not cached yet;
    /// fails with [`Error::CacheCorruption`] when the metadata and the
    /// binary file disagree.
    pub fn load_unit(
        &self,
        fingerprint: &str,
        unit_id: UnitId,
    ) -> Result<Option<(UnitRecord, Vec<f32>)>> {
        let Some(metadata) = self.load_metadata(fingerprint)? else {
            return Ok(None);
        };
        let Some(record) = metadata.units.get(&unit_id).cloned() else {
            return Ok(None);
        };

        let path = self.entry_dir(fingerprint).join(&record.file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CacheCorruption {
                    path,
                    reason: "metadata lists a unit whose binary file is missing".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() as u64 != record.expected_bytes() {
            return Err(Error::CacheCorruption {
                path,
                reason: format!(
                    "expected {} bytes, found {}",
                    record.expected_bytes(),
                    bytes.len()
                ),
            });
        }

        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Some((record, data)))
    }

    /// Persist one unit's waveforms and update the metadata descriptor.
    ///
    /// The binary file lands first (temp + rename), the descriptor is
    /// rewritten last, both atomically.
    pub fn write_unit(
        &self,
        fingerprint: &str,
        sampling_rate: f64,
        window: SnippetWindow,
        policy: &SamplingPolicy,
        unit_id: UnitId,
        record: UnitRecord,
        data: &[f32],
    ) -> Result<()> {
        let dir = self.entry_dir(fingerprint);
        std::fs::create_dir_all(&dir).map_err(|e| Error::CacheWrite {
            path: dir.clone(),
            source: e,
        })?;

        let unit_path = dir.join(&record.file);
        let tmp_path = dir.join(format!("{}{TMP_SUFFIX}", record.file));
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| Error::CacheWrite {
            path: tmp_path.clone(),
            source: e,
        })?;
        for sample in data {
            file.write_all(&sample.to_le_bytes())
                .map_err(|e| Error::CacheWrite {
                    path: tmp_path.clone(),
                    source: e,
                })?;
        }
        file.sync_all().map_err(|e| Error::CacheWrite {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &unit_path).map_err(|e| Error::CacheWrite {
            path: unit_path.clone(),
            source: e,
        })?;

        // a corrupt descriptor is replaced wholesale rather than propagated
        let mut metadata = self.load_metadata(fingerprint).ok().flatten().unwrap_or(CacheMetadata {
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
            sampling_rate,
            window,
            policy: policy.clone(),
            units: BTreeMap::new(),
        });
        metadata.units.insert(unit_id, record);
        self.write_metadata(fingerprint, &metadata)
    }

    /// Drop one unit from an entry (self-healing after corruption).
    pub fn invalidate_unit(&self, fingerprint: &str, unit_id: UnitId) -> Result<()> {
        let dir = self.entry_dir(fingerprint);
        match self.load_metadata(fingerprint) {
            Ok(Some(mut metadata)) => {
                if metadata.units.remove(&unit_id).is_some() {
                    self.write_metadata(fingerprint, &metadata)?;
                }
            }
            Ok(None) => {}
            // unparseable descriptor: drop it so the entry can be rebuilt
            Err(_) => {
                let _ = std::fs::remove_file(dir.join(cache_files::METADATA));
            }
        }
        let unit_path = dir.join(cache_files::unit_file(unit_id));
        match std::fs::remove_file(&unit_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_metadata(&self, fingerprint: &str, metadata: &CacheMetadata) -> Result<()> {
        let dir = self.entry_dir(fingerprint);
        let path = dir.join(cache_files::METADATA);
        let tmp_path = dir.join(format!("{}{TMP_SUFFIX}", cache_files::METADATA));
        let json = serde_json::to_string_pretty(metadata).map_err(|e| Error::Internal {
            message: format!("failed to serialize cache metadata: {e}"),
        })?;
        std::fs::write(&tmp_path, json).map_err(|e| Error::CacheWrite {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| Error::CacheWrite {
            path,
            source: e,
        })?;
        Ok(())
    }

    /// List entry fingerprints currently on disk.
    pub fn entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let iter = match std::fs::read_dir(&self.root) {
            Ok(iter) => iter,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in iter {
            let entry = entry?;
            if entry.path().is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove every entry whose fingerprint starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for name in self.entries()? {
            if name.starts_with(prefix) {
                debug!("Evicting cache entry {name}");
                std::fs::remove_dir_all(self.entry_dir(&name))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry created more than `max_age` ago.
    pub fn clear_older_than(&self, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;
        for name in self.entries()? {
            let evict = match self.load_metadata(&name) {
                Ok(Some(metadata)) => metadata.created_at < cutoff,
                // unreadable entries are stale by definition
                Ok(None) | Err(_) => true,
            };
            if evict {
                debug!("Evicting cache entry {name}");
                std::fs::remove_dir_all(self.entry_dir(&name))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear_all(&self) -> Result<usize> {
        let entries = self.entries()?;
        for name in &entries {
            std::fs::remove_dir_all(self.entry_dir(name))?;
        }
        Ok(entries.len())
    }

    /// Total size of one entry directory in bytes.
    pub fn entry_size(&self, fingerprint: &str) -> Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(self.entry_dir(fingerprint))? {
            total += entry?.metadata()?.len();
        }
        Ok(total)
    }
}
