//! Waveform cache engine.
//!
//! Computes, persists, and serves spike waveform snippets keyed by the
//! combined fingerprint of `(recording, sorting, window, policy)`, one
//! binary file per unit. Ready entries are served byte-identically from
//! disk; concurrent requests for the same `(fingerprint, unit)` wait for
//! and reuse a single in-flight computation instead of recomputing.

use crate::cache::policy::{SamplingPolicy, SnippetWindow};
use crate::cache::store::{CacheStore, UnitRecord};
use crate::constants::cache_files;
use crate::error::{Error, Result};
use crate::extractor::recording::RecordingView;
use crate::extractor::sorting::{SortingView, UnitId};
use crate::fingerprint::Fingerprint;
use crate::utils::CancelToken;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use tracing::{debug, warn};

/// Waveform snippets for one unit, with coverage metadata.
#[derive(Debug, Clone)]
pub struct Waveforms {
    /// Unit the snippets belong to.
    pub unit_id: UnitId,
    /// Combined fingerprint the entry is keyed by.
    pub fingerprint: Fingerprint,
    /// Extracted snippet count.
    pub num_spikes: usize,
    /// Frames per snippet.
    pub snippet_frames: usize,
    /// Channels per snippet.
    pub num_channels: usize,
    /// Spikes selected by the policy; boundary spikes are skipped, so this
    /// may exceed `num_spikes`. The shortfall is coverage metadata, not an
    /// error.
    pub requested_spikes: usize,
    /// Whether the data was served from disk without recomputation.
    pub from_cache: bool,
    data: Vec<f32>,
}

impl Waveforms {
    /// Shape as `(num_spikes, snippet_frames, num_channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_spikes, self.snippet_frames, self.num_channels)
    }

    /// One snippet as a flat `(frames x channels)` row-major slice.
    pub fn snippet(&self, index: usize) -> &[f32] {
        let len = self.snippet_frames * self.num_channels;
        &self.data[index * len..(index + 1) * len]
    }

    /// Flat sample buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Fraction of requested spikes that could be extracted.
    pub fn coverage(&self) -> f64 {
        if self.requested_spikes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.num_spikes as f64 / self.requested_spikes as f64;
        ratio
    }
}

#[derive(Serialize)]
struct ExtractionParams<'a> {
    window: SnippetWindow,
    policy: &'a SamplingPolicy,
}

#[derive(Default)]
struct Inflight {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Inflight {
    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while !*done {
            done = self
                .cv
                .wait(done)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn finish(&self) {
        let mut done = self.done.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *done = true;
        self.cv.notify_all();
    }
}

type Key = (String, UnitId);

/// Cache engine over an on-disk store plus an in-process in-flight table.
pub struct WaveformCache {
    store: CacheStore,
    inflight: Mutex<HashMap<Key, Arc<Inflight>>>,
}

impl WaveformCache {
    /// Engine rooted at the given cache directory.
    pub fn new(root: PathBuf) -> Self {
        Self {
            store: CacheStore::new(root),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Combined fingerprint for a waveform request, unit-independent.
    pub fn entry_fingerprint(
        recording: &dyn RecordingView,
        sorting: &dyn SortingView,
        window: SnippetWindow,
        policy: &SamplingPolicy,
    ) -> Result<Fingerprint> {
        Fingerprint::combined(
            &[recording.fingerprint(), sorting.fingerprint()],
            "waveforms",
            &ExtractionParams { window, policy },
        )
    }

    /// Retrieve (computing and caching if necessary) one unit's waveforms.
    ///
    /// Identical arguments always yield bit-identical data; the second
    /// call is served from disk without touching the recording. At most
    /// one computation per `(fingerprint, unit)` is in flight at any time;
    /// concurrent callers wait for it and reuse its result. A cancelled
    /// computation leaves no cache entry behind.
    pub fn waveforms(
        &self,
        recording: &dyn RecordingView,
        sorting: &dyn SortingView,
        unit_id: UnitId,
        window: SnippetWindow,
        policy: &SamplingPolicy,
        cancel: Option<&CancelToken>,
    ) -> Result<Waveforms> {
        policy.validate()?;
        if !sorting.unit_ids().contains(&unit_id) {
            return Err(Error::UnknownUnit { id: unit_id });
        }
        let fingerprint = Self::entry_fingerprint(recording, sorting, window, policy)?;
        let key: Key = (fingerprint.as_str().to_string(), unit_id);

        loop {
            // fast path: ready on disk
            match self.store.load_unit(&key.0, unit_id) {
                Ok(Some((record, data))) => {
                    return Ok(Self::assemble(unit_id, &fingerprint, record, data, true));
                }
                Ok(None) => {}
                Err(Error::CacheCorruption { path, reason }) => {
                    // self-heal: drop the bad unit and recompute below
                    warn!("Corrupt cache entry {}: {reason}; recomputing", path.display());
                    self.store.invalidate_unit(&key.0, unit_id)?;
                }
                Err(e) => return Err(e),
            }

            // claim the key or wait for whoever holds it
            let claimed = {
                let mut inflight = self
                    .inflight
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(entry) = inflight.get(&key) {
                    Some(Arc::clone(entry))
                } else {
                    inflight.insert(key.clone(), Arc::new(Inflight::default()));
                    None
                }
            };
            if let Some(entry) = claimed {
                entry.wait();
                // the owner either persisted the entry, failed, or was
                // cancelled; re-check the disk and re-claim if needed
                continue;
            }

            let result = self.compute(recording, sorting, unit_id, window, policy, cancel, &key.0);
            {
                let mut inflight = self
                    .inflight
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(entry) = inflight.remove(&key) {
                    entry.finish();
                }
            }
            return result.map(|(record, data)| {
                Self::assemble(unit_id, &fingerprint, record, data, false)
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        recording: &dyn RecordingView,
        sorting: &dyn SortingView,
        unit_id: UnitId,
        window: SnippetWindow,
        policy: &SamplingPolicy,
        cancel: Option<&CancelToken>,
        fingerprint: &str,
    ) -> Result<(UnitRecord, Vec<f32>)> {
        let rate = recording.sampling_rate();
        let frames_before = window.frames_before(rate);
        let frames_after = window.frames_after(rate);
        let snippet_frames = window.snippet_frames(rate);
        let num_channels = recording.channels().len();

        let mut spikes: Vec<(usize, u64)> = Vec::new();
        for segment in 0..sorting.num_segments() {
            for frame in sorting.unit_spike_frames(unit_id, segment)? {
                spikes.push((segment, *frame));
            }
        }
        let selected = policy.select(&spikes);
        let requested_spikes = selected.len();
        debug!(
            "Extracting unit {unit_id}: {requested_spikes} of {} spikes selected",
            spikes.len()
        );

        let mut data = Vec::with_capacity(requested_spikes * snippet_frames * num_channels);
        let mut extracted = 0usize;
        for (segment, frame) in selected {
            if let Some(token) = cancel {
                token.check()?;
            }
            let num_frames = recording.num_frames(segment)?;
            let Some(start) = frame.checked_sub(frames_before) else {
                continue; // spike too near the segment start
            };
            let end = frame + frames_after;
            if end > num_frames {
                continue; // spike too near the segment end
            }
            let traces = recording.traces(segment, start, end, None)?;
            data.extend_from_slice(traces.as_slice());
            extracted += 1;
        }

        if extracted == 0 {
            return Err(Error::EmptyWaveform { unit_id });
        }

        let record = UnitRecord {
            file: cache_files::unit_file(unit_id),
            num_spikes: extracted,
            requested_spikes,
            snippet_frames,
            num_channels,
        };
        self.store
            .write_unit(fingerprint, rate, window, policy, unit_id, record.clone(), &data)?;
        Ok((record, data))
    }

    fn assemble(
        unit_id: UnitId,
        fingerprint: &Fingerprint,
        record: UnitRecord,
        data: Vec<f32>,
        from_cache: bool,
    ) -> Waveforms {
        Waveforms {
            unit_id,
            fingerprint: fingerprint.clone(),
            num_spikes: record.num_spikes,
            snippet_frames: record.snippet_frames,
            num_channels: record.num_channels,
            requested_spikes: record.requested_spikes,
            from_cache,
            data,
        }
    }

    fn busy_fingerprints(&self) -> Vec<String> {
        let inflight = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inflight.keys().map(|(fp, _)| fp.clone()).collect()
    }

    /// Evict entries whose fingerprint starts with `prefix`.
    ///
    /// Entries with an in-flight computation are skipped, never evicted
    /// from under their readers.
    pub fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let busy = self.busy_fingerprints();
        let mut removed = 0;
        for name in self.store.entries()? {
            if name.starts_with(prefix) {
                if busy.contains(&name) {
                    warn!("Skipping eviction of in-use cache entry {name}");
                    continue;
                }
                std::fs::remove_dir_all(self.store.entry_dir(&name))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Evict entries older than `max_age`, skipping in-use ones.
    pub fn clear_older_than(&self, max_age: chrono::Duration) -> Result<usize> {
        let busy = self.busy_fingerprints();
        let cutoff = chrono::Utc::now() - max_age;
        let mut removed = 0;
        for name in self.store.entries()? {
            if busy.contains(&name) {
                continue;
            }
            let evict = match self.store.load_metadata(&name) {
                Ok(Some(metadata)) => metadata.created_at < cutoff,
                // unreadable entries are stale by definition
                Ok(None) | Err(_) => true,
            };
            if evict {
                std::fs::remove_dir_all(self.store.entry_dir(&name))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Evict oldest idle entries until the cache fits within `max_bytes`.
    pub fn clear_to_size(&self, max_bytes: u64) -> Result<usize> {
        let busy = self.busy_fingerprints();

        let mut entries = Vec::new();
        let mut total = 0u64;
        for name in self.store.entries()? {
            let size = self.store.entry_size(&name)?;
            let created_at = self
                .store
                .load_metadata(&name)
                .ok()
                .flatten()
                .map(|m| m.created_at);
            total += size;
            entries.push((name, size, created_at));
        }
        // oldest first; entries with no readable metadata go before them
        entries.sort_by_key(|(_, _, created_at)| *created_at);

        let mut removed = 0;
        for (name, size, _) in entries {
            if total <= max_bytes {
                break;
            }
            if busy.contains(&name) {
                warn!("Skipping eviction of in-use cache entry {name}");
                continue;
            }
            std::fs::remove_dir_all(self.store.entry_dir(&name))?;
            total -= size;
            removed += 1;
        }
        Ok(removed)
    }

    /// Evict every idle entry.
    pub fn clear_all(&self) -> Result<usize> {
        let busy = self.busy_fingerprints();
        let mut removed = 0;
        for name in self.store.entries()? {
            if busy.contains(&name) {
                warn!("Skipping eviction of in-use cache entry {name}");
                continue;
            }
            std::fs::remove_dir_all(self.store.entry_dir(&name))?;
            removed += 1;
        }
        Ok(removed)
    }
}
