//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "spikeline";

/// Default snippet window before the spike peak, in milliseconds.
pub const DEFAULT_MS_BEFORE: f32 = 1.0;

/// Default snippet window after the spike peak, in milliseconds.
pub const DEFAULT_MS_AFTER: f32 = 2.0;

/// Default maximum number of spikes sampled per unit.
pub const DEFAULT_MAX_SPIKES_PER_UNIT: usize = 500;

/// Default seed for spike subsampling.
pub const DEFAULT_SAMPLING_SEED: u64 = 0;

/// Default sorter job timeout in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Default number of sorter jobs run in parallel.
pub const DEFAULT_MAX_PARALLEL_JOBS: usize = 2;

/// Warm-up margin for causal filters, in milliseconds.
///
/// Filter transforms fetch this much extra signal before the requested
/// window from their parent so the filter state has settled by the first
/// returned frame. Requests closer than the margin to a segment start get
/// a shorter warm-up.
pub const FILTER_MARGIN_MS: f32 = 5.0;

/// Suffix appended to files while they are being written.
///
/// Every write into a shared directory goes to a `.tmp` sibling first and
/// is renamed into place, so a crash never leaves a readable partial file.
pub const TMP_SUFFIX: &str = ".tmp";

/// Number of hex characters of a fingerprint used in directory names and logs.
pub const SHORT_FINGERPRINT_LEN: usize = 12;

/// Snippet window bounds in milliseconds.
pub mod snippet_window {
    /// Maximum allowed window side.
    pub const MAX_MS: f32 = 100.0;
}

/// File names inside a waveform cache entry directory.
pub mod cache_files {
    /// Metadata descriptor, rewritten last on every update; a unit is only
    /// served from cache when its metadata record and binary file agree.
    pub const METADATA: &str = "waveforms.json";

    /// Binary waveform file name for a unit.
    pub fn unit_file(unit_id: u32) -> String {
        format!("unit_{unit_id}.raw")
    }
}

/// File names inside a sorter job working directory.
pub mod job_files {
    /// Sorter-schema parameter file written during staging.
    pub const PARAMS: &str = "params.json";

    /// Recording descriptor (reference or materialized copy).
    pub const RECORDING: &str = "recording.json";

    /// Job provenance record (pid, hostname, start time).
    pub const JOB_INFO: &str = "job.json";

    /// Output artifact for the JSON sorter protocol.
    pub const SORTING_JSON: &str = "sorting.json";

    /// Output artifact for the CSV sorter protocol.
    pub const SORTING_CSV: &str = "sorting.csv";

    /// Per-segment trace file name for materialized recordings.
    pub fn segment_file(segment: usize) -> String {
        format!("traces_seg{segment}.raw")
    }
}

/// Raw binary recording descriptor constants.
pub mod rawbin {
    /// Descriptor `format` field value recognized by the `rawbin` adapter.
    pub const FORMAT_NAME: &str = "rawbin";
}
