//! Error types for spikeline.

/// Result type alias for spikeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for spikeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Cache directory could not be determined.
    #[error("could not determine cache directory for this platform")]
    CacheDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Frame bounds outside the segment.
    #[error(
        "frame range [{start}, {end}) out of range for segment {segment} with {num_frames} frames"
    )]
    OutOfRange {
        /// Segment index.
        segment: usize,
        /// Requested start frame.
        start: u64,
        /// Requested end frame.
        end: u64,
        /// Number of frames in the segment.
        num_frames: u64,
    },

    /// Segment index outside the view.
    #[error("segment index {segment} out of range ({num_segments} segments)")]
    SegmentOutOfRange {
        /// Requested segment index.
        segment: usize,
        /// Number of segments in the view.
        num_segments: usize,
    },

    /// Channel ID not present in the recording.
    #[error("unknown channel id {id}")]
    UnknownChannel {
        /// The unknown channel ID.
        id: u32,
    },

    /// Unit ID not present in the sorting.
    #[error("unknown unit id {id}")]
    UnknownUnit {
        /// The unknown unit ID.
        id: u32,
    },

    /// Transform chain construction rejected.
    #[error("invalid transform chain: {reason}")]
    InvalidChain {
        /// Description of the rejected construction.
        reason: String,
    },

    /// Parameter unknown or outside its declared range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Description of the violation.
        message: String,
    },

    /// Sorter external dependency not found.
    #[error("sorter '{sorter}' is not installed (binary '{binary}' not found)")]
    SorterNotInstalled {
        /// Sorter name.
        sorter: String,
        /// Binary that was looked up.
        binary: String,
    },

    /// External sorter process failed.
    #[error("sorter '{sorter}' failed (exit code {exit_code:?}): {detail}")]
    SorterExecution {
        /// Sorter name.
        sorter: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
        /// Description of the failure.
        detail: String,
    },

    /// Sorter process exceeded its timeout.
    #[error("sorter '{sorter}' timed out after {timeout_secs}s")]
    SorterTimedOut {
        /// Sorter name.
        sorter: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// No registered format adapter could open the source.
    #[error("unsupported format: '{path}'")]
    UnsupportedFormat {
        /// Path that no adapter could open.
        path: std::path::PathBuf,
    },

    /// Adapter name not present in the registry.
    #[error("unknown adapter '{name}'")]
    UnknownAdapter {
        /// The unknown adapter name.
        name: String,
    },

    /// No spike could be extracted for a unit.
    #[error("no waveforms could be extracted for unit {unit_id}")]
    EmptyWaveform {
        /// Unit ID with empty coverage.
        unit_id: u32,
    },

    /// Cache entry on disk is inconsistent.
    ///
    /// Consumed internally by the cache engine (invalidate and recompute);
    /// only surfaces if the recomputation also fails.
    #[error("corrupt cache entry '{path}': {reason}")]
    CacheCorruption {
        /// Path to the corrupt entry.
        path: std::path::PathBuf,
        /// Description of the inconsistency.
        reason: String,
    },

    /// Operation cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// Failed to read a recording descriptor.
    #[error("failed to read descriptor '{path}'")]
    DescriptorRead {
        /// Path to the descriptor file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a recording descriptor.
    #[error("failed to parse descriptor '{path}'")]
    DescriptorParse {
        /// Path to the descriptor file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Recording trace file missing or truncated.
    #[error("trace file '{path}' does not match its descriptor: {reason}")]
    TraceFileMismatch {
        /// Path to the trace file.
        path: std::path::PathBuf,
        /// Description of the mismatch.
        reason: String,
    },

    /// Failed to write into a cache entry directory.
    #[error("failed to write cache entry '{path}'")]
    CacheWrite {
        /// Path being written.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or populate a job working directory.
    #[error("failed to stage job working directory '{path}'")]
    JobStage {
        /// Path to the working directory.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a sorter output artifact.
    #[error("failed to parse sorter output '{path}'")]
    SortingParse {
        /// Path to the output artifact.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Spike frames are not monotonically increasing.
    #[error("spike frames for unit {unit_id} in segment {segment} are not sorted")]
    UnsortedSpikeFrames {
        /// Unit ID.
        unit_id: u32,
        /// Segment index.
        segment: usize,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
