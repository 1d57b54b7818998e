//! Configuration type definitions.

use crate::constants::{
    DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MAX_PARALLEL_JOBS, DEFAULT_MAX_SPIKES_PER_UNIT,
    DEFAULT_MS_AFTER, DEFAULT_MS_BEFORE, DEFAULT_SAMPLING_SEED,
};
use crate::sorter::adapters::SorterProtocol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Waveform cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Sorter job settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Waveform extraction defaults.
    #[serde(default)]
    pub waveforms: WaveformsConfig,

    /// Configured sorter instances by name.
    #[serde(default)]
    pub sorters: HashMap<String, SorterConfig>,
}

/// Waveform cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory (None = platform cache dir).
    pub root: Option<PathBuf>,
}

/// Sorter job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Working directory root (None = under the cache root).
    pub work_root: Option<PathBuf>,

    /// Job timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of jobs run in parallel.
    pub max_parallel: usize,

    /// Keep failed working directories on disk for inspection.
    pub keep_failed_work_dirs: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            work_root: None,
            timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            max_parallel: DEFAULT_MAX_PARALLEL_JOBS,
            keep_failed_work_dirs: false,
        }
    }
}

/// Waveform extraction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformsConfig {
    /// Snippet window before the spike, in milliseconds.
    pub ms_before: f32,

    /// Snippet window after the spike, in milliseconds.
    pub ms_after: f32,

    /// Maximum spikes sampled per unit.
    pub max_spikes_per_unit: usize,

    /// Seed for spike subsampling.
    pub seed: u64,
}

impl Default for WaveformsConfig {
    fn default() -> Self {
        Self {
            ms_before: DEFAULT_MS_BEFORE,
            ms_after: DEFAULT_MS_AFTER,
            max_spikes_per_unit: DEFAULT_MAX_SPIKES_PER_UNIT,
            seed: DEFAULT_SAMPLING_SEED,
        }
    }
}

/// Configuration for a single sorter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SorterConfig {
    /// External binary to invoke (bare name or path).
    pub binary: String,

    /// Fixed arguments placed before the working directory.
    #[serde(default)]
    pub args: Vec<String>,

    /// Output protocol the tool speaks.
    #[serde(default)]
    pub protocol: SorterProtocol,

    /// Per-sorter timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.jobs.timeout_secs, 3600);
        assert_eq!(config.jobs.max_parallel, 2);
        assert_eq!(config.waveforms.ms_before, 1.0);
        assert_eq!(config.waveforms.ms_after, 2.0);
        assert_eq!(config.waveforms.max_spikes_per_unit, 500);
        assert!(config.sorters.is_empty());
    }

    #[test]
    fn test_sorter_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
[sorters.demo]
binary = "demo-sort"
"#,
        )
        .unwrap();
        let sorter = config.sorters.get("demo").unwrap();
        assert_eq!(sorter.binary, "demo-sort");
        assert!(sorter.args.is_empty());
        assert_eq!(sorter.protocol, SorterProtocol::Json);
        assert!(sorter.timeout_secs.is_none());
    }

    #[test]
    fn test_sorter_protocol_parses() {
        let config: Config = toml::from_str(
            r#"
[sorters.demo]
binary = "demo-sort"
protocol = "csv"
args = ["--fast"]
timeout_secs = 60
"#,
        )
        .unwrap();
        let sorter = config.sorters.get("demo").unwrap();
        assert_eq!(sorter.protocol, SorterProtocol::Csv);
        assert_eq!(sorter.args, vec!["--fast".to_string()]);
        assert_eq!(sorter.timeout_secs, Some(60));
    }
}
