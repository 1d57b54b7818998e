//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lazy extractor views, waveform caching, and spike sorter orchestration.
#[derive(Debug, Parser)]
#[command(name = "spikeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Describe a recording (segments, channels, duration, fingerprint).
    Info {
        /// Recording descriptor to open.
        recording: PathBuf,
    },
    /// List configured sorters and whether their binaries are installed.
    Sorters,
    /// Run a sorter against a recording.
    Run {
        /// Configured sorter name.
        #[arg(short, long)]
        sorter: String,

        /// Recording descriptor to sort.
        recording: PathBuf,

        /// Canonical parameter override (repeatable).
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Timeout override in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Keep the working directory on failure.
        #[arg(long)]
        keep_work_dir: bool,

        /// Write the resulting sorting to this JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract (and cache) waveform snippets for sorted units.
    Waveforms {
        /// Recording descriptor to read traces from.
        recording: PathBuf,

        /// Sorting JSON file (defaults to the recording's companion sorting).
        #[arg(long)]
        sorting: Option<PathBuf>,

        /// Extract a single unit instead of all units.
        #[arg(short, long)]
        unit: Option<u32>,

        /// Window before the spike in milliseconds.
        #[arg(long)]
        ms_before: Option<f32>,

        /// Window after the spike in milliseconds.
        #[arg(long)]
        ms_after: Option<f32>,

        /// Maximum spikes sampled per unit.
        #[arg(long)]
        max_spikes: Option<usize>,

        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,
    },
    /// Manage the waveform cache.
    Cache {
        /// Cache action to perform.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommand actions.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print the cache root directory.
    Path,
    /// Evict cache entries.
    Clear {
        /// Only evict entries whose fingerprint starts with this prefix.
        #[arg(long)]
        prefix: Option<String>,

        /// Only evict entries older than this many days.
        #[arg(long)]
        older_than_days: Option<i64>,

        /// Evict oldest entries until the cache fits within this size.
        #[arg(long)]
        max_size_mb: Option<u64>,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
