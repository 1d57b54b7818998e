//! Spikeline - lazy extractor views, waveform caching, and spike sorter
//! orchestration for extracellular electrophysiology recordings.
//!
//! The library exposes the extractor, transform, cache, sorter, and
//! registry layers; the companion binary is a thin consumer of those.

#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod registry;
pub mod sorter;
pub mod transform;
pub mod utils;

use cache::{SamplingPolicy, SnippetWindow, WaveformCache};
use clap::Parser;
use cli::{CacheAction, Cli, Command, ConfigAction, parse_params};
use config::Config;
use extractor::{SortingView, VecSortingView};
use registry::Registry;
use sorter::{JobState, LaunchOptions, SorterLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the spikeline CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    // Release live job working directories on interrupt
    if let Err(e) = ctrlc::set_handler(|| {
        sorter::cleanup_all_work_dirs();
        std::process::exit(130); // 128 + SIGINT(2)
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let config = config::load_default_config()?;
    config::validate_config(&config)?;

    match cli.command {
        Command::Info { recording } => handle_info(&recording, &config),
        Command::Sorters => handle_sorters(&config),
        Command::Run {
            sorter,
            recording,
            params,
            timeout_secs,
            keep_work_dir,
            output,
        } => handle_run(
            &config,
            &sorter,
            &recording,
            &params,
            timeout_secs,
            keep_work_dir,
            output.as_deref(),
        ),
        Command::Waveforms {
            recording,
            sorting,
            unit,
            ms_before,
            ms_after,
            max_spikes,
            no_progress,
        } => handle_waveforms(
            &config,
            &recording,
            sorting.as_deref(),
            unit,
            ms_before,
            ms_after,
            max_spikes,
            cli.quiet || no_progress,
        ),
        Command::Cache { action } => handle_cache(&config, &action),
        Command::Config { action } => handle_config(action),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter_str = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    fmt().with_env_filter(filter).init();
}

/// Cache root from config, falling back to the platform cache dir.
fn cache_root(config: &Config) -> Result<PathBuf> {
    config
        .cache
        .root
        .clone()
        .map_or_else(config::default_cache_dir, Ok)
}

/// Working-directory root from config, falling back to the platform dir.
fn work_root(config: &Config) -> Result<PathBuf> {
    config
        .jobs
        .work_root
        .clone()
        .map_or_else(config::default_work_root, Ok)
}

fn handle_info(recording: &std::path::Path, config: &Config) -> Result<()> {
    let registry = Registry::from_config(config);
    let bundle = registry.open_any(recording)?;
    let rec = &bundle.recording;

    println!("Recording: {}", recording.display());
    println!("  Fingerprint: {}", rec.fingerprint().short());
    println!("  Sampling rate: {} Hz", rec.sampling_rate());
    println!("  Channels: {}", rec.channels().len());
    println!("  Segments: {}", rec.num_segments());
    for segment in 0..rec.num_segments() {
        let frames = rec.num_frames(segment)?;
        println!("    segment {segment}: {frames} frames");
    }
    println!("  Duration: {:.2}s", rec.total_duration_secs());

    if let Some(sorting) = &bundle.sorting {
        println!("  Companion sorting: {} units", sorting.unit_ids().len());
        for unit in sorting.unit_ids() {
            let spikes = sorting.unit_spike_count(*unit)?;
            println!("    unit {unit}: {spikes} spikes");
        }
    }
    Ok(())
}

fn handle_sorters(config: &Config) -> Result<()> {
    let registry = Registry::from_config(config);
    let names = registry.sorter_names();

    if names.is_empty() {
        println!("No sorters configured.");
        println!("Add one with a [sorters.<name>] table in the config file.");
        return Ok(());
    }

    println!("Configured sorters:");
    for name in names {
        let adapter = registry.sorter(name)?;
        let status = match adapter.check_installed() {
            Ok(()) => "installed".to_string(),
            Err(_) => format!("missing binary '{}'", adapter.binary()),
        };
        println!("  {name}: {status}");
    }
    Ok(())
}

fn handle_run(
    config: &Config,
    sorter_name: &str,
    recording: &std::path::Path,
    raw_params: &[String],
    timeout_secs: Option<u64>,
    keep_work_dir: bool,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let registry = Registry::from_config(config);
    let adapter = Arc::clone(registry.sorter(sorter_name)?);
    let params = parse_params(raw_params)?;
    let bundle = registry.open_any(recording)?;

    let timeout = timeout_secs
        .or_else(|| config.sorters.get(sorter_name).and_then(|s| s.timeout_secs))
        .unwrap_or(config.jobs.timeout_secs);
    let options = LaunchOptions {
        timeout: Duration::from_secs(timeout),
        keep_failed_work_dirs: keep_work_dir || config.jobs.keep_failed_work_dirs,
    };

    let launcher = SorterLauncher::new(work_root(config)?);
    let report = launcher.run_blocking(
        adapter.as_ref(),
        bundle.recording.as_ref(),
        &params,
        &options,
        None,
    )?;

    if report.state == JobState::Completed {
        let sorting = report.sorting.clone().ok_or(Error::Internal {
            message: "completed job carried no sorting".to_string(),
        })?;
        info!(
            "Sorter '{sorter_name}' found {} units in {:.2}s",
            sorting.unit_ids().len(),
            report.duration_secs
        );
        if let Some(path) = output {
            sorting.to_json_file(path)?;
            println!("Sorting written to {}", path.display());
        } else {
            for unit in sorting.unit_ids() {
                let spikes = sorting.unit_spike_count(*unit)?;
                println!("  unit {unit}: {spikes} spikes");
            }
        }
        return Ok(());
    }

    if !report.stderr.is_empty() {
        eprintln!("{}", report.stderr.trim_end());
    }
    match report.into_sorting() {
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_waveforms(
    config: &Config,
    recording: &std::path::Path,
    sorting_path: Option<&std::path::Path>,
    unit: Option<u32>,
    ms_before: Option<f32>,
    ms_after: Option<f32>,
    max_spikes: Option<usize>,
    quiet: bool,
) -> Result<()> {
    let registry = Registry::from_config(config);
    let bundle = registry.open_any(recording)?;

    let sorting: Arc<dyn SortingView> = match sorting_path {
        Some(path) => Arc::new(VecSortingView::from_json_file(path)?),
        None => bundle.sorting.clone().ok_or_else(|| Error::InvalidParameter {
            name: "sorting".to_string(),
            message: "recording has no companion sorting; pass --sorting".to_string(),
        })?,
    };

    let window = SnippetWindow::new(
        ms_before.unwrap_or(config.waveforms.ms_before),
        ms_after.unwrap_or(config.waveforms.ms_after),
    )?;
    let policy = SamplingPolicy::MaxSpikes {
        max_spikes: max_spikes.unwrap_or(config.waveforms.max_spikes_per_unit),
        seed: config.waveforms.seed,
    };

    let cache = WaveformCache::new(cache_root(config)?);
    let units: Vec<u32> = unit.map_or_else(|| sorting.unit_ids().to_vec(), |u| vec![u]);

    let progress = if quiet {
        None
    } else {
        Some(indicatif::ProgressBar::new(units.len() as u64))
    };

    let mut extracted = 0usize;
    for unit_id in &units {
        match cache.waveforms(
            bundle.recording.as_ref(),
            sorting.as_ref(),
            *unit_id,
            window,
            &policy,
            None,
        ) {
            Ok(waveforms) => {
                let (spikes, frames, channels) = waveforms.shape();
                let source = if waveforms.from_cache { "cached" } else { "computed" };
                println!(
                    "unit {unit_id}: {spikes} x {frames} x {channels} ({:.0}% coverage, {source})",
                    waveforms.coverage() * 100.0
                );
                extracted += 1;
            }
            Err(Error::EmptyWaveform { unit_id }) => {
                warn!("unit {unit_id}: no extractable spikes, skipped");
            }
            Err(e) => return Err(e),
        }
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    info!("Extracted waveforms for {extracted}/{} unit(s)", units.len());
    Ok(())
}

fn handle_cache(config: &Config, action: &CacheAction) -> Result<()> {
    let root = cache_root(config)?;
    match action {
        CacheAction::Path => {
            println!("{}", root.display());
            Ok(())
        }
        CacheAction::Clear {
            prefix,
            older_than_days,
            max_size_mb,
        } => {
            let cache = WaveformCache::new(root);
            let removed = if let Some(prefix) = prefix {
                cache.clear_prefix(prefix)?
            } else if let Some(days) = older_than_days {
                cache.clear_older_than(chrono::Duration::days(*days))?
            } else if let Some(mb) = max_size_mb {
                cache.clear_to_size(mb * 1024 * 1024)?
            } else {
                cache.clear_all()?
            };
            println!("Evicted {removed} cache entr{}.", if removed == 1 { "y" } else { "ies" });
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config::config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let saved_path = config::save_default_config(&Config::default())?;
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!("  add a [sorters.<name>] table with the tool's binary and protocol");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_default_config()?;
            println!("{config:#?}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config::config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
