//! Sorter job launcher.
//!
//! Validates parameters, stages a scoped working directory, runs the
//! external tool under a timeout with captured output, and parses the
//! declared artifact back into a sorting view. Independent jobs run on a
//! semaphore-bounded pool; identical jobs are serialized so at most one
//! is in flight per key.

use crate::constants::DEFAULT_JOB_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::extractor::recording::RecordingView;
use crate::fingerprint::Fingerprint;
use crate::sorter::adapter::SorterAdapter;
use crate::sorter::job::{JobInfo, JobReport, JobState, WorkDir};
use crate::sorter::params::ParameterSet;
use crate::utils::CancelToken;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Per-run launcher options.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Wall-clock limit for the external process.
    pub timeout: Duration,
    /// Leave failed and timed-out working directories on disk for
    /// inspection instead of releasing them.
    pub keep_failed_work_dirs: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            keep_failed_work_dirs: false,
        }
    }
}

/// One job of a batch run.
pub struct JobRequest {
    /// Adapter to run.
    pub adapter: Arc<dyn SorterAdapter>,
    /// Caller-supplied canonical parameters.
    pub params: ParameterSet,
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Launcher over a working-directory root.
pub struct SorterLauncher {
    work_root: PathBuf,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SorterLauncher {
    /// Launcher whose job directories live under `work_root`.
    pub fn new(work_root: PathBuf) -> Self {
        Self {
            work_root,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Working-directory root.
    pub fn work_root(&self) -> &std::path::Path {
        &self.work_root
    }

    /// Run one sorter job to a terminal state.
    ///
    /// Parameter validation and the installed check run before anything
    /// touches the filesystem, so an invalid parameter never creates a
    /// working directory. The returned report carries the terminal state,
    /// exit code, captured output, and the parsed sorting on success.
    pub async fn run(
        &self,
        adapter: &dyn SorterAdapter,
        recording: &dyn RecordingView,
        params: &ParameterSet,
        options: &LaunchOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<JobReport> {
        let resolved = adapter.params_spec().resolve(params)?;
        adapter.check_installed()?;

        let key = Fingerprint::combined(
            &[recording.fingerprint()],
            "sorter-job",
            &serde_json::json!({
                "sorter": adapter.name(),
                "parameters": resolved,
            }),
        )?;

        // serialize identical jobs: at most one in flight per key
        let key_lock = {
            let mut inflight = self
                .inflight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(inflight.entry(key.as_str().to_string()).or_default())
        };
        let _key_guard = key_lock.lock().await;

        let mut state = JobState::Created;
        let started = Instant::now();
        info!("Job {}[{}]: {state}", adapter.name(), key.short());

        let mut work_dir = WorkDir::create(
            self.work_root
                .join(format!("{}-{}", adapter.name(), key.short())),
        )?;
        JobInfo::current(adapter.name(), recording.fingerprint().as_str())
            .write(work_dir.path())?;
        adapter.stage(work_dir.path(), recording, &resolved)?;
        state = JobState::Staged;
        debug!(
            "Job {}[{}]: {state} in {}",
            adapter.name(),
            key.short(),
            work_dir.path().display()
        );

        let mut command = adapter.command(work_dir.path());
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| Error::SorterExecution {
            sorter: adapter.name().to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            detail: format!("failed to spawn '{}': {e}", adapter.binary()),
        })?;
        state = JobState::Running;
        debug!("Job {}[{}]: {state}", adapter.name(), key.short());

        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());
        let cancel_token = cancel.cloned().unwrap_or_default();

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            () = tokio::time::sleep(options.timeout) => WaitOutcome::TimedOut,
            () = cancel_token.cancelled() => WaitOutcome::Cancelled,
        };
        if !matches!(outcome, WaitOutcome::Exited(_)) {
            kill_process_tree(&mut child).await;
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration_secs = started.elapsed().as_secs_f64();

        let mut report = JobReport {
            sorter: adapter.name().to_string(),
            state,
            exit_code: None,
            stdout,
            stderr,
            duration_secs,
            detail: String::new(),
            sorting: None,
        };

        match outcome {
            WaitOutcome::TimedOut => {
                report.state = JobState::TimedOut;
                report.detail = format!(
                    "killed after exceeding the {:.0}s timeout",
                    options.timeout.as_secs_f64()
                );
            }
            WaitOutcome::Cancelled => {
                report.state = JobState::Cancelled;
                report.detail = "cancelled by caller".to_string();
            }
            WaitOutcome::Exited(Err(e)) => {
                report.state = JobState::Failed;
                report.detail = format!("failed to wait for process: {e}");
            }
            WaitOutcome::Exited(Ok(status)) => {
                report.exit_code = status.code();
                if status.success() {
                    match adapter.parse_output(work_dir.path(), recording.num_segments()) {
                        Ok(sorting) => {
                            report.state = JobState::Completed;
                            report.sorting = Some(Arc::new(sorting));
                        }
                        Err(e) => {
                            report.state = JobState::Failed;
                            report.detail = format!("output artifact unusable: {e}");
                        }
                    }
                } else {
                    report.state = JobState::Failed;
                    report.detail = "process exited with non-zero status".to_string();
                }
            }
        }

        if matches!(report.state, JobState::Failed | JobState::TimedOut)
            && options.keep_failed_work_dirs
        {
            work_dir.keep();
            warn!(
                "Job {}[{}] kept working directory {}",
                adapter.name(),
                key.short(),
                work_dir.path().display()
            );
        }

        info!(
            "Job {}[{}]: {} in {duration_secs:.2}s",
            adapter.name(),
            key.short(),
            report.state
        );
        Ok(report)
    }

    /// Synchronous wrapper bridging into a fresh runtime.
    pub fn run_blocking(
        &self,
        adapter: &dyn SorterAdapter,
        recording: &dyn RecordingView,
        params: &ParameterSet,
        options: &LaunchOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<JobReport> {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
            message: format!("failed to create async runtime: {e}"),
        })?;
        runtime.block_on(self.run(adapter, recording, params, options, cancel))
    }

    /// Run independent jobs concurrently under a bounded worker pool.
    ///
    /// Results come back in request order; one failing job does not stop
    /// the others.
    pub async fn run_many(
        self: &Arc<Self>,
        recording: &Arc<dyn RecordingView>,
        requests: Vec<JobRequest>,
        options: &LaunchOptions,
        max_parallel: usize,
        cancel: Option<&CancelToken>,
    ) -> Vec<Result<JobReport>> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let launcher = Arc::clone(self);
            let recording = Arc::clone(recording);
            let options = options.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.cloned();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Internal {
                        message: format!("worker pool closed: {e}"),
                    })?;
                launcher
                    .run(
                        request.adapter.as_ref(),
                        recording.as_ref(),
                        &request.params,
                        &options,
                        cancel.as_ref(),
                    )
                    .await
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(handle.await.unwrap_or_else(|e| {
                Err(Error::Internal {
                    message: format!("job task panicked: {e}"),
                })
            }));
        }
        reports
    }
}

fn spawn_reader<R>(reader: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return String::new();
        };
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Kill the job's whole process tree and reap the child.
///
/// The child is spawned as its own process group leader, so on unix the
/// group kill reaches grandchildren the tool may have spawned.
#[cfg(unix)]
#[allow(unsafe_code)]
async fn kill_process_tree(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = pid as i32;
        // SAFETY: killpg with a pgid we created ourselves at spawn time
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn kill_process_tree(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
