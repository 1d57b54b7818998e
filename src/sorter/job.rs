//! Sorter job state machine and scoped working directories.

use crate::constants::job_files;
use crate::error::{Error, Result};
use crate::extractor::sorting::VecSortingView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a sorter job.
///
/// `Created → Staged → Running` then exactly one terminal state. No state
/// is ever skipped and a job never reaches `Completed` without a parsed
/// sorting view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Job key validated, nothing touched on disk yet.
    Created,
    /// Working directory materialized with parameters and recording.
    Staged,
    /// External process running.
    Running,
    /// Process exited 0 and its output artifact parsed.
    Completed,
    /// Process failed, exited non-zero, or produced unusable output.
    Failed,
    /// Process exceeded its timeout and was killed.
    TimedOut,
    /// Caller cancelled the job; process was killed.
    Cancelled,
}

impl JobState {
    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Staged => "staged",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Provenance record written into every working directory.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobInfo {
    /// Process ID of the launcher.
    pub pid: u32,
    /// Hostname of the machine.
    pub hostname: String,
    /// When the job was staged.
    pub started: DateTime<Utc>,
    /// Sorter name.
    pub sorter: String,
    /// Fingerprint of the recording being sorted.
    pub recording_fingerprint: String,
}

impl JobInfo {
    /// Record for a job being staged now.
    pub fn current(sorter: &str, recording_fingerprint: &str) -> Self {
        Self {
            pid: std::process::id(),
            hostname: hostname::get().map_or_else(
                |_| "unknown".to_string(),
                |h| h.to_string_lossy().into_owned(),
            ),
            started: Utc::now(),
            sorter: sorter.to_string(),
            recording_fingerprint: recording_fingerprint.to_string(),
        }
    }

    /// Write the record into a working directory.
    pub fn write(&self, work_dir: &Path) -> Result<()> {
        let path = work_dir.join(job_files::JOB_INFO);
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Internal {
            message: format!("failed to serialize job info: {e}"),
        })?;
        std::fs::write(&path, json).map_err(|e| Error::JobStage { path, source: e })?;
        Ok(())
    }
}

/// RAII guard for a job's scoped working directory.
///
/// The directory is removed when the guard drops, on every exit path
/// including timeout and cancellation, unless [`WorkDir::keep`] was
/// called. Guards register themselves so an interrupt handler can sweep
/// directories that would otherwise be orphaned.
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create the working directory.
    pub fn create(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path).map_err(|e| Error::JobStage {
            path: path.clone(),
            source: e,
        })?;
        register_work_dir(&path);
        Ok(Self { path, keep: false })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the directory on disk when the guard drops.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        unregister_work_dir(&self.path);
        if self.keep {
            debug!("Keeping working directory {}", self.path.display());
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                "Failed to remove working directory {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Global registry of live working directories for cleanup on signal.
static ACTIVE_WORK_DIRS: std::sync::LazyLock<std::sync::Mutex<Vec<PathBuf>>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(Vec::new()));

fn register_work_dir(path: &Path) {
    if let Ok(mut dirs) = ACTIVE_WORK_DIRS.lock() {
        dirs.push(path.to_path_buf());
    }
}

fn unregister_work_dir(path: &Path) {
    if let Ok(mut dirs) = ACTIVE_WORK_DIRS.lock() {
        dirs.retain(|p| p != path);
    }
}

/// Remove all live working directories. Called on signal.
pub fn cleanup_all_work_dirs() {
    if let Ok(dirs) = ACTIVE_WORK_DIRS.lock() {
        for dir in dirs.iter() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

/// Outcome of one sorter job.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Sorter name.
    pub sorter: String,
    /// Terminal state the job reached.
    pub state: JobState,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Human-readable failure detail for non-completed jobs.
    pub detail: String,
    /// Parsed sorting, present exactly when `state` is `Completed`.
    pub sorting: Option<Arc<VecSortingView>>,
}

impl JobReport {
    /// Convert a non-completed report into a structured error.
    pub fn into_sorting(self) -> Result<Arc<VecSortingView>> {
        match self.state {
            JobState::Completed => self.sorting.ok_or(Error::Internal {
                message: "completed job carried no sorting".to_string(),
            }),
            JobState::TimedOut => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let timeout_secs = self.duration_secs as u64;
                Err(Error::SorterTimedOut {
                    sorter: self.sorter,
                    timeout_secs,
                })
            }
            JobState::Cancelled => Err(Error::Cancelled),
            _ => Err(Error::SorterExecution {
                sorter: self.sorter,
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
                detail: self.detail,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial(work_dirs)]
    fn test_work_dir_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("job-1");
        let work_dir = WorkDir::create(path.clone()).unwrap();
        assert!(path.is_dir());
        drop(work_dir);
        assert!(!path.exists());
    }

    #[test]
    #[serial(work_dirs)]
    fn test_work_dir_kept_when_requested() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("job-2");
        let mut work_dir = WorkDir::create(path.clone()).unwrap();
        work_dir.keep();
        drop(work_dir);
        assert!(path.is_dir());
    }

    #[test]
    #[serial(work_dirs)]
    fn test_cleanup_all_work_dirs() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("job-3");
        let work_dir = WorkDir::create(path.clone()).unwrap();
        cleanup_all_work_dirs();
        assert!(!path.exists());
        drop(work_dir);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_failed_report_into_error() {
        let report = JobReport {
            sorter: "demo".to_string(),
            state: JobState::Failed,
            exit_code: Some(3),
            stdout: String::new(),
            stderr: "boom".to_string(),
            duration_secs: 0.1,
            detail: "non-zero exit".to_string(),
            sorting: None,
        };
        let err = report.into_sorting().unwrap_err();
        assert!(matches!(
            err,
            Error::SorterExecution {
                exit_code: Some(3),
                ..
            }
        ));
    }
}
