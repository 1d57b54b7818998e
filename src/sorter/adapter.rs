//! Sorter adapter contract.
//!
//! One adapter per external sorting tool. An adapter declares its
//! canonical parameter schema and required binary, translates resolved
//! parameters into the tool's staged input layout, constructs the
//! invocation, and parses the tool's output artifact back into a sorting
//! view.

use crate::constants::job_files;
use crate::error::{Error, Result};
use crate::extractor::binary::{BinaryDescriptor, export_recording};
use crate::extractor::recording::RecordingView;
use crate::extractor::sorting::VecSortingView;
use crate::sorter::params::{ParamSpec, ParameterSet};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Boundary contract between the launcher and one external sorting tool.
pub trait SorterAdapter: Send + Sync {
    /// Adapter name, unique within a registry.
    fn name(&self) -> &str;

    /// External binary this adapter invokes.
    fn binary(&self) -> &str;

    /// Declared canonical parameter schema.
    fn params_spec(&self) -> &ParamSpec;

    /// Fail fast if the declared external dependency is absent.
    fn check_installed(&self) -> Result<()> {
        if binary_available(self.binary()) {
            Ok(())
        } else {
            Err(Error::SorterNotInstalled {
                sorter: self.name().to_string(),
                binary: self.binary().to_string(),
            })
        }
    }

    /// Write the tool's expected input layout into the working directory.
    fn stage(
        &self,
        work_dir: &Path,
        recording: &dyn RecordingView,
        params: &ParameterSet,
    ) -> Result<()>;

    /// Build the tool invocation for a staged working directory.
    fn command(&self, work_dir: &Path) -> Command;

    /// File name of the declared output artifact within the working
    /// directory.
    fn output_artifact(&self) -> &str;

    /// Parse the output artifact into a sorting view.
    fn parse_output(&self, work_dir: &Path, num_segments: usize) -> Result<VecSortingView>;
}

/// Whether `binary` resolves to an executable.
///
/// Explicit paths are checked directly; bare names are searched on PATH.
pub fn binary_available(binary: &str) -> bool {
    let path = Path::new(binary);
    if path.components().count() > 1 {
        return path.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
}

/// Stage a recording into a working directory, by reference when possible.
///
/// File-backed leaf views are referenced: their descriptor is rewritten
/// with absolute trace paths so the tool can read the original data in
/// place. Transformed and in-memory views are materialized into the
/// working directory as raw `f32` traces.
pub fn stage_recording(recording: &dyn RecordingView, work_dir: &Path) -> Result<PathBuf> {
    if let Some(descriptor_path) = recording.source_descriptor() {
        let text = std::fs::read_to_string(descriptor_path).map_err(|e| Error::DescriptorRead {
            path: descriptor_path.to_path_buf(),
            source: e,
        })?;
        let mut descriptor: BinaryDescriptor =
            serde_json::from_str(&text).map_err(|e| Error::DescriptorParse {
                path: descriptor_path.to_path_buf(),
                source: e,
            })?;

        let base = descriptor_path.parent().unwrap_or_else(|| Path::new("."));
        for segment in &mut descriptor.segments {
            if segment.file.is_relative() {
                segment.file = base.join(&segment.file);
            }
        }
        descriptor.sorting = None;

        let reference_path = work_dir.join(job_files::RECORDING);
        let json = serde_json::to_string_pretty(&descriptor).map_err(|e| Error::Internal {
            message: format!("failed to serialize recording reference: {e}"),
        })?;
        std::fs::write(&reference_path, json).map_err(|e| Error::JobStage {
            path: reference_path.clone(),
            source: e,
        })?;
        return Ok(reference_path);
    }
    export_recording(recording, work_dir)
}
