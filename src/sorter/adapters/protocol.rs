//! Staged-directory protocol adapters.
//!
//! Both protocols share the same staging layout: `params.json` with the
//! resolved canonical parameters, `recording.json` referencing or
//! materializing the recording, and `job.json` with provenance. The tool
//! is invoked with the working directory as its last argument and must
//! write its declared output artifact into it before exiting 0.

use crate::constants::job_files;
use crate::error::{Error, Result};
use crate::extractor::recording::RecordingView;
use crate::extractor::sorting::{SortingView, VecSortingView};
use crate::sorter::adapter::{SorterAdapter, stage_recording};
use crate::sorter::params::{ParamSpec, ParameterSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

/// Output artifact convention an external tool follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SorterProtocol {
    /// Tool writes `sorting.json` (the JSON interchange format).
    #[default]
    Json,
    /// Tool writes `sorting.csv` with `unit,segment,frame` rows.
    Csv,
}

/// Config-declared adapter for a tool speaking a staged-directory protocol.
pub struct ProtocolAdapter {
    name: String,
    binary: String,
    args: Vec<String>,
    protocol: SorterProtocol,
    spec: ParamSpec,
}

impl ProtocolAdapter {
    /// Adapter for a configured sorter instance.
    pub fn new(name: &str, binary: &str, args: Vec<String>, protocol: SorterProtocol) -> Self {
        Self {
            name: name.to_string(),
            binary: binary.to_string(),
            args,
            protocol,
            spec: ParamSpec::standard_sorting(),
        }
    }
}

/// Content of the staged `params.json`.
#[derive(Debug, Serialize)]
struct StagedParams<'a> {
    sorter: &'a str,
    output: &'a str,
    parameters: &'a ParameterSet,
}

impl SorterAdapter for ProtocolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn binary(&self) -> &str {
        &self.binary
    }

    fn params_spec(&self) -> &ParamSpec {
        &self.spec
    }

    fn stage(
        &self,
        work_dir: &Path,
        recording: &dyn RecordingView,
        params: &ParameterSet,
    ) -> Result<()> {
        stage_recording(recording, work_dir)?;

        let staged = StagedParams {
            sorter: &self.name,
            output: self.output_artifact(),
            parameters: params,
        };
        let path = work_dir.join(job_files::PARAMS);
        let json = serde_json::to_string_pretty(&staged).map_err(|e| Error::Internal {
            message: format!("failed to serialize staged parameters: {e}"),
        })?;
        std::fs::write(&path, json).map_err(|e| Error::JobStage { path, source: e })?;
        Ok(())
    }

    fn command(&self, work_dir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.args).arg(work_dir);
        command
    }

    fn output_artifact(&self) -> &str {
        match self.protocol {
            SorterProtocol::Json => job_files::SORTING_JSON,
            SorterProtocol::Csv => job_files::SORTING_CSV,
        }
    }

    fn parse_output(&self, work_dir: &Path, num_segments: usize) -> Result<VecSortingView> {
        let path = work_dir.join(self.output_artifact());
        match self.protocol {
            SorterProtocol::Json => {
                let sorting = VecSortingView::from_json_file(&path)?;
                if sorting.num_segments() != num_segments {
                    return Err(Error::SortingParse {
                        path,
                        source: format!(
                            "sorting has {} segments, recording has {num_segments}",
                            sorting.num_segments()
                        )
                        .into(),
                    });
                }
                Ok(sorting)
            }
            SorterProtocol::Csv => parse_csv_sorting(&path, num_segments),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvSpikeRow {
    unit: u32,
    segment: usize,
    frame: u64,
}

fn parse_csv_sorting(path: &Path, num_segments: usize) -> Result<VecSortingView> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::SortingParse {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;

    let mut spikes: BTreeMap<u32, Vec<Vec<u64>>> = BTreeMap::new();
    for row in reader.deserialize() {
        let row: CsvSpikeRow = row.map_err(|e| Error::SortingParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        if row.segment >= num_segments {
            return Err(Error::SortingParse {
                path: path.to_path_buf(),
                source: format!(
                    "spike in segment {}, recording has {num_segments}",
                    row.segment
                )
                .into(),
            });
        }
        spikes
            .entry(row.unit)
            .or_insert_with(|| vec![Vec::new(); num_segments])[row.segment]
            .push(row.frame);
    }
    for segments in spikes.values_mut() {
        for frames in segments {
            frames.sort_unstable();
        }
    }
    VecSortingView::new(spikes, num_segments)
}
