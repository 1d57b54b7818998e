//! Format adapter contract and the built-in raw binary format.

use crate::constants::rawbin;
use crate::error::{Error, Result};
use crate::extractor::binary::BinaryRecordingView;
use crate::extractor::recording::RecordingView;
use crate::extractor::sorting::{SortingView, VecSortingView};
use std::path::Path;
use std::sync::Arc;

/// A recording opened through a format adapter, with its companion
/// sorting when the source carries one.
pub struct FormatBundle {
    /// The opened recording.
    pub recording: Arc<dyn RecordingView>,
    /// Companion sorting, if the source references one.
    pub sorting: Option<Arc<dyn SortingView>>,
}

/// Boundary contract for one on-disk recording format.
pub trait FormatAdapter: Send + Sync {
    /// Adapter name, unique within a registry.
    fn name(&self) -> &str;

    /// Cheap check whether this adapter can open the source.
    fn probe(&self, path: &Path) -> bool;

    /// Open the source into views.
    fn open(&self, path: &Path) -> Result<FormatBundle>;
}

/// Built-in adapter for `rawbin` descriptor files.
pub struct RawBinaryFormat;

impl FormatAdapter for RawBinaryFormat {
    fn name(&self) -> &str {
        rawbin::FORMAT_NAME
    }

    fn probe(&self, path: &Path) -> bool {
        if path.extension().is_none_or(|ext| ext != "json") {
            return false;
        }
        let Ok(text) = std::fs::read_to_string(path) else {
            return false;
        };
        serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("format").and_then(|f| f.as_str().map(String::from)))
            .is_some_and(|format| format == rawbin::FORMAT_NAME)
    }

    fn open(&self, path: &Path) -> Result<FormatBundle> {
        let recording = BinaryRecordingView::open(path)?;

        let sorting = match &recording.descriptor().sorting {
            Some(sorting_file) => {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                let sorting_path = base.join(sorting_file);
                let sorting = VecSortingView::from_json_file(&sorting_path)?;
                if sorting.num_segments() != recording.num_segments() {
                    return Err(Error::SortingParse {
                        path: sorting_path,
                        source: format!(
                            "companion sorting has {} segments, recording has {}",
                            sorting.num_segments(),
                            recording.num_segments()
                        )
                        .into(),
                    });
                }
                Some(Arc::new(sorting) as Arc<dyn SortingView>)
            }
            None => None,
        };

        Ok(FormatBundle {
            recording: Arc::new(recording),
            sorting,
        })
    }
}
