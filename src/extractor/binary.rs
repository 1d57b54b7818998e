//! Lazy file-backed recording over raw binary trace files.
//!
//! The `rawbin` format is a JSON descriptor naming one interleaved
//! row-major trace file per segment. Reads seek straight into the segment
//! file for the requested frame range, so recordings far larger than
//! memory stay cheap to open and to sample from.

use crate::constants::{TMP_SUFFIX, job_files, rawbin};
use crate::error::{Error, Result};
use crate::extractor::recording::{
    ChannelId, ChannelInfo, RecordingView, Traces, check_frame_bounds, check_segment,
    resolve_channels,
};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Sample encoding of a raw trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    /// 32-bit little-endian floats.
    F32,
    /// 16-bit little-endian signed integers, scaled by gain/offset on read.
    I16,
}

impl SampleEncoding {
    /// Bytes per sample.
    pub fn bytes(self) -> u64 {
        match self {
            Self::F32 => 4,
            Self::I16 => 2,
        }
    }
}

/// One segment's trace file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentFile {
    /// Trace file path, relative to the descriptor.
    pub file: PathBuf,
    /// Frame count of the segment.
    pub num_frames: u64,
}

/// On-disk descriptor for a raw binary recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryDescriptor {
    /// Format tag, always `rawbin`.
    pub format: String,
    /// Sampling rate in Hz.
    pub sampling_rate: f64,
    /// Sample encoding shared by all segment files.
    pub encoding: SampleEncoding,
    /// Multiplicative gain applied on read (for integer encodings).
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Additive offset applied on read, after gain.
    #[serde(default)]
    pub offset: f32,
    /// Ordered channel set.
    pub channels: Vec<ChannelInfo>,
    /// Per-segment trace files.
    pub segments: Vec<SegmentFile>,
    /// Companion sorting JSON, if one was produced alongside the recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorting: Option<PathBuf>,
}

fn default_gain() -> f32 {
    1.0
}

/// Lazy recording view backed by raw binary segment files.
pub struct BinaryRecordingView {
    descriptor: BinaryDescriptor,
    descriptor_path: PathBuf,
    segment_paths: Vec<PathBuf>,
    fingerprint: Fingerprint,
}

impl BinaryRecordingView {
    /// Open a recording from its descriptor file.
    ///
    /// Validates that every segment file exists and has exactly the length
    /// its descriptor entry implies before any trace is read.
    pub fn open(descriptor_path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(descriptor_path).map_err(|e| Error::DescriptorRead {
            path: descriptor_path.to_path_buf(),
            source: e,
        })?;
        let descriptor: BinaryDescriptor =
            serde_json::from_str(&text).map_err(|e| Error::DescriptorParse {
                path: descriptor_path.to_path_buf(),
                source: e,
            })?;
        Self::from_descriptor(descriptor, descriptor_path)
    }

    /// Build a view from an already-parsed descriptor.
    pub fn from_descriptor(descriptor: BinaryDescriptor, descriptor_path: &Path) -> Result<Self> {
        if descriptor.format != rawbin::FORMAT_NAME {
            return Err(Error::UnsupportedFormat {
                path: descriptor_path.to_path_buf(),
            });
        }
        if descriptor.channels.is_empty() || descriptor.segments.is_empty() {
            return Err(Error::InvalidChain {
                reason: format!(
                    "descriptor '{}' has no channels or no segments",
                    descriptor_path.display()
                ),
            });
        }

        let base = descriptor_path.parent().unwrap_or_else(|| Path::new("."));
        let num_channels = descriptor.channels.len() as u64;
        let mut segment_paths = Vec::with_capacity(descriptor.segments.len());
        let mut segment_lens = Vec::with_capacity(descriptor.segments.len());
        for segment in &descriptor.segments {
            let path = base.join(&segment.file);
            let expected = segment.num_frames * num_channels * descriptor.encoding.bytes();
            let actual = std::fs::metadata(&path)
                .map_err(|e| Error::DescriptorRead {
                    path: path.clone(),
                    source: e,
                })?
                .len();
            if actual != expected {
                return Err(Error::TraceFileMismatch {
                    path,
                    reason: format!("expected {expected} bytes, found {actual}"),
                });
            }
            segment_lens.push(actual);
            segment_paths.push(path);
        }

        let fingerprint = Fingerprint::leaf(
            rawbin::FORMAT_NAME,
            &serde_json::json!({
                "descriptor": descriptor,
                "segment_bytes": segment_lens,
            }),
        )?;

        Ok(Self {
            descriptor,
            descriptor_path: descriptor_path.to_path_buf(),
            segment_paths,
            fingerprint,
        })
    }

    /// Path to the descriptor this view was opened from.
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Parsed descriptor.
    pub fn descriptor(&self) -> &BinaryDescriptor {
        &self.descriptor
    }

    fn read_rows(&self, segment: usize, start: u64, end: u64) -> Result<Vec<f32>> {
        let encoding = self.descriptor.encoding;
        let num_channels = self.descriptor.channels.len() as u64;
        let row_bytes = num_channels * encoding.bytes();

        let mut file = File::open(&self.segment_paths[segment])?;
        file.seek(SeekFrom::Start(start * row_bytes))?;

        #[allow(clippy::cast_possible_truncation)]
        let byte_len = ((end - start) * row_bytes) as usize;
        let mut raw = vec![0u8; byte_len];
        file.read_exact(&mut raw)?;

        let samples = match encoding {
            SampleEncoding::F32 => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            SampleEncoding::I16 => raw
                .chunks_exact(2)
                .map(|b| {
                    f32::from(i16::from_le_bytes([b[0], b[1]]))
                        .mul_add(self.descriptor.gain, self.descriptor.offset)
                })
                .collect(),
        };
        Ok(samples)
    }
}

impl RecordingView for BinaryRecordingView {
    fn num_segments(&self) -> usize {
        self.descriptor.segments.len()
    }

    fn sampling_rate(&self) -> f64 {
        self.descriptor.sampling_rate
    }

    fn num_frames(&self, segment: usize) -> Result<u64> {
        check_segment(segment, self.descriptor.segments.len())?;
        Ok(self.descriptor.segments[segment].num_frames)
    }

    fn channels(&self) -> &[ChannelInfo] {
        &self.descriptor.channels
    }

    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[ChannelId]>,
    ) -> Result<Traces> {
        check_segment(segment, self.descriptor.segments.len())?;
        check_frame_bounds(
            segment,
            start,
            end,
            self.descriptor.segments[segment].num_frames,
        )?;
        let columns = resolve_channels(&self.descriptor.channels, channels)?;

        let rows = self.read_rows(segment, start, end)?;
        let all_channels = self.descriptor.channels.len();
        #[allow(clippy::cast_possible_truncation)]
        let num_frames = (end - start) as usize;

        if columns.len() == all_channels && columns.iter().enumerate().all(|(i, c)| i == *c) {
            return Traces::new(rows, num_frames, all_channels);
        }
        let mut data = Vec::with_capacity(num_frames * columns.len());
        for frame in 0..num_frames {
            let row = &rows[frame * all_channels..(frame + 1) * all_channels];
            for &col in &columns {
                data.push(row[col]);
            }
        }
        Traces::new(data, num_frames, columns.len())
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    fn source_descriptor(&self) -> Option<&Path> {
        Some(&self.descriptor_path)
    }
}

/// Export any view as a raw binary recording under `dir`.
///
/// Writes one `f32` trace file per segment plus a `rawbin` descriptor,
/// every file through a temp-and-rename, and returns the descriptor path.
/// Used when staging recordings for external sorters and by tests.
pub fn export_recording(view: &dyn RecordingView, dir: &Path) -> Result<PathBuf> {
    let mut segments = Vec::with_capacity(view.num_segments());
    for segment in 0..view.num_segments() {
        let num_frames = view.num_frames(segment)?;
        let traces = view.traces(segment, 0, num_frames, None)?;

        let file_name = job_files::segment_file(segment);
        let final_path = dir.join(&file_name);
        let tmp_path = dir.join(format!("{file_name}{TMP_SUFFIX}"));
        let mut file = File::create(&tmp_path)?;
        for sample in traces.as_slice() {
            file.write_all(&sample.to_le_bytes())?;
        }
        file.sync_all()?;
        std::fs::rename(&tmp_path, &final_path)?;

        segments.push(SegmentFile {
            file: PathBuf::from(file_name),
            num_frames,
        });
    }

    let descriptor = BinaryDescriptor {
        format: rawbin::FORMAT_NAME.to_string(),
        sampling_rate: view.sampling_rate(),
        encoding: SampleEncoding::F32,
        gain: 1.0,
        offset: 0.0,
        channels: view.channels().to_vec(),
        segments,
        sorting: None,
    };

    let descriptor_path = dir.join(job_files::RECORDING);
    let tmp_path = dir.join(format!("{}{TMP_SUFFIX}", job_files::RECORDING));
    let json = serde_json::to_string_pretty(&descriptor).map_err(|e| Error::Internal {
        message: format!("failed to serialize recording descriptor: {e}"),
    })?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, &descriptor_path)?;
    Ok(descriptor_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extractor::memory::VecRecordingView;
    use tempfile::TempDir;

    fn exported_view(dir: &Path) -> BinaryRecordingView {
        let t0 = Traces::new((0..300).map(|i| i as f32).collect(), 100, 3).unwrap();
        let t1 = Traces::new((0..150).map(|i| -(i as f32)).collect(), 50, 3).unwrap();
        let rec = VecRecordingView::new(
            vec![t0, t1],
            (0..3).map(ChannelInfo::bare).collect(),
            30_000.0,
        )
        .unwrap();
        let descriptor_path = export_recording(&rec, dir).unwrap();
        BinaryRecordingView::open(&descriptor_path).unwrap()
    }

    #[test]
    fn test_export_and_reopen() {
        let dir = TempDir::new().unwrap();
        let view = exported_view(dir.path());
        assert_eq!(view.num_segments(), 2);
        assert_eq!(view.num_frames(0).unwrap(), 100);
        assert_eq!(view.num_frames(1).unwrap(), 50);
        assert!((view.sampling_rate() - 30_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lazy_read_matches_source() {
        let dir = TempDir::new().unwrap();
        let view = exported_view(dir.path());
        let t = view.traces(0, 10, 12, None).unwrap();
        assert_eq!(t.frame(0), &[30.0, 31.0, 32.0]);
        assert_eq!(t.frame(1), &[33.0, 34.0, 35.0]);
    }

    #[test]
    fn test_channel_subset_read() {
        let dir = TempDir::new().unwrap();
        let view = exported_view(dir.path());
        let t = view.traces(0, 10, 11, Some(&[2, 0])).unwrap();
        assert_eq!(t.frame(0), &[32.0, 30.0]);
    }

    #[test]
    fn test_truncated_file_rejected_on_open() {
        let dir = TempDir::new().unwrap();
        let view = exported_view(dir.path());
        let seg0 = dir.path().join(job_files::segment_file(0));
        let file = std::fs::OpenOptions::new().write(true).open(&seg0).unwrap();
        file.set_len(10).unwrap();
        drop(file);
        let result = BinaryRecordingView::open(view.descriptor_path());
        assert!(matches!(result, Err(Error::TraceFileMismatch { .. })));
    }

    #[test]
    fn test_fingerprint_stable_across_opens() {
        let dir = TempDir::new().unwrap();
        let view = exported_view(dir.path());
        let again = BinaryRecordingView::open(view.descriptor_path()).unwrap();
        assert_eq!(view.fingerprint(), again.fingerprint());
    }

    #[test]
    fn test_i16_gain_offset_decode() {
        let dir = TempDir::new().unwrap();
        // two frames, one channel: raw values 100 and -200
        let raw = dir.path().join("traces_seg0.raw");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100i16.to_le_bytes());
        bytes.extend_from_slice(&(-200i16).to_le_bytes());
        std::fs::write(&raw, bytes).unwrap();

        let descriptor = BinaryDescriptor {
            format: rawbin::FORMAT_NAME.to_string(),
            sampling_rate: 30_000.0,
            encoding: SampleEncoding::I16,
            gain: 0.5,
            offset: 1.0,
            channels: vec![ChannelInfo::bare(0)],
            segments: vec![SegmentFile {
                file: PathBuf::from("traces_seg0.raw"),
                num_frames: 2,
            }],
            sorting: None,
        };
        let descriptor_path = dir.path().join("recording.json");
        std::fs::write(
            &descriptor_path,
            serde_json::to_string(&descriptor).unwrap(),
        )
        .unwrap();

        let view = BinaryRecordingView::open(&descriptor_path).unwrap();
        let t = view.traces(0, 0, 2, None).unwrap();
        assert!((t.get(0, 0) - 51.0).abs() < f32::EPSILON);
        assert!((t.get(1, 0) - (-99.0)).abs() < f32::EPSILON);
    }
}
