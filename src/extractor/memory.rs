//! In-memory recording view.
//!
//! Used as the materialization target when staging transformed recordings
//! for external sorters, and as the workhorse of the test suite.

use crate::error::{Error, Result};
use crate::extractor::recording::{
    ChannelInfo, RecordingView, Traces, check_frame_bounds, check_segment, resolve_channels,
};
use crate::fingerprint::Fingerprint;

/// Recording held entirely in memory, one row-major buffer per segment.
pub struct VecRecordingView {
    segments: Vec<Traces>,
    channels: Vec<ChannelInfo>,
    sampling_rate: f64,
    fingerprint: Fingerprint,
}

impl VecRecordingView {
    /// Build an in-memory recording from per-segment trace buffers.
    ///
    /// Every segment must have one column per channel.
    pub fn new(segments: Vec<Traces>, channels: Vec<ChannelInfo>, sampling_rate: f64) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::InvalidChain {
                reason: "recording has no channels".to_string(),
            });
        }
        if segments.is_empty() {
            return Err(Error::InvalidChain {
                reason: "recording has no segments".to_string(),
            });
        }
        for (i, segment) in segments.iter().enumerate() {
            if segment.num_channels() != channels.len() {
                return Err(Error::Internal {
                    message: format!(
                        "segment {i} has {} channels, expected {}",
                        segment.num_channels(),
                        channels.len()
                    ),
                });
            }
        }
        let fingerprint = Self::fingerprint_of(&segments, &channels, sampling_rate)?;
        Ok(Self {
            segments,
            channels,
            sampling_rate,
            fingerprint,
        })
    }

    /// Snapshot any view into memory by reading all of its traces.
    ///
    /// This defeats laziness on purpose; it is only meant for staging and
    /// for tests, never for whole-session recordings.
    pub fn materialize(view: &dyn RecordingView) -> Result<Self> {
        let mut segments = Vec::with_capacity(view.num_segments());
        for segment in 0..view.num_segments() {
            let num_frames = view.num_frames(segment)?;
            segments.push(view.traces(segment, 0, num_frames, None)?);
        }
        Self::new(segments, view.channels().to_vec(), view.sampling_rate())
    }

    // Content digest: in-memory data has no path identity, so the samples
    // themselves are folded into the fingerprint.
    fn fingerprint_of(
        segments: &[Traces],
        channels: &[ChannelInfo],
        sampling_rate: f64,
    ) -> Result<Fingerprint> {
        let segment_digests: Vec<serde_json::Value> = segments
            .iter()
            .map(|t| {
                let sum: f64 = t.as_slice().iter().map(|s| f64::from(*s)).sum();
                serde_json::json!({
                    "frames": t.num_frames(),
                    "sum_bits": sum.to_bits(),
                })
            })
            .collect();
        Fingerprint::leaf(
            "vec-recording",
            &serde_json::json!({
                "sampling_rate": sampling_rate,
                "channels": channels,
                "segments": segment_digests,
            }),
        )
    }
}

impl RecordingView for VecRecordingView {
    fn num_segments(&self) -> usize {
        self.segments.len()
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn num_frames(&self, segment: usize) -> Result<u64> {
        check_segment(segment, self.segments.len())?;
        Ok(self.segments[segment].num_frames() as u64)
    }

    fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[u32]>,
    ) -> Result<Traces> {
        check_segment(segment, self.segments.len())?;
        let source = &self.segments[segment];
        check_frame_bounds(segment, start, end, source.num_frames() as u64)?;
        let columns = resolve_channels(&self.channels, channels)?;

        #[allow(clippy::cast_possible_truncation)]
        let (start, end) = (start as usize, end as usize);
        let num_frames = end - start;
        let mut data = Vec::with_capacity(num_frames * columns.len());
        for frame in start..end {
            let row = source.frame(frame);
            for &col in &columns {
                data.push(row[col]);
            }
        }
        Traces::new(data, num_frames, columns.len())
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ramp_recording() -> VecRecordingView {
        // 2 segments, 3 channels; sample value encodes (segment, frame, channel)
        let make = |segment: usize, frames: usize| {
            let mut data = Vec::new();
            for frame in 0..frames {
                for channel in 0..3 {
                    #[allow(clippy::cast_precision_loss)]
                    data.push((segment * 10_000 + frame * 10 + channel) as f32);
                }
            }
            Traces::new(data, frames, 3).unwrap()
        };
        VecRecordingView::new(
            vec![make(0, 100), make(1, 50)],
            (0..3).map(ChannelInfo::bare).collect(),
            30_000.0,
        )
        .unwrap()
    }

    #[test]
    fn test_shape_matches_request() {
        let rec = ramp_recording();
        let t = rec.traces(0, 10, 20, None).unwrap();
        assert_eq!(t.num_frames(), 10);
        assert_eq!(t.num_channels(), 3);
    }

    #[test]
    fn test_channel_subset_order_preserved() {
        let rec = ramp_recording();
        let t = rec.traces(0, 0, 1, Some(&[2, 0])).unwrap();
        assert_eq!(t.frame(0), &[2.0, 0.0]);
    }

    #[test]
    fn test_out_of_range() {
        let rec = ramp_recording();
        assert!(matches!(
            rec.traces(1, 0, 51, None),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            rec.traces(0, 20, 20, None),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_recording_rejected() {
        let result = VecRecordingView::new(vec![], vec![ChannelInfo::bare(0)], 30_000.0);
        assert!(matches!(result, Err(Error::InvalidChain { .. })));
    }

    #[test]
    fn test_materialize_round_trip() {
        let rec = ramp_recording();
        let copy = VecRecordingView::materialize(&rec).unwrap();
        assert_eq!(copy.num_segments(), 2);
        let a = rec.traces(1, 0, 50, None).unwrap();
        let b = copy.traces(1, 0, 50, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_sensitive_to_content() {
        let rec = ramp_recording();
        let t = Traces::new(vec![1.0; 30], 10, 3).unwrap();
        let other = VecRecordingView::new(
            vec![t],
            (0..3).map(ChannelInfo::bare).collect(),
            30_000.0,
        )
        .unwrap();
        assert_ne!(rec.fingerprint(), other.fingerprint());
    }
}
