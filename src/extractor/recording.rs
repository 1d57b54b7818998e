//! Recording view contract and trace buffers.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};

/// Channel identifier within a recording.
pub type ChannelId = u32;

/// Static description of one recording channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel identifier, unique within the recording.
    pub id: ChannelId,
    /// Spatial location on the probe, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<[f32; 2]>,
    /// Group tag (shank, tetrode), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
}

impl ChannelInfo {
    /// Channel with no location or group metadata.
    pub fn bare(id: ChannelId) -> Self {
        Self {
            id,
            location: None,
            group: None,
        }
    }
}

/// Dense row-major `(frames x channels)` trace buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Traces {
    data: Vec<f32>,
    num_frames: usize,
    num_channels: usize,
}

impl Traces {
    /// Build a trace buffer from row-major samples.
    ///
    /// `data.len()` must equal `num_frames * num_channels`.
    pub fn new(data: Vec<f32>, num_frames: usize, num_channels: usize) -> Result<Self> {
        if data.len() != num_frames * num_channels {
            return Err(Error::Internal {
                message: format!(
                    "trace buffer length {} does not match shape ({num_frames}, {num_channels})",
                    data.len()
                ),
            });
        }
        Ok(Self {
            data,
            num_frames,
            num_channels,
        })
    }

    /// Zero-filled buffer of the given shape.
    pub fn zeros(num_frames: usize, num_channels: usize) -> Self {
        Self {
            data: vec![0.0; num_frames * num_channels],
            num_frames,
            num_channels,
        }
    }

    /// Number of frames (rows).
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Number of channels (columns).
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// One frame as a channel slice.
    pub fn frame(&self, frame: usize) -> &[f32] {
        let start = frame * self.num_channels;
        &self.data[start..start + self.num_channels]
    }

    /// Mutable frame access.
    pub fn frame_mut(&mut self, frame: usize) -> &mut [f32] {
        let start = frame * self.num_channels;
        &mut self.data[start..start + self.num_channels]
    }

    /// Single sample.
    pub fn get(&self, frame: usize, channel: usize) -> f32 {
        self.data[frame * self.num_channels + channel]
    }

    /// Flat row-major sample slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume into the flat sample vector.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Lazy, multi-segment, channel-indexed view over a continuous recording.
///
/// Views are immutable once constructed: transforms wrap a parent view
/// instead of mutating it, and trace reads are pure, so a view can be
/// shared across threads and read concurrently.
pub trait RecordingView: Send + Sync {
    /// Number of segments in the recording.
    fn num_segments(&self) -> usize;

    /// Sampling rate in Hz, shared by all segments.
    fn sampling_rate(&self) -> f64;

    /// Total frame count of one segment.
    fn num_frames(&self, segment: usize) -> Result<u64>;

    /// Ordered channel set.
    fn channels(&self) -> &[ChannelInfo];

    /// Retrieve traces for `[start, end)` of a segment.
    ///
    /// `channels` selects a non-empty, order-preserving subset of the known
    /// channel IDs; `None` selects all channels in recording order. Fails
    /// with [`Error::OutOfRange`] for invalid frame bounds and
    /// [`Error::UnknownChannel`] for absent IDs.
    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[ChannelId]>,
    ) -> Result<Traces>;

    /// Fingerprint of this view's full construction history.
    fn fingerprint(&self) -> &Fingerprint;

    /// Descriptor file this view can be reopened from, if it has one.
    ///
    /// Leaf file-backed views return their descriptor path so sorter
    /// staging can reference the data instead of copying it; transformed
    /// and in-memory views return `None` and get materialized.
    fn source_descriptor(&self) -> Option<&std::path::Path> {
        None
    }

    /// Ordered channel IDs.
    fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels().iter().map(|c| c.id).collect()
    }

    /// Total duration across all segments, in seconds.
    fn total_duration_secs(&self) -> f64 {
        let total: u64 = (0..self.num_segments())
            .filter_map(|s| self.num_frames(s).ok())
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let frames = total as f64;
        frames / self.sampling_rate()
    }
}

/// Validate a segment index against a view.
pub fn check_segment(segment: usize, num_segments: usize) -> Result<()> {
    if segment >= num_segments {
        return Err(Error::SegmentOutOfRange {
            segment,
            num_segments,
        });
    }
    Ok(())
}

/// Validate `[start, end)` against a segment's frame count.
pub fn check_frame_bounds(segment: usize, start: u64, end: u64, num_frames: u64) -> Result<()> {
    if start >= end || end > num_frames {
        return Err(Error::OutOfRange {
            segment,
            start,
            end,
            num_frames,
        });
    }
    Ok(())
}

/// Resolve a channel selection into column indices.
///
/// `None` resolves to all channels in recording order. Explicit selections
/// preserve their given order and must be non-empty.
pub fn resolve_channels(
    known: &[ChannelInfo],
    selection: Option<&[ChannelId]>,
) -> Result<Vec<usize>> {
    match selection {
        None => Ok((0..known.len()).collect()),
        Some([]) => Err(Error::InvalidParameter {
            name: "channels".to_string(),
            message: "channel selection must not be empty".to_string(),
        }),
        Some(ids) => ids
            .iter()
            .map(|id| {
                known
                    .iter()
                    .position(|c| c.id == *id)
                    .ok_or(Error::UnknownChannel { id: *id })
            })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn channels() -> Vec<ChannelInfo> {
        (0..4).map(ChannelInfo::bare).collect()
    }

    #[test]
    fn test_resolve_all_channels() {
        let idx = resolve_channels(&channels(), None).unwrap();
        assert_eq!(idx, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_resolve_preserves_selection_order() {
        let idx = resolve_channels(&channels(), Some(&[3, 1])).unwrap();
        assert_eq!(idx, vec![3, 1]);
    }

    #[test]
    fn test_resolve_empty_selection_rejected() {
        let result = resolve_channels(&channels(), Some(&[]));
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_resolve_unknown_channel() {
        let result = resolve_channels(&channels(), Some(&[7]));
        assert!(matches!(result, Err(Error::UnknownChannel { id: 7 })));
    }

    #[test]
    fn test_frame_bounds() {
        assert!(check_frame_bounds(0, 0, 10, 10).is_ok());
        assert!(matches!(
            check_frame_bounds(0, 5, 5, 10),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            check_frame_bounds(0, 0, 11, 10),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_traces_shape_and_access() {
        let t = Traces::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(t.num_frames(), 3);
        assert_eq!(t.num_channels(), 2);
        assert_eq!(t.frame(1), &[3.0, 4.0]);
        assert!((t.get(2, 1) - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_traces_length_mismatch_rejected() {
        assert!(Traces::new(vec![0.0; 5], 3, 2).is_err());
    }
}
