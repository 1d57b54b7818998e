//! Affine scaling transform.

use crate::error::Result;
use crate::extractor::recording::{ChannelId, ChannelInfo, RecordingView, Traces};
use crate::fingerprint::Fingerprint;
use crate::transform::node::check_parent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gain and offset applied to every sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    /// Multiplicative gain.
    pub gain: f32,
    /// Additive offset, applied after the gain.
    pub offset: f32,
}

/// Recording view applying `gain * sample + offset` on demand.
pub struct ScaleTraces {
    parent: Arc<dyn RecordingView>,
    params: ScaleParams,
    fingerprint: Fingerprint,
}

impl ScaleTraces {
    /// Wrap a parent view with an affine scaling.
    pub fn new(parent: Arc<dyn RecordingView>, params: ScaleParams) -> Result<Self> {
        check_parent("scale", &parent)?;
        let fingerprint = Fingerprint::chained(parent.fingerprint(), "scale", &params)?;
        Ok(Self {
            parent,
            params,
            fingerprint,
        })
    }
}

impl RecordingView for ScaleTraces {
    fn num_segments(&self) -> usize {
        self.parent.num_segments()
    }

    fn sampling_rate(&self) -> f64 {
        self.parent.sampling_rate()
    }

    fn num_frames(&self, segment: usize) -> Result<u64> {
        self.parent.num_frames(segment)
    }

    fn channels(&self) -> &[ChannelInfo] {
        self.parent.channels()
    }

    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[ChannelId]>,
    ) -> Result<Traces> {
        let fetched = self.parent.traces(segment, start, end, channels)?;
        let (frames, cols) = (fetched.num_frames(), fetched.num_channels());
        let data = fetched
            .into_vec()
            .into_iter()
            .map(|s| s.mul_add(self.params.gain, self.params.offset))
            .collect();
        Traces::new(data, frames, cols)
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extractor::memory::VecRecordingView;

    fn recording() -> Arc<dyn RecordingView> {
        let t = Traces::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        Arc::new(
            VecRecordingView::new(vec![t], (0..2).map(ChannelInfo::bare).collect(), 30_000.0)
                .unwrap(),
        )
    }

    #[test]
    fn test_scaling_applied() {
        let view = ScaleTraces::new(
            recording(),
            ScaleParams {
                gain: 2.0,
                offset: 1.0,
            },
        )
        .unwrap();
        let t = view.traces(0, 0, 2, None).unwrap();
        assert_eq!(t.frame(0), &[3.0, 5.0]);
        assert_eq!(t.frame(1), &[7.0, 9.0]);
    }

    #[test]
    fn test_chain_of_transforms_composes() {
        let inner = Arc::new(
            ScaleTraces::new(
                recording(),
                ScaleParams {
                    gain: 2.0,
                    offset: 0.0,
                },
            )
            .unwrap(),
        );
        let outer = ScaleTraces::new(
            inner,
            ScaleParams {
                gain: 1.0,
                offset: -1.0,
            },
        )
        .unwrap();
        let t = outer.traces(0, 0, 1, None).unwrap();
        assert_eq!(t.frame(0), &[1.0, 3.0]);
    }

    #[test]
    fn test_params_change_fingerprint() {
        let rec = recording();
        let a = ScaleTraces::new(
            Arc::clone(&rec),
            ScaleParams {
                gain: 2.0,
                offset: 0.0,
            },
        )
        .unwrap();
        let b = ScaleTraces::new(
            rec,
            ScaleParams {
                gain: 2.0,
                offset: 0.5,
            },
        )
        .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
