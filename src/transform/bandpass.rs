//! Band-pass filter transform.
//!
//! A causal cascade of one second-order Butterworth high-pass and one
//! second-order Butterworth low-pass biquad, recomputed on every read.
//! Each read fetches a warm-up margin before the requested window from the
//! parent so the filter state has settled by the first returned frame.

use crate::constants::FILTER_MARGIN_MS;
use crate::error::{Error, Result};
use crate::extractor::recording::{ChannelId, ChannelInfo, RecordingView, Traces};
use crate::fingerprint::Fingerprint;
use crate::transform::node::check_parent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Band-pass corner frequencies in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandpassParams {
    /// High-pass corner frequency.
    pub freq_min: f64,
    /// Low-pass corner frequency.
    pub freq_max: f64,
}

/// Normalized biquad coefficients (a0 = 1).
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

/// Direct-form-I biquad state for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn lowpass(freq: f64, sampling_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * freq / sampling_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * Self::BUTTERWORTH_Q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(freq: f64, sampling_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * freq / sampling_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * Self::BUTTERWORTH_Q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn step(self, state: &mut BiquadState, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * state.x1 + self.b2 * state.x2
            - self.a1 * state.y1
            - self.a2 * state.y2;
        state.x2 = state.x1;
        state.x1 = x;
        state.y2 = state.y1;
        state.y1 = y;
        y
    }
}

/// Recording view applying a band-pass filter to its parent on demand.
pub struct BandpassFilter {
    parent: Arc<dyn RecordingView>,
    params: BandpassParams,
    highpass: Biquad,
    lowpass: Biquad,
    margin_frames: u64,
    fingerprint: Fingerprint,
}

impl BandpassFilter {
    /// Wrap a parent view with a band-pass filter.
    pub fn new(parent: Arc<dyn RecordingView>, params: BandpassParams) -> Result<Self> {
        check_parent("bandpass", &parent)?;
        let rate = parent.sampling_rate();
        let nyquist = rate / 2.0;
        if params.freq_min <= 0.0 || params.freq_min >= params.freq_max {
            return Err(Error::InvalidParameter {
                name: "freq_min".to_string(),
                message: format!(
                    "corner frequencies must satisfy 0 < freq_min < freq_max, got [{}, {}]",
                    params.freq_min, params.freq_max
                ),
            });
        }
        if params.freq_max >= nyquist {
            return Err(Error::InvalidParameter {
                name: "freq_max".to_string(),
                message: format!(
                    "freq_max {} must be below the Nyquist frequency {nyquist}",
                    params.freq_max
                ),
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let margin_frames = (f64::from(FILTER_MARGIN_MS) * rate / 1000.0).ceil() as u64;
        let fingerprint = Fingerprint::chained(parent.fingerprint(), "bandpass", &params)?;
        Ok(Self {
            highpass: Biquad::highpass(params.freq_min, rate),
            lowpass: Biquad::lowpass(params.freq_max, rate),
            parent,
            params,
            margin_frames,
            fingerprint,
        })
    }

    /// Corner frequencies this filter was built with.
    pub fn params(&self) -> BandpassParams {
        self.params
    }
}

impl RecordingView for BandpassFilter {
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
        let fetch_start = start.saturating_sub(self.margin_frames);
        let fetched = self.parent.traces(segment, fetch_start, end, channels)?;

        let num_channels = fetched.num_channels();
        #[allow(clippy::cast_possible_truncation)]
        let skip = (start - fetch_start) as usize;
        let out_frames = fetched.num_frames() - skip;

        let mut hp_states = vec![BiquadState::default(); num_channels];
        let mut lp_states = vec![BiquadState::default(); num_channels];
        let mut out = Vec::with_capacity(out_frames * num_channels);
        for frame in 0..fetched.num_frames() {
            let row = fetched.frame(frame);
            for (channel, sample) in row.iter().enumerate() {
                let hp = self.highpass.step(&mut hp_states[channel], f64::from(*sample));
                let bp = self.lowpass.step(&mut lp_states[channel], hp);
                if frame >= skip {
                    #[allow(clippy::cast_possible_truncation)]
                    out.push(bp as f32);
                }
            }
        }
        Traces::new(out, out_frames, num_channels)
    }

    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
