//! Snippet windows and spike sampling policies.

use crate::constants::snippet_window;
use crate::error::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Snippet extent around a spike, in milliseconds.
///
/// Converted to frames against the recording's sampling rate at
/// extraction time, so the same window yields different frame counts for
/// recordings at different rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnippetWindow {
    /// Milliseconds before the spike frame.
    pub ms_before: f32,
    /// Milliseconds after the spike frame.
    pub ms_after: f32,
}

impl SnippetWindow {
    /// Validated window; both sides must be within bounds and the total
    /// extent must be non-empty.
    pub fn new(ms_before: f32, ms_after: f32) -> Result<Self> {
        for (name, value) in [("ms_before", ms_before), ("ms_after", ms_after)] {
            if !(0.0..=snippet_window::MAX_MS).contains(&value) {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    message: format!(
                        "must be between 0 and {} ms, got {value}",
                        snippet_window::MAX_MS
                    ),
                });
            }
        }
        if ms_before + ms_after <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "ms_before".to_string(),
                message: "snippet window must have a non-zero extent".to_string(),
            });
        }
        Ok(Self { ms_before, ms_after })
    }

    /// Frames before the spike at the given sampling rate.
    pub fn frames_before(&self, sampling_rate: f64) -> u64 {
        ms_to_frames(self.ms_before, sampling_rate)
    }

    /// Frames after the spike at the given sampling rate.
    pub fn frames_after(&self, sampling_rate: f64) -> u64 {
        ms_to_frames(self.ms_after, sampling_rate)
    }

    /// Total snippet length in frames.
    pub fn snippet_frames(&self, sampling_rate: f64) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let total = (self.frames_before(sampling_rate) + self.frames_after(sampling_rate)) as usize;
        total
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ms_to_frames(ms: f32, sampling_rate: f64) -> u64 {
    (f64::from(ms) * sampling_rate / 1000.0).round() as u64
}

/// Strategy for choosing which spikes of a unit to extract.
///
/// Serialized into the cache fingerprint, so two requests with different
/// policies never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Every spike of the unit.
    All,
    /// Seeded random subsample of at most `max_spikes`, kept in frame order.
    MaxSpikes {
        /// Maximum number of spikes to extract.
        max_spikes: usize,
        /// RNG seed; identical seeds give identical subsamples.
        seed: u64,
    },
    /// At most `max_spikes` spikes taken at a regular stride.
    EvenlySpaced {
        /// Maximum number of spikes to extract.
        max_spikes: usize,
    },
}

impl SamplingPolicy {
    /// Select spikes from `(segment, frame)` pairs in frame order.
    ///
    /// The selection is deterministic and preserves the input order.
    pub fn select(&self, spikes: &[(usize, u64)]) -> Vec<(usize, u64)> {
        match self {
            Self::All => spikes.to_vec(),
            Self::MaxSpikes { max_spikes, seed } => {
                if spikes.len() <= *max_spikes {
                    return spikes.to_vec();
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                let mut picked = rand::seq::index::sample(&mut rng, spikes.len(), *max_spikes)
                    .into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| spikes[i]).collect()
            }
            Self::EvenlySpaced { max_spikes } => {
                if spikes.len() <= *max_spikes || *max_spikes == 0 {
                    return spikes.to_vec();
                }
                let stride = spikes.len() / *max_spikes;
                spikes
                    .iter()
                    .step_by(stride.max(1))
                    .take(*max_spikes)
                    .copied()
                    .collect()
            }
        }
    }

    /// Reject nonsensical policies before any extraction work.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::MaxSpikes { max_spikes, .. } | Self::EvenlySpaced { max_spikes } => {
                if *max_spikes == 0 {
                    return Err(Error::InvalidParameter {
                        name: "max_spikes".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spikes(n: u64) -> Vec<(usize, u64)> {
        (0..n).map(|i| (0usize, i * 100)).collect()
    }

    #[test]
    fn test_window_frame_conversion() {
        let window = SnippetWindow::new(1.0, 2.0).unwrap();
        assert_eq!(window.frames_before(30_000.0), 30);
        assert_eq!(window.frames_after(30_000.0), 60);
        assert_eq!(window.snippet_frames(30_000.0), 90);
    }

    #[test]
    fn test_window_bounds() {
        assert!(SnippetWindow::new(-1.0, 2.0).is_err());
        assert!(SnippetWindow::new(1.0, 200.0).is_err());
        assert!(SnippetWindow::new(0.0, 0.0).is_err());
        assert!(SnippetWindow::new(0.0, 2.0).is_ok());
    }

    #[test]
    fn test_all_keeps_everything() {
        let selected = SamplingPolicy::All.select(&spikes(10));
        assert_eq!(selected.len(), 10);
    }

    #[test]
    fn test_max_spikes_is_deterministic() {
        let policy = SamplingPolicy::MaxSpikes {
            max_spikes: 5,
            seed: 42,
        };
        let a = policy.select(&spikes(100));
        let b = policy.select(&spikes(100));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        // selection kept in frame order
        assert!(a.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn test_max_spikes_seed_changes_selection() {
        let a = SamplingPolicy::MaxSpikes {
            max_spikes: 5,
            seed: 1,
        }
        .select(&spikes(100));
        let b = SamplingPolicy::MaxSpikes {
            max_spikes: 5,
            seed: 2,
        }
        .select(&spikes(100));
        assert_ne!(a, b);
    }

    #[test]
    fn test_max_spikes_under_limit_keeps_all() {
        let policy = SamplingPolicy::MaxSpikes {
            max_spikes: 500,
            seed: 0,
        };
        assert_eq!(policy.select(&spikes(10)).len(), 10);
    }

    #[test]
    fn test_evenly_spaced() {
        let selected = SamplingPolicy::EvenlySpaced { max_spikes: 4 }.select(&spikes(100));
        assert_eq!(selected.len(), 4);
        assert_eq!(selected[1].1 - selected[0].1, 2500);
    }

    #[test]
    fn test_zero_max_spikes_rejected() {
        let policy = SamplingPolicy::MaxSpikes {
            max_spikes: 0,
            seed: 0,
        };
        assert!(matches!(
            policy.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }
}
