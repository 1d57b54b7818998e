//! Integration tests for the waveform cache engine.

use spikeline::cache::{SamplingPolicy, SnippetWindow, WaveformCache};
use spikeline::extractor::recording::{ChannelId, ChannelInfo, RecordingView, Traces};
use spikeline::extractor::{VecRecordingView, VecSortingView};
use spikeline::fingerprint::Fingerprint;
use spikeline::transform::{BandpassFilter, BandpassParams};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Wrapper counting every trace read that reaches the underlying view.
struct CountingRecording {
    inner: Arc<dyn RecordingView>,
    reads: AtomicUsize,
}

impl CountingRecording {
    fn new(inner: Arc<dyn RecordingView>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RecordingView for CountingRecording {
    fn num_segments(&self) -> usize {
        self.inner.num_segments()
    }

    fn sampling_rate(&self) -> f64 {
        self.inner.sampling_rate()
    }

    fn num_frames(&self, segment: usize) -> spikeline::Result<u64> {
        self.inner.num_frames(segment)
    }

    fn channels(&self) -> &[ChannelInfo] {
        self.inner.channels()
    }

    fn traces(
        &self,
        segment: usize,
        start: u64,
        end: u64,
        channels: Option<&[ChannelId]>,
    ) -> spikeline::Result<Traces> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.traces(segment, start, end, channels)
    }

    fn fingerprint(&self) -> &Fingerprint {
        self.inner.fingerprint()
    }
}

/// 2-segment, 30 kHz, 4-channel recording with a deterministic ramp.
fn two_segment_recording() -> Arc<dyn RecordingView> {
    let make = |frames: usize, base: f32| {
        let mut data = Vec::with_capacity(frames * 4);
        for frame in 0..frames {
            for channel in 0..4 {
                #[allow(clippy::cast_precision_loss)]
                data.push(base + (frame * 4 + channel) as f32 * 1e-3);
            }
        }
        Traces::new(data, frames, 4).unwrap()
    };
    Arc::new(
        VecRecordingView::new(
            vec![make(6000, 0.0), make(4000, 100.0)],
            (0..4).map(ChannelInfo::bare).collect(),
            30_000.0,
        )
        .unwrap(),
    )
}

fn sorting() -> VecSortingView {
    let mut spikes = BTreeMap::new();
    // unit 3 has spikes in both segments, all clear of the boundaries
    spikes.insert(3, vec![vec![500, 1500, 3000, 4500], vec![800, 2000]]);
    spikes.insert(7, vec![vec![1000], vec![]]);
    VecSortingView::new(spikes, 2).unwrap()
}

fn window() -> SnippetWindow {
    SnippetWindow::new(1.0, 2.0).unwrap()
}

#[test]
fn test_bandpassed_two_segment_scenario_shape() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());

    let filtered: Arc<dyn RecordingView> = Arc::new(
        BandpassFilter::new(
            two_segment_recording(),
            BandpassParams {
                freq_min: 300.0,
                freq_max: 6000.0,
            },
        )
        .unwrap(),
    );

    let waveforms = cache
        .waveforms(
            filtered.as_ref(),
            &sorting(),
            3,
            window(),
            &SamplingPolicy::All,
            None,
        )
        .unwrap();

    // (-1 ms, +2 ms) at 30 kHz is 30 + 60 = 90 frames across 4 channels
    assert_eq!(waveforms.shape(), (6, 90, 4));
    assert_eq!(waveforms.snippet(0).len(), 90 * 4);
}

#[test]
fn test_second_call_is_bit_identical_and_read_free() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());
    let recording = CountingRecording::new(two_segment_recording());
    let sorting = sorting();

    let first = cache
        .waveforms(&recording, &sorting, 3, window(), &SamplingPolicy::All, None)
        .unwrap();
    let reads_after_first = recording.reads();
    assert_eq!(reads_after_first, 6); // one read per extracted spike

    let second = cache
        .waveforms(&recording, &sorting, 3, window(), &SamplingPolicy::All, None)
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(first.data(), second.data());
    // served from disk: no new trace reads
    assert_eq!(recording.reads(), reads_after_first);
}

#[test]
fn test_concurrent_requests_share_one_computation() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());
    let recording = CountingRecording::new(two_segment_recording());
    let sorting = sorting();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    cache
                        .waveforms(&recording, &sorting, 3, window(), &SamplingPolicy::All, None)
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // exactly one underlying computation: one trace read per spike
    assert_eq!(recording.reads(), 6);
    let reference = results[0].data();
    for result in &results {
        assert_eq!(result.data(), reference);
    }
}

#[test]
fn test_different_windows_use_different_entries() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());
    let recording = two_segment_recording();
    let sorting = sorting();

    let narrow = cache
        .waveforms(
            recording.as_ref(),
            &sorting,
            3,
            window(),
            &SamplingPolicy::All,
            None,
        )
        .unwrap();
    let wide = cache
        .waveforms(
            recording.as_ref(),
            &sorting,
            3,
            SnippetWindow::new(2.0, 4.0).unwrap(),
            &SamplingPolicy::All,
            None,
        )
        .unwrap();

    assert_ne!(narrow.fingerprint, wide.fingerprint);
    assert_eq!(wide.shape(), (6, 180, 4));
    assert!(!wide.from_cache);
}

#[test]
fn test_subsampling_policy_limits_and_is_stable() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());
    let recording = two_segment_recording();
    let sorting = sorting();
    let policy = SamplingPolicy::MaxSpikes {
        max_spikes: 3,
        seed: 11,
    };

    let first = cache
        .waveforms(recording.as_ref(), &sorting, 3, window(), &policy, None)
        .unwrap();
    assert_eq!(first.num_spikes, 3);
    assert_eq!(first.requested_spikes, 3);

    let second = cache
        .waveforms(recording.as_ref(), &sorting, 3, window(), &policy, None)
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(first.data(), second.data());
}

#[test]
fn test_clear_prefix_forces_recomputation() {
    let cache_dir = TempDir::new().unwrap();
    let cache = WaveformCache::new(cache_dir.path().to_path_buf());
    let recording = two_segment_recording();
    let sorting = sorting();

    let first = cache
        .waveforms(
            recording.as_ref(),
            &sorting,
            3,
            window(),
            &SamplingPolicy::All,
            None,
        )
        .unwrap();

    let removed = cache.clear_prefix(&first.fingerprint.as_str()[..8]).unwrap();
    assert_eq!(removed, 1);

    let again = cache
        .waveforms(
            recording.as_ref(),
            &sorting,
            3,
            window(),
            &SamplingPolicy::All,
            None,
        )
        .unwrap();
    assert!(!again.from_cache);
    assert_eq!(first.data(), again.data());
}
