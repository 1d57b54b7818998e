//! Integration tests for transform chains over lazy recordings.

use spikeline::extractor::recording::{ChannelInfo, RecordingView, Traces};
use spikeline::extractor::{BinaryRecordingView, VecRecordingView, export_recording};
use spikeline::transform::{
    BandpassFilter, BandpassParams, CommonReference, ReferenceMode, ScaleParams, ScaleTraces,
};
use std::sync::Arc;
use tempfile::TempDir;

fn file_backed_recording(dir: &std::path::Path) -> Arc<dyn RecordingView> {
    let frames = 2000;
    let mut data = Vec::with_capacity(frames * 3);
    for frame in 0..frames {
        for channel in 0..3 {
            #[allow(clippy::cast_precision_loss)]
            let t = frame as f64 / 30_000.0;
            #[allow(clippy::cast_possible_truncation)]
            let sample = ((2.0 * std::f64::consts::PI * 1000.0 * t).sin()
                + f64::from(channel as u8) * 0.5) as f32;
            data.push(sample);
        }
    }
    let rec = VecRecordingView::new(
        vec![Traces::new(data, frames, 3).unwrap()],
        (0..3).map(ChannelInfo::bare).collect(),
        30_000.0,
    )
    .unwrap();
    let descriptor = export_recording(&rec, dir).unwrap();
    Arc::new(BinaryRecordingView::open(&descriptor).unwrap())
}

#[test]
fn test_chain_over_lazy_recording_keeps_shape() {
    let dir = TempDir::new().unwrap();
    let leaf = file_backed_recording(dir.path());

    let filtered = Arc::new(
        BandpassFilter::new(
            Arc::clone(&leaf),
            BandpassParams {
                freq_min: 300.0,
                freq_max: 6000.0,
            },
        )
        .unwrap(),
    );
    let referenced = Arc::new(CommonReference::new(filtered, ReferenceMode::Median).unwrap());
    let scaled = ScaleTraces::new(
        referenced,
        ScaleParams {
            gain: 2.0,
            offset: 0.0,
        },
    )
    .unwrap();

    let traces = scaled.traces(0, 100, 400, None).unwrap();
    assert_eq!(traces.num_frames(), 300);
    assert_eq!(traces.num_channels(), 3);
    assert_eq!(scaled.num_frames(0).unwrap(), 2000);
    assert!((scaled.sampling_rate() - 30_000.0).abs() < f64::EPSILON);
}

#[test]
fn test_repeated_chain_reads_are_observationally_identical() {
    let dir = TempDir::new().unwrap();
    let leaf = file_backed_recording(dir.path());
    let chain = ScaleTraces::new(
        Arc::new(
            BandpassFilter::new(
                leaf,
                BandpassParams {
                    freq_min: 300.0,
                    freq_max: 6000.0,
                },
            )
            .unwrap(),
        ),
        ScaleParams {
            gain: 0.5,
            offset: 1.0,
        },
    )
    .unwrap();

    let first = chain.traces(0, 500, 900, None).unwrap();
    let second = chain.traces(0, 500, 900, None).unwrap();
    let third = chain.traces(0, 500, 900, Some(&[0, 1, 2])).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_equal_chains_share_a_fingerprint() {
    let dir = TempDir::new().unwrap();
    let leaf = file_backed_recording(dir.path());
    let params = BandpassParams {
        freq_min: 300.0,
        freq_max: 6000.0,
    };

    let a = BandpassFilter::new(Arc::clone(&leaf), params).unwrap();
    let b = BandpassFilter::new(Arc::clone(&leaf), params).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());

    let c = BandpassFilter::new(
        leaf,
        BandpassParams {
            freq_min: 301.0,
            freq_max: 6000.0,
        },
    )
    .unwrap();
    assert_ne!(a.fingerprint(), c.fingerprint());
}

#[test]
fn test_chain_fingerprint_depends_on_order() {
    let dir = TempDir::new().unwrap();
    let leaf = file_backed_recording(dir.path());
    let scale = ScaleParams {
        gain: 2.0,
        offset: 0.0,
    };

    let scaled_then_referenced = CommonReference::new(
        Arc::new(ScaleTraces::new(Arc::clone(&leaf), scale).unwrap()),
        ReferenceMode::Average,
    )
    .unwrap();
    let referenced_then_scaled = ScaleTraces::new(
        Arc::new(CommonReference::new(leaf, ReferenceMode::Average).unwrap()),
        scale,
    )
    .unwrap();

    assert_ne!(
        scaled_then_referenced.fingerprint(),
        referenced_then_scaled.fingerprint()
    );
}

#[test]
fn test_lazy_leaf_fingerprint_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let first = file_backed_recording(dir.path());
    let descriptor = dir.path().join("recording.json");
    let second = Arc::new(BinaryRecordingView::open(&descriptor).unwrap());

    let a = BandpassFilter::new(
        first,
        BandpassParams {
            freq_min: 300.0,
            freq_max: 6000.0,
        },
    )
    .unwrap();
    let b = BandpassFilter::new(
        second,
        BandpassParams {
            freq_min: 300.0,
            freq_max: 6000.0,
        },
    )
    .unwrap();
    // same on-disk source and same parameters: same cache key across runs
    assert_eq!(a.fingerprint(), b.fingerprint());
}
