//! Property tests for the analysis pipeline
//!
//! Run with:
//! ```bash
//! cargo test -p auralis --test property_tests
//! ```

mod helpers;

use auralis::analysis::{AdaptiveEnvelope, EnvelopeConfig};
use auralis::prelude::*;
use helpers::*;
use proptest::prelude::*;

/// (frequency, amplitude) per tick; amplitude 0 makes a silent tick.
fn tone_sequence() -> impl Strategy<Value = Vec<(f32, f32)>> {
    prop::collection::vec((60.0f32..2000.0, prop_oneof![Just(0.0f32), 0.01f32..1.0]), 1..24)
}

fn tone_frames(tones: &[(f32, f32)]) -> Vec<RawFrame> {
    tones
        .iter()
        .map(|&(freq, amplitude)| {
            if amplitude == 0.0 {
                silent_frame()
            } else {
                sine_frame(freq, amplitude)
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Same ordered input, fresh or reset analyzer: identical output.
    #[test]
    fn prop_replay_is_deterministic(tones in tone_sequence()) {
        let frames = tone_frames(&tones);

        let mut analyzer = test_analyzer();
        let first: Vec<FeatureFrame> = frames.iter().map(|f| analyzer.process(f).unwrap()).collect();
        analyzer.reset();
        let second: Vec<FeatureFrame> = frames.iter().map(|f| analyzer.process(f).unwrap()).collect();

        prop_assert_eq!(first, second);
    }

    /// Every field stays within its documented range.
    #[test]
    fn prop_features_stay_in_range(
        spectrum in prop::collection::vec(-2.0f32..2.0, 0..1200),
        waveform in prop::collection::vec(-4.0f32..4.0, 0..2500),
    ) {
        let mut analyzer = test_analyzer();
        let frame = analyzer.process(&RawFrame::new(spectrum, waveform, TEST_SAMPLE_RATE)).unwrap();

        let unit = 0.0f32..=1.0;
        prop_assert!(unit.contains(&frame.volume));
        prop_assert!(unit.contains(&frame.energy));
        for band in [frame.bands.bass, frame.bands.mid, frame.bands.treble] {
            prop_assert!(unit.contains(&band));
        }
        for band in [frame.dynamic_bands.bass, frame.dynamic_bands.mid, frame.dynamic_bands.treble] {
            prop_assert!(unit.contains(&band));
        }
        prop_assert!(unit.contains(&frame.spectral.centroid));
        prop_assert!(unit.contains(&frame.spectral.flux));
        prop_assert!(unit.contains(&frame.rhythmic.beat_phase));
        prop_assert!((0.0..=100.0).contains(&frame.rhythmic.bpm_confidence));
        prop_assert!(frame.melodic.dominant_frequency.is_finite());
        prop_assert!((frame.melodic.pitch_class.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        prop_assert!(frame.timbre.dominant_chroma < 12);
        prop_assert!(unit.contains(&frame.context.tension));
    }

    /// Frames below the silence floor are always neutral.
    #[test]
    fn prop_sub_floor_frames_are_neutral(
        spectrum in prop::collection::vec(0.0f32..5e-5, 1..1024),
        waveform in prop::collection::vec(-5e-5f32..5e-5, 0..2048),
    ) {
        let mut analyzer = test_analyzer();
        let frame = analyzer.process(&RawFrame::new(spectrum, waveform, TEST_SAMPLE_RATE)).unwrap();
        prop_assert_eq!(frame, FeatureFrame::neutral(0, 0.0));
    }

    /// 0 ≤ min ≤ max - 0.1 ≤ 1 after any input sequence.
    #[test]
    fn prop_envelope_invariants(values in prop::collection::vec(prop::num::f32::ANY, 1..500)) {
        let mut envelope = AdaptiveEnvelope::new(EnvelopeConfig::default());
        for v in values {
            let out = envelope.update(v);
            prop_assert!(envelope.min() >= 0.0);
            prop_assert!(envelope.min() <= envelope.max() - 0.1 + 1e-6);
            prop_assert!(envelope.max() <= 1.0);
            if envelope.max() - envelope.min() > 0.01 {
                prop_assert!((0.0..=1.0).contains(&out));
            }
        }
    }
}
