//! Analysis pipeline integration tests
//!
//! Drives the synchronous [`Analyzer`] and its components with synthetic
//! signals and checks the documented feature contracts.
//!
//! Run with:
//! ```bash
//! cargo test -p auralis --test analysis_integration
//! ```

mod helpers;

use approx::assert_abs_diff_eq;
use auralis::analysis::{
    detect_key, AnalysisHandle, BandLevels, ChromaConfig, ChromaKeyAnalyzer, DynamicsConfig,
    DynamicsNormalizer, TempoConfig, TempoTracker,
};
use auralis::prelude::*;
use helpers::tolerances::*;
use helpers::*;

fn impulse_train(period: usize, ticks: usize, amplitude: f32) -> impl Iterator<Item = f32> {
    (0..ticks).map(move |t| if t % period == 0 { amplitude } else { 0.0 })
}

/// Silence in every representation yields the neutral frame.
#[test]
fn test_silence_yields_neutral_frames() {
    let mut analyzer = test_analyzer();
    let inputs = [
        silent_frame(),
        RawFrame::default(),
        RawFrame::from_bytes(&[0u8; 1024], &[128u8; 2048], TEST_SAMPLE_RATE),
        RawFrame::new(vec![1e-6; 1024], vec![-1e-6; 2048], TEST_SAMPLE_RATE),
    ];

    for (tick, input) in inputs.iter().enumerate() {
        let frame = analyzer.process(input).unwrap();
        let time = tick as f64 / TEST_TICK_RATE as f64;
        assert_eq!(frame, FeatureFrame::neutral(tick as u64, time));
        assert_eq!(frame.volume, 0.0);
        assert_eq!(frame.energy, 0.0);
        assert_eq!(frame.rhythmic.bpm, 0.0);
        assert_eq!(frame.context.mode, Mode::Unknown);
        assert!(!frame.transients.any());
    }
}

/// A periodic ODF converges to 60·tickRate/k.
#[test]
fn test_bpm_converges_for_periodic_odf() {
    for period in [12usize, 15, 18, 20] {
        let mut tracker = TempoTracker::new(TempoConfig::default(), TEST_TICK_RATE);
        for odf in impulse_train(period, 300, 1.0) {
            tracker.update(odf);
        }
        let expected = 60.0 * TEST_TICK_RATE / period as f32;
        let bpm = tracker.report().bpm;
        assert!(
            (bpm - expected).abs() <= BPM_EPSILON,
            "period {period}: expected {expected} BPM, got {bpm}"
        );
    }
}

/// Scaling the ODF uniformly does not move the tempo.
#[test]
fn test_bpm_is_amplitude_invariant() {
    let bpm_at = |amplitude: f32| {
        let mut tracker = TempoTracker::new(TempoConfig::default(), TEST_TICK_RATE);
        for odf in impulse_train(20, 300, amplitude) {
            tracker.update(odf);
        }
        tracker.report().bpm
    };

    let reference = bpm_at(1.0);
    assert!((reference - 90.0).abs() <= BPM_EPSILON);
    for amplitude in [0.25, 4.0, 100.0] {
        let bpm = bpm_at(amplitude);
        assert!(
            (bpm - reference).abs() < 1e-3,
            "amplitude {amplitude}: {bpm} vs {reference}"
        );
    }
}

/// 300 ticks of broadband bursts at 120 BPM through the full pipeline.
#[test]
fn test_120_bpm_scenario() {
    let mut analyzer = test_analyzer();
    let mut confident_after = None;

    for (tick, input) in beat_frames(15, 300).iter().enumerate() {
        let frame = analyzer.process(input).unwrap();
        if confident_after.is_none() && frame.rhythmic.bpm_confidence > 50.0 {
            confident_after = Some(tick);
        }
    }

    let report = analyzer.tempo_report();
    assert!(
        (118.0..=122.0).contains(&report.bpm),
        "expected ~120 BPM, got {}",
        report.bpm
    );
    assert!(report.confidence > 50.0, "confidence {}", report.confidence);
    assert!(confident_after.is_some());
    assert!(!report.beat_times.is_empty());
    for pair in report.beat_times.windows(2) {
        assert!((pair[1] - pair[0] - 0.5).abs() < 0.05, "beats {pair:?}");
    }
}

/// YIN on clean sines across the vocal/instrument range.
#[test]
fn test_yin_within_one_percent() {
    let handle = AnalysisHandle::new(AnalyzerConfig::default());
    for freq in [82.41f32, 110.0, 196.0, 261.63, 440.0, 659.25, 987.77] {
        let samples = generate_sine(freq, 0.8, 2048);
        let result = handle.detect_pitch(&samples);
        let error = (result.frequency - freq).abs() / freq;
        assert!(
            error < PITCH_RELATIVE,
            "{freq} Hz: detected {} Hz",
            result.frequency
        );
        assert!(
            result.confidence > MIN_PITCH_CONFIDENCE,
            "{freq} Hz: confidence {}",
            result.confidence
        );
    }
}

/// A pure A4 peaks at pitch class 9 and the chroma is normalized.
#[test]
fn test_a4_chroma() {
    let mut chroma = ChromaKeyAnalyzer::new(ChromaConfig::default());
    let frame = sine_frame(440.0, 0.8);
    let vector = chroma.update_chroma(&frame.spectrum, frame.sample_rate);
    assert_eq!(chroma_peak(&vector), 9);
    assert_abs_diff_eq!(vector.iter().sum::<f32>(), 1.0, epsilon = FLOAT_EPSILON);

    let mut analyzer = test_analyzer();
    let features = analyzer.process(&frame).unwrap();
    assert_eq!(chroma_peak(&features.melodic.pitch_class), 9);
    assert_abs_diff_eq!(
        features.melodic.pitch_class.iter().sum::<f32>(),
        1.0,
        epsilon = FLOAT_EPSILON
    );
    assert_eq!(features.melodic.dominant_note, "A4");
}

#[test]
fn test_key_detection() {
    let mut triad = [0.0; 12];
    for pc in [0, 4, 7] {
        triad[pc] = 1.0 / 3.0;
    }
    let key = detect_key(&triad, MIN_KEY_CORRELATION);
    assert_eq!(key.root, PitchClass::C);
    assert_eq!(key.mode, Mode::Major);
    assert!(key.correlation >= MIN_KEY_CORRELATION);

    let uniform = [1.0 / 12.0; 12];
    assert_eq!(detect_key(&uniform, MIN_KEY_CORRELATION).mode, Mode::Unknown);
}

/// A sustained alternating surge fires the drop detector once per cooldown.
#[test]
fn test_drop_cooldown_under_sustained_surges() {
    let config = DynamicsConfig::default();
    let cooldown = config.drop.cooldown_secs;
    let mut dynamics = DynamicsNormalizer::new(&config);
    let tick_secs = 1.0 / TEST_TICK_RATE as f64;

    let mut triggers = Vec::new();
    for tick in 0..300 {
        let level = if tick % 2 == 0 { 0.05 } else { 0.95 };
        let bands = BandLevels {
            bass: level,
            mid: level,
            treble: level,
        };
        let now = tick as f64 * tick_secs;
        if dynamics.process(bands, level, now).drop_triggered {
            triggers.push(now);
        }
    }

    assert!(triggers.len() >= 2, "triggers {triggers:?}");
    for pair in triggers.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown - 1e-9, "triggers {triggers:?}");
    }
}

/// Replaying the same frames after a reset reproduces the output exactly.
#[test]
fn test_replay_after_reset_is_identical() {
    let mut inputs = beat_frames(14, 90);
    inputs.extend((0..20).map(|i| sine_frame(220.0 + 20.0 * i as f32, 0.6)));
    inputs.push(silent_frame());
    inputs.extend((0..20).map(|seed| {
        let noise = generate_noise(2048, 0.5, seed);
        RawFrame::from_pcm(&noise, TEST_SAMPLE_RATE, 2048)
    }));

    let mut analyzer = test_analyzer();
    let first: Vec<FeatureFrame> = inputs
        .iter()
        .map(|f| analyzer.process(f).unwrap())
        .collect();

    analyzer.reset();
    let second: Vec<FeatureFrame> = inputs
        .iter()
        .map(|f| analyzer.process(f).unwrap())
        .collect();

    let mut fresh = test_analyzer();
    let third: Vec<FeatureFrame> = inputs.iter().map(|f| fresh.process(f).unwrap()).collect();

    assert_eq!(first, second);
    assert_eq!(first, third);
}

/// Garbage input never produces out-of-range values.
#[test]
fn test_non_finite_input_is_contained() {
    let mut analyzer = test_analyzer();
    let mut spectrum = vec![0.3; 1024];
    spectrum[10] = f32::NAN;
    spectrum[20] = f32::INFINITY;
    spectrum[30] = -5.0;
    let mut waveform = generate_sine(440.0, 0.5, 2048);
    waveform[100] = f32::NAN;
    waveform[200] = f32::NEG_INFINITY;

    let frame = analyzer
        .process(&RawFrame::new(spectrum, waveform, TEST_SAMPLE_RATE))
        .unwrap();
    assert!((0.0..=1.0).contains(&frame.volume));
    assert!((0.0..=1.0).contains(&frame.energy));
    assert!(frame.melodic.dominant_frequency.is_finite());
    assert!(frame.melodic.pitch_class.iter().all(|v| v.is_finite() && *v >= 0.0));
    assert!((frame.melodic.pitch_class.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    assert!((0.0..=1.0).contains(&frame.spectral.centroid));
}
