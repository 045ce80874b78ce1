//! Loudness-independent dynamics.
//!
//! - [`AdaptiveEnvelope`]: slowly adapting min/max tracker that maps a raw
//!   scalar into 0..1 regardless of absolute level
//! - [`TransientDetector`]: per-register onset spikes against a rolling
//!   average and an exponentially smoothed running value
//! - [`DropDetector`]: sudden surges of normalized energy, rate limited by a cooldown
//!
//! [`DynamicsNormalizer`] bundles one envelope per band plus overall energy,
//! four transient detectors and the drop detector.

use crate::config::{DropConfig, DynamicsConfig, EnvelopeConfig, TransientConfig};
use crate::frame::{BandLevels, Transients};
use crate::history::History;

#[inline]
fn unit_input(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Adaptive `{min, max}` range.
///
/// Invariant after every update: `0 <= min <= max - min_range` and `max <= 1`.
#[derive(Debug, Clone)]
pub struct AdaptiveEnvelope {
    min: f32,
    max: f32,
    config: EnvelopeConfig,
}

impl AdaptiveEnvelope {
    pub fn new(config: EnvelopeConfig) -> Self {
        let mut envelope = Self {
            min: 0.0,
            max: 1.0,
            config,
        };
        envelope.enforce_bounds();
        envelope
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn reset(&mut self) {
        self.min = 0.0;
        self.max = 1.0;
        self.enforce_bounds();
    }

    /// Feed one value and return it normalized against the updated range.
    pub fn update(&mut self, value: f32) -> f32 {
        let value = unit_input(value);
        let c = &self.config;

        if value > self.max {
            self.max += (value - self.max) * c.attack;
        } else {
            self.max -= (self.max - c.release_floor) * c.release;
        }

        if value < self.min {
            self.min += (value - self.min) * c.attack;
        } else {
            // Creep keeps the floor from freezing on a long silence.
            self.min += (value - self.min) * c.creep + c.creep_threshold;
        }

        self.enforce_bounds();
        self.normalize(value)
    }

    /// Normalize against the current range without updating it.
    pub fn normalize(&self, value: f32) -> f32 {
        let value = unit_input(value);
        let range = self.max - self.min;
        if range > self.config.active_range {
            ((value - self.min) / range).clamp(0.0, 1.0)
        } else {
            value
        }
    }

    fn enforce_bounds(&mut self) {
        let c = &self.config;
        self.min = if self.min.is_finite() {
            self.min.clamp(0.0, c.min_ceiling)
        } else {
            0.0
        };
        let max = if self.max.is_finite() { self.max } else { 1.0 };
        self.max = max.max(self.min + c.min_range).min(1.0);
    }
}

/// Fires when a value jumps above both its recent average and its smoothed running level.
#[derive(Debug, Clone)]
pub struct TransientDetector {
    config: TransientConfig,
    history: History<f32>,
    running: f32,
}

impl TransientDetector {
    pub fn new(config: TransientConfig) -> Self {
        Self {
            config,
            history: History::new(config.history),
            running: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.running = 0.0;
    }

    pub fn running(&self) -> f32 {
        self.running
    }

    pub fn detect(&mut self, value: f32) -> bool {
        let value = unit_input(value);
        let c = self.config;

        let adaptive = c.threshold.max(self.history.mean() * c.multiplier);
        let fired = value > adaptive && value > self.running * c.multiplier;

        self.running = self.running * c.decay + value * (1.0 - c.decay);
        self.history.push(value);
        fired
    }
}

/// Detects energy surges and reports a decaying intensity.
#[derive(Debug, Clone)]
pub struct DropDetector {
    config: DropConfig,
    prev_energy: Option<f32>,
    last_trigger: Option<f64>,
    intensity: f32,
}

impl DropDetector {
    pub fn new(config: DropConfig) -> Self {
        Self {
            config,
            prev_energy: None,
            last_trigger: None,
            intensity: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.prev_energy = None;
        self.last_trigger = None;
        self.intensity = 0.0;
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Feed the normalized energy at engine time `now` (seconds).
    /// Returns true when a drop triggered on this tick.
    pub fn update(&mut self, normalized_energy: f32, now: f64) -> bool {
        let energy = unit_input(normalized_energy);
        self.intensity *= self.config.decay;

        let mut triggered = false;
        if let Some(prev) = self.prev_energy {
            let surge = energy - prev;
            let cooled = self
                .last_trigger
                .is_none_or(|t| now - t >= self.config.cooldown_secs);
            if surge > self.config.threshold && cooled {
                self.intensity = surge.min(1.0);
                self.last_trigger = Some(now);
                triggered = true;
            }
        }
        self.prev_energy = Some(energy);
        triggered
    }

    /// A tick without usable input: decay, and treat the tick as zero energy
    /// so the next surge is measured from silence.
    pub fn idle(&mut self) {
        self.intensity *= self.config.decay;
        self.prev_energy = Some(0.0);
    }
}

/// Output of [`DynamicsNormalizer::process`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DynamicsSnapshot {
    pub dynamic_bands: BandLevels,
    pub normalized_energy: f32,
    pub transients: Transients,
    pub drop_intensity: f32,
    pub drop_triggered: bool,
}

pub struct DynamicsNormalizer {
    bass: AdaptiveEnvelope,
    mid: AdaptiveEnvelope,
    treble: AdaptiveEnvelope,
    energy: AdaptiveEnvelope,
    bass_transient: TransientDetector,
    mid_transient: TransientDetector,
    treble_transient: TransientDetector,
    overall_transient: TransientDetector,
    drop: DropDetector,
}

impl DynamicsNormalizer {
    pub fn new(config: &DynamicsConfig) -> Self {
        Self {
            bass: AdaptiveEnvelope::new(config.envelope),
            mid: AdaptiveEnvelope::new(config.envelope),
            treble: AdaptiveEnvelope::new(config.envelope),
            energy: AdaptiveEnvelope::new(config.envelope),
            bass_transient: TransientDetector::new(config.bass),
            mid_transient: TransientDetector::new(config.mid),
            treble_transient: TransientDetector::new(config.treble),
            overall_transient: TransientDetector::new(config.overall),
            drop: DropDetector::new(config.drop),
        }
    }

    pub fn reset(&mut self) {
        for envelope in [
            &mut self.bass,
            &mut self.mid,
            &mut self.treble,
            &mut self.energy,
        ] {
            envelope.reset();
        }
        for detector in [
            &mut self.bass_transient,
            &mut self.mid_transient,
            &mut self.treble_transient,
            &mut self.overall_transient,
        ] {
            detector.reset();
        }
        self.drop.reset();
    }

    pub fn process(&mut self, bands: BandLevels, energy: f32, now: f64) -> DynamicsSnapshot {
        let dynamic_bands = BandLevels {
            bass: self.bass.update(bands.bass),
            mid: self.mid.update(bands.mid),
            treble: self.treble.update(bands.treble),
        };
        let normalized_energy = self.energy.update(energy);

        let transients = Transients {
            bass: self.bass_transient.detect(bands.bass),
            mid: self.mid_transient.detect(bands.mid),
            treble: self.treble_transient.detect(bands.treble),
            overall: self.overall_transient.detect(energy),
        };

        let drop_triggered = self.drop.update(normalized_energy, now);

        DynamicsSnapshot {
            dynamic_bands,
            normalized_energy,
            transients,
            drop_intensity: self.drop.intensity(),
            drop_triggered,
        }
    }

    /// A tick without usable input. Only the drop detector advances.
    pub fn idle(&mut self) {
        self.drop.idle();
    }

    pub fn drop_intensity(&self) -> f32 {
        self.drop.intensity()
    }

    pub fn envelopes(&self) -> [&AdaptiveEnvelope; 4] {
        [&self.bass, &self.mid, &self.treble, &self.energy]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn assert_envelope_invariants(env: &AdaptiveEnvelope) {
        assert!(env.min() >= 0.0, "min {} < 0", env.min());
        assert!(
            env.min() <= env.max() - 0.1 + 1e-6,
            "min {} > max {} - 0.1",
            env.min(),
            env.max()
        );
        assert!(env.max() <= 1.0, "max {} > 1", env.max());
    }

    #[test]
    fn test_envelope_tracks_range() {
        let mut env = AdaptiveEnvelope::new(EnvelopeConfig::default());
        for i in 0..300 {
            let v = if i % 2 == 0 { 0.2 } else { 0.6 };
            env.update(v);
        }
        assert!(env.max() > 0.5 && env.max() <= 0.65, "max {}", env.max());
        assert!(env.min() < 0.3, "min {}", env.min());
        assert!(env.normalize(0.6) > 0.8);
        assert!(env.normalize(0.2) < 0.3);
    }

    #[test]
    fn test_envelope_floor_does_not_freeze_on_silence() {
        let mut env = AdaptiveEnvelope::new(EnvelopeConfig::default());
        for _ in 0..200 {
            env.update(0.0);
        }
        let floor_after_silence = env.min();
        for _ in 0..200 {
            env.update(0.5);
        }
        assert!(env.min() > floor_after_silence);
        assert_envelope_invariants(&env);
    }

    #[test]
    fn test_envelope_handles_garbage() {
        let mut env = AdaptiveEnvelope::new(EnvelopeConfig::default());
        for v in [f32::NAN, f32::INFINITY, -3.0, 7.0, f32::NEG_INFINITY] {
            let out = env.update(v);
            assert!((0.0..=1.0).contains(&out));
            assert_envelope_invariants(&env);
        }
    }

    proptest! {
        #[test]
        fn prop_envelope_invariants_hold(values in prop::collection::vec(-0.5f32..1.5, 1..400)) {
            let mut env = AdaptiveEnvelope::new(EnvelopeConfig::default());
            for v in values {
                let out = env.update(v);
                prop_assert!(env.min() >= 0.0);
                prop_assert!(env.min() <= env.max() - 0.1 + 1e-6);
                prop_assert!(env.max() <= 1.0);
                if env.max() - env.min() > 0.01 {
                    prop_assert!((0.0..=1.0).contains(&out));
                }
            }
        }
    }

    #[test]
    fn test_transient_fires_on_spike_only() {
        let mut detector = TransientDetector::new(TransientConfig::BASS);
        for _ in 0..20 {
            assert!(!detector.detect(0.1));
        }
        assert!(detector.detect(0.8), "spike should fire");
        // A sustained level stops firing once history and running value catch up
        for _ in 0..10 {
            detector.detect(0.8);
        }
        for _ in 0..10 {
            assert!(!detector.detect(0.8));
        }
    }

    #[test]
    fn test_transient_respects_floor() {
        let mut detector = TransientDetector::new(TransientConfig::TREBLE);
        assert!(!detector.detect(0.05));
        detector.reset();
        assert!(detector.detect(0.5));
    }

    #[test]
    fn test_drop_fires_once_per_cooldown() {
        let mut drop = DropDetector::new(DropConfig::default());
        let tick = 1.0 / 30.0;
        let mut triggers = Vec::new();
        // Alternate low/high every tick: a surge of 0.9 every other tick for 5 s
        for i in 0..150 {
            let energy = if i % 2 == 0 { 0.05 } else { 0.95 };
            if drop.update(energy, i as f64 * tick) {
                triggers.push(i as f64 * tick);
            }
        }
        assert!(!triggers.is_empty());
        for pair in triggers.windows(2) {
            assert!(pair[1] - pair[0] >= 2.0 - 1e-9);
        }
        assert_eq!(triggers.len(), 3);
    }

    #[test]
    fn test_drop_intensity_decays() {
        let mut drop = DropDetector::new(DropConfig::default());
        drop.update(0.0, 0.0);
        assert!(drop.update(0.8, 0.1));
        assert_abs_diff_eq!(drop.intensity(), 0.8, epsilon = 1e-6);
        drop.update(0.8, 0.2);
        assert_abs_diff_eq!(drop.intensity(), 0.8 * 0.95, epsilon = 1e-6);
    }

    #[test]
    fn test_surge_after_silence_is_measured_from_silence() {
        let mut drop = DropDetector::new(DropConfig::default());
        drop.update(0.8, 0.0);
        drop.update(0.8, 0.1);
        for _ in 0..60 {
            drop.idle();
        }
        assert!(drop.update(0.8, 5.0));
        assert_abs_diff_eq!(drop.intensity(), 0.8, epsilon = 1e-6);

        let mut dynamics = DynamicsNormalizer::new(&DynamicsConfig::default());
        dynamics.drop.update(0.8, 0.0);
        dynamics.idle();
        assert_eq!(dynamics.drop.prev_energy, Some(0.0));
    }

    #[test]
    fn test_normalizer_reset_clears_everything() {
        let mut dynamics = DynamicsNormalizer::new(&DynamicsConfig::default());
        let loud = BandLevels {
            bass: 0.9,
            mid: 0.9,
            treble: 0.9,
        };
        dynamics.process(BandLevels::default(), 0.0, 0.0);
        dynamics.process(loud, 0.9, 0.1);
        dynamics.reset();

        let fresh = DynamicsNormalizer::new(&DynamicsConfig::default());
        for (a, b) in dynamics.envelopes().iter().zip(fresh.envelopes().iter()) {
            assert_eq!(a.min(), b.min());
            assert_eq!(a.max(), b.max());
        }
        assert_eq!(dynamics.drop_intensity(), 0.0);
    }
}
