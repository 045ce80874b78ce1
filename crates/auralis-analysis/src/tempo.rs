//! Tempo, beat phase and subdivision from the onset detection function.
//!
//! The tracker keeps a ring buffer of ODF values (one per tick) and, once it
//! holds enough history, asks a [`TempoEstimator`] for the dominant period.
//! Two estimators are provided:
//!
//! - [`TempogramEstimator`] (default): Hann-windowed DFT of the recent ODF,
//!   candidate peaks validated against the ODF autocorrelation, with octave
//!   correction at half and double lag
//! - [`AutocorrelationEstimator`]: strict local maxima of the raw
//!   autocorrelation inside the BPM range
//!
//! Per-tick BPM is the median of a short BPM history. Beats are recovered by
//! dynamic programming over the ODF (Ellis 2007) and drive phase, `is_beat`,
//! subdivision and groove.
//!
//! All times are on the tracker's own clock: the n-th ODF value pushed since
//! the last reset sits at `n / tick_rate` seconds.

use crate::config::{TempoConfig, TempoStrategy};
use crate::frame::RhythmicFeatures;
use crate::history::History;
use crate::spectral::parabolic_offset;
use std::f32::consts::PI;

/// Search bounds handed to a [`TempoEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorContext {
    /// ODF samples per second.
    pub tick_rate: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl EstimatorContext {
    /// Shortest lag (in ODF samples) inside the BPM range.
    pub fn min_lag(&self) -> usize {
        ((60.0 * self.tick_rate / self.max_bpm).ceil() as usize).max(1)
    }

    /// Longest lag (in ODF samples) inside the BPM range.
    pub fn max_lag(&self) -> usize {
        (60.0 * self.tick_rate / self.min_bpm).floor() as usize
    }

    pub fn lag_to_bpm(&self, lag: f32) -> f32 {
        60.0 * self.tick_rate / lag
    }

    pub fn bpm_to_lag(&self, bpm: f32) -> f32 {
        60.0 * self.tick_rate / bpm
    }

    fn in_range(&self, bpm: f32) -> bool {
        bpm >= self.min_bpm && bpm <= self.max_bpm
    }
}

/// One ranked tempo hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TempoCandidate {
    pub bpm: f32,
    /// 0..1
    pub confidence: f32,
    /// Normalized autocorrelation at the candidate's lag.
    pub correlation: f32,
}

/// Result of one estimator call.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f32,
    /// Beat period in ODF samples, sub-sample refined.
    pub lag: f32,
    /// Ranked hypotheses (best first); empty for estimators that rank nothing.
    pub candidates: Vec<TempoCandidate>,
}

/// A tempo estimation strategy over an ODF history (oldest first).
pub trait TempoEstimator: Send {
    fn name(&self) -> &'static str;

    /// Estimate the dominant tempo, or `None` when no periodicity is found.
    fn estimate(&mut self, odf: &[f32], ctx: &EstimatorContext) -> Option<TempoEstimate>;
}

/// Raw lagged dot product `Σ x[i]·x[i+l]` for `l` in `0..=max_lag`.
pub fn autocorrelation(signal: &[f32], max_lag: usize, out: &mut Vec<f32>) {
    out.clear();
    if signal.is_empty() {
        return;
    }
    let max_lag = max_lag.min(signal.len() - 1);
    out.extend((0..=max_lag).map(|lag| {
        signal[..signal.len() - lag]
            .iter()
            .zip(&signal[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
    }));
}

/// Plain autocorrelation peak picking.
#[derive(Debug, Default)]
pub struct AutocorrelationEstimator {
    acf: Vec<f32>,
}

impl AutocorrelationEstimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TempoEstimator for AutocorrelationEstimator {
    fn name(&self) -> &'static str {
        "autocorrelation"
    }

    fn estimate(&mut self, odf: &[f32], ctx: &EstimatorContext) -> Option<TempoEstimate> {
        let (min_lag, max_lag) = (ctx.min_lag(), ctx.max_lag());
        if max_lag < min_lag || odf.len() < max_lag + 2 {
            return None;
        }
        autocorrelation(odf, max_lag + 1, &mut self.acf);
        let acf = &self.acf;
        if acf.first().is_none_or(|&energy| energy <= 0.0) {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for lag in min_lag.max(1)..=max_lag {
            let value = acf[lag];
            if value > acf[lag - 1] && value > acf[lag + 1] && best.is_none_or(|(_, b)| value > b)
            {
                best = Some((lag, value));
            }
        }

        let (lag, _) = best?;
        let refined = lag as f32 + parabolic_offset(acf[lag - 1], acf[lag], acf[lag + 1]);
        let bpm = ctx.lag_to_bpm(refined);
        Some(TempoEstimate {
            bpm,
            lag: refined,
            candidates: vec![TempoCandidate {
                bpm,
                confidence: (acf[lag] / acf[0]).clamp(0.0, 1.0),
                correlation: (acf[lag] / acf[0]).clamp(0.0, 1.0),
            }],
        })
    }
}

/// Hann-windowed DFT tempogram with autocorrelation validation.
pub struct TempogramEstimator {
    window: usize,
    size: usize,
    max_candidates: usize,
    octave_ratio: f32,
    segment: Vec<f32>,
    magnitudes: Vec<f32>,
    acf: Vec<f32>,
}

impl TempogramEstimator {
    pub fn new(config: &TempoConfig) -> Self {
        Self {
            window: config.tempogram_window.max(8),
            size: config.tempogram_size.max(config.tempogram_window).max(8),
            max_candidates: config.max_candidates.max(1),
            octave_ratio: config.octave_ratio,
            segment: Vec::new(),
            magnitudes: Vec::new(),
            acf: Vec::new(),
        }
    }

    fn bin_to_bpm(&self, bin: usize, ctx: &EstimatorContext) -> f32 {
        bin as f32 * ctx.tick_rate * 60.0 / self.size as f32
    }

    /// Mean-removed, Hann-windowed copy of the newest `window` ODF values.
    fn prepare_segment(&mut self, odf: &[f32]) {
        let len = odf.len().min(self.window).min(self.size);
        let recent = &odf[odf.len() - len..];
        let mean = recent.iter().sum::<f32>() / len as f32;
        let denom = (len.max(2) - 1) as f32;
        self.segment.clear();
        self.segment.extend(recent.iter().enumerate().map(|(n, &v)| {
            let hann = 0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos();
            (v - mean) * hann
        }));
    }

    /// DFT magnitude by direct summation, only for bins `lo..=hi`.
    fn dft_magnitudes(&mut self, lo: usize, hi: usize) {
        self.magnitudes.clear();
        self.magnitudes.resize(hi + 1, 0.0);
        let size = self.size as f32;
        for bin in lo..=hi {
            let omega = 2.0 * PI * bin as f32 / size;
            let (mut re, mut im) = (0.0f32, 0.0f32);
            for (n, &x) in self.segment.iter().enumerate() {
                let phase = omega * n as f32;
                re += x * phase.cos();
                im -= x * phase.sin();
            }
            self.magnitudes[bin] = (re * re + im * im).sqrt();
        }
    }

    fn normalized_acf(&self, lag: usize) -> f32 {
        match (self.acf.first(), self.acf.get(lag)) {
            (Some(&energy), Some(&value)) if energy > 0.0 => (value / energy).max(0.0),
            _ => 0.0,
        }
    }
}

impl TempoEstimator for TempogramEstimator {
    fn name(&self) -> &'static str {
        "tempogram"
    }

    fn estimate(&mut self, odf: &[f32], ctx: &EstimatorContext) -> Option<TempoEstimate> {
        if odf.len() < 8 {
            return None;
        }

        let per_bin = ctx.tick_rate * 60.0 / self.size as f32;
        let lo = ((ctx.min_bpm / per_bin).floor() as usize).saturating_sub(1).max(1);
        let hi = ((ctx.max_bpm / per_bin).ceil() as usize + 1).min(self.size / 2);
        if hi <= lo + 1 {
            return None;
        }

        self.prepare_segment(odf);
        self.dft_magnitudes(lo, hi);

        let mut peaks: Vec<(usize, f32)> = ((lo + 1)..hi)
            .filter(|&bin| ctx.in_range(self.bin_to_bpm(bin, ctx)))
            .filter_map(|bin| {
                let m = self.magnitudes[bin];
                (m > self.magnitudes[bin - 1] && m >= self.magnitudes[bin + 1]).then_some((bin, m))
            })
            .collect();
        peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
        peaks.truncate(self.max_candidates);
        let strongest = peaks.first().map(|&(_, m)| m)?;
        if strongest <= 0.0 {
            return None;
        }

        autocorrelation(odf, 2 * ctx.max_lag() + 2, &mut self.acf);

        let mut candidates: Vec<(TempoCandidate, usize)> = peaks
            .iter()
            .map(|&(bin, magnitude)| {
                let mut bpm = self.bin_to_bpm(bin, ctx);
                let mut lag = (ctx.bpm_to_lag(bpm).round() as usize).max(1);
                let mut correlation = self.normalized_acf(lag);

                let half = ((lag as f32) * 0.5).round() as usize;
                let double = lag * 2;
                if half >= 1
                    && self.normalized_acf(half) > self.octave_ratio * correlation
                    && ctx.in_range(bpm * 2.0)
                {
                    bpm *= 2.0;
                    lag = half;
                    correlation = self.normalized_acf(half);
                } else if self.normalized_acf(double) > self.octave_ratio * correlation
                    && ctx.in_range(bpm * 0.5)
                {
                    bpm *= 0.5;
                    lag = double;
                    correlation = self.normalized_acf(double);
                }

                let candidate = TempoCandidate {
                    bpm,
                    confidence: (magnitude / strongest * correlation).clamp(0.0, 1.0),
                    correlation: correlation.min(1.0),
                };
                (candidate, lag)
            })
            .collect();
        candidates.sort_by(|a, b| b.0.confidence.total_cmp(&a.0.confidence));

        let &(best, lag) = candidates.first()?;
        if best.confidence <= 0.0 {
            return None;
        }

        // Refine to the local autocorrelation maximum around the winning lag
        let last = self.acf.len().saturating_sub(2);
        let search_lo = lag.saturating_sub(2).max(1);
        let search_hi = (lag + 2).min(last);
        let peak_lag = (search_lo..=search_hi)
            .max_by(|&a, &b| self.acf[a].total_cmp(&self.acf[b]))
            .unwrap_or(lag);
        let refined = if peak_lag >= 1 && peak_lag + 1 < self.acf.len() {
            peak_lag as f32
                + parabolic_offset(
                    self.acf[peak_lag - 1],
                    self.acf[peak_lag],
                    self.acf[peak_lag + 1],
                )
        } else {
            lag as f32
        };
        let bpm = ctx
            .lag_to_bpm(refined)
            .clamp(ctx.min_bpm, ctx.max_bpm);

        Some(TempoEstimate {
            bpm,
            lag: ctx.bpm_to_lag(bpm),
            candidates: candidates.into_iter().map(|(c, _)| c).collect(),
        })
    }
}

/// Everything the tracker knows about the rhythm at the current tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TempoReport {
    /// Median BPM, 0 while unknown.
    pub bpm: f32,
    /// 0..100
    pub confidence: f32,
    pub beat_phase: f32,
    pub is_beat: bool,
    pub subdivision: u32,
    /// 0..100
    pub groove: f32,
    /// Candidates from the latest estimate, best first.
    pub candidates: Vec<TempoCandidate>,
    /// Tracked beats in seconds on the tracker clock, oldest first.
    pub beat_times: Vec<f64>,
}

impl Default for TempoReport {
    fn default() -> Self {
        Self {
            bpm: 0.0,
            confidence: 0.0,
            beat_phase: 0.0,
            is_beat: false,
            subdivision: 1,
            groove: 0.0,
            candidates: Vec::new(),
            beat_times: Vec::new(),
        }
    }
}

impl TempoReport {
    pub fn rhythmic(&self) -> RhythmicFeatures {
        RhythmicFeatures {
            bpm: self.bpm,
            bpm_confidence: self.confidence,
            beat_phase: self.beat_phase,
            is_beat: self.is_beat,
            subdivision: self.subdivision,
            groove: self.groove,
        }
    }
}

/// Tempo and beat tracker over the per-tick ODF.
pub struct TempoTracker {
    config: TempoConfig,
    tick_rate: f32,
    estimator: Box<dyn TempoEstimator>,
    fallback: Option<AutocorrelationEstimator>,
    odf: History<f32>,
    bpms: History<f32>,
    confidences: History<f32>,
    /// ODF values pushed since the last reset.
    total: u64,
    scratch: Vec<f32>,
    acf: Vec<f32>,
    report: TempoReport,
}

impl TempoTracker {
    pub fn new(config: TempoConfig, tick_rate: f32) -> Self {
        let (estimator, fallback): (Box<dyn TempoEstimator>, _) = match config.strategy {
            TempoStrategy::Tempogram => (
                Box::new(TempogramEstimator::new(&config)),
                Some(AutocorrelationEstimator::new()),
            ),
            TempoStrategy::Autocorrelation => (Box::new(AutocorrelationEstimator::new()), None),
        };
        Self::with_estimator(config, tick_rate, estimator, fallback)
    }

    /// Use a custom primary estimator, optionally cross-checked by autocorrelation.
    pub fn with_estimator(
        config: TempoConfig,
        tick_rate: f32,
        estimator: Box<dyn TempoEstimator>,
        fallback: Option<AutocorrelationEstimator>,
    ) -> Self {
        tracing::debug!(
            estimator = estimator.name(),
            tick_rate,
            odf_capacity = config.odf_capacity,
            "tempo tracker created"
        );
        Self {
            odf: History::new(config.odf_capacity),
            bpms: History::new(config.bpm_history),
            confidences: History::new(config.confidence_history),
            config,
            tick_rate,
            estimator,
            fallback,
            total: 0,
            scratch: Vec::new(),
            acf: Vec::new(),
            report: TempoReport::default(),
        }
    }

    pub fn reset(&mut self) {
        self.odf.clear();
        self.bpms.clear();
        self.confidences.clear();
        self.total = 0;
        self.report = TempoReport::default();
    }

    pub fn report(&self) -> &TempoReport {
        &self.report
    }

    pub fn odf_len(&self) -> usize {
        self.odf.len()
    }

    pub fn context(&self) -> EstimatorContext {
        EstimatorContext {
            tick_rate: self.tick_rate,
            min_bpm: self.config.min_bpm,
            max_bpm: self.config.max_bpm,
        }
    }

    /// Push one ODF value and recompute the rhythm report.
    pub fn update(&mut self, odf: f32) -> &TempoReport {
        self.odf.push(if odf.is_finite() { odf.max(0.0) } else { 0.0 });
        self.total += 1;

        if self.odf.len() < self.config.min_history {
            self.report = TempoReport::default();
            return &self.report;
        }

        self.scratch.clear();
        self.scratch.extend(self.odf.iter().copied());
        let ctx = self.context();

        let mut estimate = self.estimator.estimate(&self.scratch, &ctx);
        if estimate.is_none() {
            if let Some(fallback) = self.fallback.as_mut() {
                estimate = fallback.estimate(&self.scratch, &ctx);
            }
        }

        let mut candidates = Vec::new();
        if let Some(estimate) = estimate {
            self.bpms.push(estimate.bpm);
            let confidence = self.confidence(estimate.lag);
            self.confidences.push(confidence);
            tracing::trace!(bpm = estimate.bpm, confidence, "tempo estimate");
            candidates = estimate.candidates;
        }

        let mut report = TempoReport {
            candidates,
            ..TempoReport::default()
        };
        if self.bpms.len() >= self.config.min_bpm_samples {
            report.bpm = self.bpms.median();
            report.confidence = (self.confidences.median() * 100.0).clamp(0.0, 100.0);
            self.track_rhythm(&mut report);
        }
        self.report = report;
        &self.report
    }

    /// Average of BPM-history stability and autocorrelation peak prominence, 0..1.
    fn confidence(&mut self, lag: f32) -> f32 {
        let mean = self.bpms.mean();
        let stability = if mean > 0.0 {
            (1.0 - self.bpms.std_dev() / (mean * self.config.cv_scale)).max(0.0)
        } else {
            0.0
        };

        let lag = lag.round() as usize;
        autocorrelation(&self.scratch, self.scratch.len() / 2, &mut self.acf);
        let prominence = match self.acf.get(lag) {
            Some(&chosen) if chosen > 0.0 => {
                let start = (lag + self.config.prominence_offset).max(1);
                let rival = (start..self.acf.len().saturating_sub(1))
                    .filter(|&l| self.acf[l] > self.acf[l - 1] && self.acf[l] > self.acf[l + 1])
                    .map(|l| self.acf[l])
                    .fold(0.0f32, f32::max);
                if rival > 0.0 {
                    (chosen / rival).min(1.0)
                } else {
                    1.0
                }
            }
            _ => 0.0,
        };

        0.5 * (stability + prominence)
    }

    /// Beat tracking, phase, subdivision and groove for a known BPM.
    fn track_rhythm(&self, report: &mut TempoReport) {
        let period = 60.0 * self.tick_rate / report.bpm;
        if !period.is_finite() || period < 1.0 {
            return;
        }

        let window = self.scratch.len().min(self.config.beat_window.max(2));
        let recent = &self.scratch[self.scratch.len() - window..];
        let beats = track_beats(recent, period, self.config.tightness);

        let tick_rate = self.tick_rate as f64;
        let first_tick = self.total - window as u64;
        let now = (self.total - 1) as f64 / tick_rate;
        report.beat_times = beats
            .iter()
            .map(|&i| (first_tick + i as u64) as f64 / tick_rate)
            .collect();

        if let Some(&last) = report.beat_times.last() {
            let period_secs = period as f64 / tick_rate;
            let prev = report
                .beat_times
                .iter()
                .rev()
                .find(|&&t| t <= now)
                .copied()
                .unwrap_or(last);
            let next = report
                .beat_times
                .iter()
                .find(|&&t| t > now)
                .copied()
                .unwrap_or(last + period_secs);
            if next > prev {
                report.beat_phase = ((now - prev) / (next - prev)).clamp(0.0, 1.0) as f32;
            }

            let tolerance = self.config.beat_tolerance_secs;
            report.is_beat = report
                .beat_times
                .iter()
                .chain(std::iter::once(&(last + period_secs)))
                .any(|&t| (now - t).abs() <= tolerance);
        }

        let sub_len = self.scratch.len().min(self.config.subdivision_window);
        report.subdivision = subdivision(&self.scratch[self.scratch.len() - sub_len..], period);
        report.groove = groove(recent, &beats);
    }
}

/// Ellis-style dynamic-programming beat tracker. Returns beat indices into `odf`.
pub fn track_beats(odf: &[f32], period: f32, tightness: f32) -> Vec<usize> {
    let len = odf.len();
    let peak = odf.iter().copied().fold(0.0f32, f32::max);
    if len == 0 || peak <= 0.0 || period < 1.0 {
        return Vec::new();
    }

    let mut score = vec![0.0f32; len];
    let mut back: Vec<Option<usize>> = vec![None; len];

    for t in 0..len {
        let latest = t as f32 - 0.5 * period;
        let mut best: Option<(usize, f32)> = None;
        if latest >= 0.0 {
            let earliest = (t as f32 - 2.0 * period).ceil().max(0.0) as usize;
            for s in earliest..=(latest.floor() as usize) {
                let ratio = (t - s) as f32 / period;
                let candidate = score[s] - tightness * ratio.ln().powi(2);
                if best.is_none_or(|(_, b)| candidate > b) {
                    best = Some((s, candidate));
                }
            }
        }
        score[t] = odf[t] / peak + best.map_or(0.0, |(_, b)| b);
        back[t] = best.map(|(s, _)| s);
    }

    let tail = len.saturating_sub((1.5 * period).ceil() as usize);
    let Some(mut t) = (tail..len).max_by(|&a, &b| score[a].total_cmp(&score[b])) else {
        return Vec::new();
    };

    let mut beats = vec![t];
    while let Some(prev) = back[t] {
        beats.push(prev);
        t = prev;
    }
    beats.reverse();
    beats
}

/// 2 or 4 when recent ODF peaks come that many times per beat, else 1.
pub fn subdivision(odf: &[f32], period: f32) -> u32 {
    if odf.len() < 3 {
        return 1;
    }
    let n = odf.len() as f32;
    let mean = odf.iter().sum::<f32>() / n;
    let std = (odf.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n).sqrt();
    let threshold = mean + 0.5 * std;

    let peaks: Vec<usize> = (1..odf.len() - 1)
        .filter(|&i| odf[i] > threshold && odf[i] > odf[i - 1] && odf[i] >= odf[i + 1])
        .collect();
    if peaks.len() < 2 {
        return 1;
    }
    let (first, last) = (peaks[0], peaks[peaks.len() - 1]);
    let interval = (last - first) as f32 / (peaks.len() - 1) as f32;
    if interval <= 0.0 {
        return 1;
    }

    let ratio = period / interval;
    if (ratio - 2.0).abs() < 0.3 {
        2
    } else if (ratio - 4.0).abs() < 0.5 {
        4
    } else {
        1
    }
}

/// Off-beat emphasis, 0..100: mean ODF halfway between tracked beats over
/// mean ODF on them.
pub fn groove(odf: &[f32], beats: &[usize]) -> f32 {
    if beats.len() < 2 {
        return 0.0;
    }
    let on_beat = beats.iter().map(|&b| odf[b]).sum::<f32>() / beats.len() as f32;
    if on_beat <= 0.0 {
        return 0.0;
    }
    let halves: Vec<f32> = beats
        .windows(2)
        .map(|w| odf[((w[0] + w[1]) as f32 * 0.5).round() as usize])
        .collect();
    let off_beat = halves.iter().sum::<f32>() / halves.len() as f32;
    100.0 * (off_beat / on_beat).clamp(0.0, 1.0)
}
