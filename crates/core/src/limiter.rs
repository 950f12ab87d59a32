// SPDX-License-Identifier: Apache-2.0

//! Shared output limiter: a soft-knee compressor configured for
//! limiting behavior, sitting on the summed mix. Settings are updated from
//! the control thread and read by whichever thread mixes audio through
//! single-writer atomics -- the hot path never locks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::db_to_linear;

/// Bypass configuration used when `enabled = false`: the node
/// stays in the graph with an identity transfer function instead of being
/// removed, so enable/disable is a pure parameter flip with no topology or
/// latency change (Open Question 3).
pub const BYPASS_THRESHOLD_DB: f64 = 0.0;
pub const BYPASS_KNEE_DB: f64 = 40.0;
pub const BYPASS_RATIO: f64 = 1.0;
pub const BYPASS_ATTACK_MS: f64 = 0.0;
pub const BYPASS_RELEASE_MS: f64 = 250.0;

/// Limiter parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    pub enabled: bool,
    pub threshold_db: f64,
    pub knee_db: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl LimiterSettings {
    /// The defaults used when the Coordinator starts with no persisted
    /// state: limiting enabled at a typical broadcast-safe ceiling.
    pub fn default_enabled() -> Self {
        Self {
            enabled: true,
            threshold_db: -1.0,
            knee_db: 6.0,
            ratio: 20.0,
            attack_ms: 5.0,
            release_ms: 50.0,
        }
    }

    /// Clamp every field into its allowed range. Returns the
    /// clamped settings; callers that need to know whether clamping
    /// occurred should compare against the input.
    pub fn clamped(mut self) -> Self {
        self.threshold_db = self.threshold_db.clamp(-6.0, -0.1);
        self.knee_db = self.knee_db.clamp(0.0, 40.0);
        self.ratio = self.ratio.max(1.0);
        self.attack_ms = self.attack_ms.max(0.0);
        self.release_ms = self.release_ms.max(0.0);
        self
    }

    fn bypass() -> Self {
        Self {
            enabled: false,
            threshold_db: BYPASS_THRESHOLD_DB,
            knee_db: BYPASS_KNEE_DB,
            ratio: BYPASS_RATIO,
            attack_ms: BYPASS_ATTACK_MS,
            release_ms: BYPASS_RELEASE_MS,
        }
    }

    /// The settings actually in effect for sample processing: the bypass
    /// identity configuration when disabled, the (clamped) settings
    /// otherwise.
    fn effective(self) -> Self {
        if self.enabled {
            self.clamped()
        } else {
            Self::bypass()
        }
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::default_enabled()
    }
}

/// Lock-free holder for the settings actually driving the hot path. Each
/// field is an independent atomic; `update` is called from the control
/// thread, `effective` from the audio thread.
struct AtomicLimiterParams {
    enabled: AtomicBool,
    threshold_db: AtomicU64,
    knee_db: AtomicU64,
    ratio: AtomicU64,
    attack_ms: AtomicU64,
    release_ms: AtomicU64,
}

impl AtomicLimiterParams {
    fn new(settings: LimiterSettings) -> Self {
        let s = settings;
        Self {
            enabled: AtomicBool::new(s.enabled),
            threshold_db: AtomicU64::new(s.threshold_db.to_bits()),
            knee_db: AtomicU64::new(s.knee_db.to_bits()),
            ratio: AtomicU64::new(s.ratio.to_bits()),
            attack_ms: AtomicU64::new(s.attack_ms.to_bits()),
            release_ms: AtomicU64::new(s.release_ms.to_bits()),
        }
    }

    fn store(&self, settings: LimiterSettings) {
        self.enabled.store(settings.enabled, Ordering::Relaxed);
        self.threshold_db
            .store(settings.threshold_db.to_bits(), Ordering::Relaxed);
        self.knee_db.store(settings.knee_db.to_bits(), Ordering::Relaxed);
        self.ratio.store(settings.ratio.to_bits(), Ordering::Relaxed);
        self.attack_ms.store(settings.attack_ms.to_bits(), Ordering::Relaxed);
        self.release_ms
            .store(settings.release_ms.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> LimiterSettings {
        LimiterSettings {
            enabled: self.enabled.load(Ordering::Relaxed),
            threshold_db: f64::from_bits(self.threshold_db.load(Ordering::Relaxed)),
            knee_db: f64::from_bits(self.knee_db.load(Ordering::Relaxed)),
            ratio: f64::from_bits(self.ratio.load(Ordering::Relaxed)),
            attack_ms: f64::from_bits(self.attack_ms.load(Ordering::Relaxed)),
            release_ms: f64::from_bits(self.release_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Shared dynamics processor on the summed output.
///
/// `Limiter` is `Clone`-able as a cheap handle: the parameter storage is
/// behind an `Arc`, so every clone observes the same settings, while each
/// clone keeps its own envelope/gain-reduction state. In practice a single
/// `Limiter` instance runs on the one real-time output thread and the
/// Coordinator holds a second handle purely to call [`Limiter::set_settings`].
#[derive(Clone)]
pub struct Limiter {
    params: Arc<AtomicLimiterParams>,
    sample_rate: u32,
    envelope_db: f64,
}

impl Limiter {
    pub fn new(sample_rate: u32, settings: LimiterSettings) -> Self {
        Self {
            params: Arc::new(AtomicLimiterParams::new(settings.clamped())),
            sample_rate,
            envelope_db: 0.0,
        }
    }

    /// Update settings from the control thread. Applied at the next
    /// sample boundary the audio thread observes.
    pub fn set_settings(&self, settings: LimiterSettings) -> LimiterSettings {
        let clamped = settings.clamped();
        self.params.store(clamped);
        clamped
    }

    pub fn settings(&self) -> LimiterSettings {
        self.params.load()
    }

    /// Process one multi-channel frame in place. Uses peak level across
    /// channels to compute a single shared gain reduction, applied
    /// uniformly to every channel (stereo-linked limiting).
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f64]) {
        let settings = self.params.load().effective();

        let peak = frame.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
        let peak_db = if peak > 0.0 {
            20.0 * peak.log10()
        } else {
            -f64::INFINITY
        };

        let target_db = soft_knee_output_db(peak_db, settings.threshold_db, settings.knee_db, settings.ratio);
        let gain_reduction_db = (target_db - peak_db).min(0.0);

        let time_constant_ms = if gain_reduction_db < self.envelope_db {
            settings.attack_ms
        } else {
            settings.release_ms
        };
        let coeff = time_constant(time_constant_ms, self.sample_rate);
        self.envelope_db += (gain_reduction_db - self.envelope_db) * coeff;

        let gain_linear = db_to_linear(self.envelope_db.min(0.0));
        for sample in frame.iter_mut() {
            *sample *= gain_linear;
        }
    }

    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}

/// Soft-knee compressor transfer function: maps an input level in dB to an
/// output level in dB, given threshold/knee/ratio. Standard textbook
/// quadratic-knee formulation.
fn soft_knee_output_db(input_db: f64, threshold_db: f64, knee_db: f64, ratio: f64) -> f64 {
    if !input_db.is_finite() {
        return input_db;
    }
    let half_knee = knee_db / 2.0;
    let below_knee = input_db - threshold_db;

    if below_knee <= -half_knee {
        input_db
    } else if below_knee >= half_knee {
        threshold_db + (input_db - threshold_db) / ratio
    } else {
        let knee_factor = (below_knee + half_knee).powi(2) / (2.0 * knee_db.max(1e-9));
        input_db + (1.0 / ratio - 1.0) * knee_factor
    }
}

/// One-pole envelope coefficient for a given attack/release time in ms.
fn time_constant(time_ms: f64, sample_rate: u32) -> f64 {
    if time_ms <= 0.0 {
        return 1.0;
    }
    let samples = (time_ms / 1000.0) * sample_rate as f64;
    1.0 - (-1.0 / samples.max(1.0)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_settings_are_identity() {
        let settings = LimiterSettings {
            enabled: false,
            ..LimiterSettings::default_enabled()
        };
        let effective = settings.effective();
        assert_eq!(effective.threshold_db, BYPASS_THRESHOLD_DB);
        assert_eq!(effective.knee_db, BYPASS_KNEE_DB);
        assert_eq!(effective.ratio, BYPASS_RATIO);
    }

    #[test]
    fn first_frame_below_threshold_is_unattenuated() {
        // A freshly constructed limiter must not fade signal in from
        // silence: with no prior history, a below-threshold frame should
        // pass through at (near enough) unity gain on the very first call.
        let mut limiter = Limiter::new(48_000, LimiterSettings::default_enabled());
        let mut frame = [0.1, 0.1];
        limiter.process_frame(&mut frame);
        assert!((frame[0] - 0.1).abs() < 1e-6, "unexpected attenuation: {frame:?}");
    }

    #[test]
    fn disabled_limiter_passes_signal_unchanged_at_steady_state() {
        let mut limiter = Limiter::new(
            48_000,
            LimiterSettings {
                enabled: false,
                ..LimiterSettings::default_enabled()
            },
        );
        let mut frame = [0.9, 0.9];
        for _ in 0..10_000 {
            limiter.process_frame(&mut frame);
            frame = [0.9, 0.9];
        }
        assert!((frame[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn enabled_limiter_reduces_peaks_above_threshold() {
        let mut limiter = Limiter::new(
            48_000,
            LimiterSettings {
                enabled: true,
                threshold_db: -3.0,
                knee_db: 1.0,
                ratio: 20.0,
                attack_ms: 1.0,
                release_ms: 50.0,
            },
        );
        let mut last = [0.0, 0.0];
        for _ in 0..48_000 {
            let mut frame = [0.99, 0.99];
            limiter.process_frame(&mut frame);
            last = frame;
        }
        let peak_db = 20.0 * last[0].abs().log10();
        assert!(peak_db < -2.0, "steady-state peak {peak_db} dB not limited");
    }

    #[test]
    fn settings_update_is_observed_by_subsequent_frames() {
        let limiter = Limiter::new(48_000, LimiterSettings::default_enabled());
        let mut follower = limiter.clone();
        limiter.set_settings(LimiterSettings {
            threshold_db: -6.0,
            ..LimiterSettings::default_enabled()
        });
        assert_eq!(follower.settings().threshold_db, -6.0);
        let mut frame = [0.1, 0.1];
        follower.process_frame(&mut frame);
    }
}
