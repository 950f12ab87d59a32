// SPDX-License-Identifier: Apache-2.0

//! Shared data model: stream identity, loudness readings, and the
//! small dB <-> linear conversions used throughout the core.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a registered audio source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A momentary / short-term / integrated loudness snapshot.
///
/// `-inf` represents "below absolute threshold or not yet measurable" for
/// each of the three fields independently.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoudnessReading {
    pub momentary: f64,
    pub short_term: f64,
    pub integrated: f64,
    pub block_count: u32,
}

impl LoudnessReading {
    /// The reading published by a freshly reset or never-started engine.
    pub const SILENT: LoudnessReading = LoudnessReading {
        momentary: f64::NEG_INFINITY,
        short_term: f64::NEG_INFINITY,
        integrated: f64::NEG_INFINITY,
        block_count: 0,
    };
}

impl Default for LoudnessReading {
    fn default() -> Self {
        Self::SILENT
    }
}

/// Minimum number of 400 ms blocks a stream must have produced before its
/// integrated loudness is trusted for balancing decisions.
pub const MIN_BLOCKS_FOR_RELIABLE_LUFS: u32 = 10;

/// Absolute gate threshold, in LUFS.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Relative gate offset, in LU, applied on top of the first-pass mean power.
pub const RELATIVE_GATE_OFFSET_LU: f64 = -10.0;

/// Convert a dB value to a linear amplitude multiplier.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert a linear amplitude multiplier to dB. Non-positive input maps to
/// `-inf`, matching the "silence is -inf dB" convention used for gain and
/// loudness throughout the core.
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Allowed range for `AutoBalanceSettings::target_lufs` and for the
/// per-balance-pass override.
pub const MIN_TARGET_LUFS: f64 = -60.0;
pub const MAX_TARGET_LUFS: f64 = 0.0;

/// Auto-balance configuration owned by the Coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoBalanceSettings {
    pub enabled: bool,
    pub target_lufs: f64,
}

impl AutoBalanceSettings {
    pub fn clamped(mut self) -> Self {
        self.target_lufs = self.target_lufs.clamp(MIN_TARGET_LUFS, MAX_TARGET_LUFS);
        self
    }
}

impl Default for AutoBalanceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_lufs: -18.0,
        }
        .clamped()
    }
}

/// Clamp `value` into `[min, max]`, returning both the clamped value and
/// whether clamping actually changed it. Several gain/limiter commands need
/// to know "did I clamp" to decide whether to surface an event/response
/// distinction.
pub fn clamp_reporting(value: f64, min: f64, max: f64) -> (f64, bool) {
    let clamped = value.clamp(min, max);
    (clamped, clamped != value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_round_trip() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-9);
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-9);
        let db = -18.0;
        assert!((linear_to_db(db_to_linear(db)) - db).abs() < 1e-9);
    }

    #[test]
    fn linear_to_db_of_silence_is_negative_infinity() {
        assert_eq!(linear_to_db(0.0), f64::NEG_INFINITY);
        assert_eq!(linear_to_db(-1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn clamp_reporting_flags_changes() {
        assert_eq!(clamp_reporting(5.0, -20.0, 20.0), (5.0, false));
        assert_eq!(clamp_reporting(100.0, -20.0, 20.0), (20.0, true));
        assert_eq!(clamp_reporting(-100.0, -20.0, 20.0), (-20.0, true));
    }
}
