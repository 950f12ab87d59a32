// SPDX-License-Identifier: Apache-2.0

//! Capture sources for the reference daemon.
//!
//! The host environment that supplies decoded PCM frames is explicitly out
//! of scope for the core: `loudness_core::CaptureSource` is the
//! trait boundary a real platform backend would implement. This daemon
//! ships only synthetic sources -- silence and a configurable sine tone --
//! so the full register/start/measure/balance pipeline can be exercised
//! end to end over the REST surface without a platform audio dependency.
//! A future host-specific binary substitutes a real backend behind the
//! same trait without touching the Coordinator or the API.

use loudness_core::{CaptureErrorKind, CaptureInfo, CaptureSource};
use serde::{Deserialize, Serialize};

/// What `RegisterStream`'s `source_handle` names in this reference daemon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Silence,
    SineWave { frequency_hz: f64, amplitude: f64 },
    /// Fails to open, for exercising the `CaptureError` path.
    Unavailable,
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::Silence
    }
}

pub struct SyntheticSource {
    spec: SourceSpec,
    sample_rate: u32,
    phase: f64,
}

impl SyntheticSource {
    pub fn new(spec: SourceSpec) -> Self {
        Self {
            spec,
            sample_rate: 48_000,
            phase: 0.0,
        }
    }

    /// Generate `count` stereo frames into `out` (length `count * 2`).
    pub fn fill(&mut self, out: &mut [f64]) {
        match &self.spec {
            SourceSpec::Silence | SourceSpec::Unavailable => out.fill(0.0),
            SourceSpec::SineWave {
                frequency_hz,
                amplitude,
            } => {
                let step = 2.0 * std::f64::consts::PI * frequency_hz / self.sample_rate as f64;
                for frame in out.chunks_mut(2) {
                    let s = self.phase.sin() * amplitude;
                    frame[0] = s;
                    if frame.len() > 1 {
                        frame[1] = s;
                    }
                    self.phase += step;
                    if self.phase > 2.0 * std::f64::consts::PI {
                        self.phase -= 2.0 * std::f64::consts::PI;
                    }
                }
            }
        }
    }
}

impl CaptureSource for SyntheticSource {
    fn open(&mut self) -> Result<CaptureInfo, CaptureErrorKind> {
        if matches!(self.spec, SourceSpec::Unavailable) {
            return Err(CaptureErrorKind::DeviceUnavailable);
        }
        Ok(CaptureInfo {
            sample_rate: self.sample_rate,
            channels: 2,
        })
    }

    fn close(&mut self) {}
}
