// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget events emitted by the core. The transport
//! that carries these to an observer is host-defined; the daemon crate
//! broadcasts them as Server-Sent-Events.

use serde::{Deserialize, Serialize};

use crate::limiter::LimiterSettings;
use crate::stream::CaptureErrorKind;
use crate::types::StreamId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    LoudnessUpdate {
        stream_id: StreamId,
        momentary: f64,
        short_term: f64,
        integrated: f64,
        block_count: u32,
    },
    CaptureStarted {
        stream_id: StreamId,
        sample_rate: u32,
    },
    CaptureStopped {
        stream_id: StreamId,
    },
    CaptureError {
        stream_id: StreamId,
        kind: CaptureErrorKind,
    },
    StreamEnded {
        stream_id: StreamId,
        reason: String,
    },
    GainUpdated {
        stream_id: StreamId,
        gain_db: f64,
    },
    LimiterUpdated {
        limiter: LimiterSettings,
    },
    MeasurementsReset {
        stream_id: StreamId,
    },
}
