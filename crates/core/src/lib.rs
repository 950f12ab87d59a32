// SPDX-License-Identifier: Apache-2.0

//! Real-time ITU-R BS.1770-4 loudness measurement and multi-stream gain
//! balancing core.
//!
//! This crate implements the DSP and bookkeeping for the "real-time
//! loudness-measurement and balancing core": per-stream K-weighting and
//! block loudness metering, a shared output limiter, and the
//! stream-processor state machine that ties a capture source to both. It
//! does not own a Coordinator, a command/event transport, or persistence
//! -- those live in `loudness-daemon`, which depends on this crate.

pub mod block_engine;
pub mod error;
pub mod event;
pub mod kweight;
pub mod limiter;
pub mod slot;
pub mod stream;
pub mod types;

pub use block_engine::BlockLoudnessEngine;
pub use error::{CoreError, CoreResult};
pub use event::Event;
pub use kweight::KWeightedFilter;
pub use limiter::{Limiter, LimiterSettings};
pub use stream::{
    CaptureErrorKind, CaptureInfo, CaptureSource, StreamProcessor, StreamStatus, MAX_MAX_GAIN_DB,
    MIN_GAIN_DB, MIN_MAX_GAIN_DB,
};
pub use types::{
    db_to_linear, linear_to_db, AutoBalanceSettings, LoudnessReading, StreamId,
    ABSOLUTE_GATE_LUFS, MAX_TARGET_LUFS, MIN_BLOCKS_FOR_RELIABLE_LUFS, MIN_TARGET_LUFS,
    RELATIVE_GATE_OFFSET_LU,
};
