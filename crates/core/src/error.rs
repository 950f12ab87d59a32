// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the loudness core.
//!
//! Errors on the audio hot path are impossible by construction (no
//! allocation, no I/O, no fallible calls): every variant here originates on
//! the control thread, from a command or a capture-source callback.

use thiserror::Error;

use crate::types::StreamId;

/// Errors surfaced by the loudness core's command surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("stream {0} is already registered")]
    AlreadyRegistered(StreamId),

    #[error("stream {0} is not known")]
    UnknownStream(StreamId),

    #[error("capture failed for stream {stream_id}: {reason}")]
    CaptureFailed { stream_id: StreamId, reason: String },

    #[error("stream {stream_id} ended: {reason}")]
    StreamGone { stream_id: StreamId, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
