// SPDX-License-Identifier: Apache-2.0

//! Stream Processor: wraps one capture source with a complete
//! per-stream DSP chain (K-weighting + block engine) plus gain control.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::block_engine::BlockLoudnessEngine;
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::slot::{AtomicDb, ReadingSlot};
use crate::types::{clamp_reporting, LoudnessReading, StreamId};

/// Reason a capture source failed to open, or an already-running capture
/// self-terminated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaptureErrorKind {
    Timeout,
    DeviceUnavailable,
    Backend(String),
}

impl fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureErrorKind::Timeout => write!(f, "timed out"),
            CaptureErrorKind::DeviceUnavailable => write!(f, "device unavailable"),
            CaptureErrorKind::Backend(reason) => write!(f, "backend error: {reason}"),
        }
    }
}

/// Sample rate and channel count a capture source reports once opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureInfo {
    pub sample_rate: u32,
    pub channels: u32,
}

/// The host-supplied capture boundary: out of scope for this
/// crate to implement (it is the "host environment" collaborator), but the
/// core defines the trait it drives. Modeled on the capture-stream
/// abstraction used throughout this codebase's device-facing modules.
pub trait CaptureSource: Send {
    /// Acquire whatever resources are needed and report the format the
    /// host will deliver frames in.
    fn open(&mut self) -> Result<CaptureInfo, CaptureErrorKind>;

    /// Release resources. Idempotent.
    fn close(&mut self);
}

/// Simplified externally-visible stream status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamStatus {
    Capturing,
    Stopped,
    Error(CaptureErrorKind),
}

/// Internal state machine: `Idle -> Starting -> Capturing <->
/// Error -> Stopping -> Idle`.
#[derive(Clone, Debug, PartialEq)]
enum StreamState {
    Idle,
    Starting,
    Capturing,
    Error(CaptureErrorKind),
    Stopping,
}

impl From<&StreamState> for StreamStatus {
    fn from(state: &StreamState) -> Self {
        match state {
            StreamState::Capturing => StreamStatus::Capturing,
            StreamState::Error(kind) => StreamStatus::Error(kind.clone()),
            StreamState::Idle | StreamState::Starting | StreamState::Stopping => {
                StreamStatus::Stopped
            }
        }
    }
}

/// Allowed gain range.
pub const MIN_GAIN_DB: f64 = -60.0;
pub const MIN_MAX_GAIN_DB: f64 = -20.0;
pub const MAX_MAX_GAIN_DB: f64 = 20.0;

/// Gain applied to the playback branch while a stream is muted by another
/// stream's solo: deeper than `MIN_GAIN_DB` because it is a
/// temporary override, not a value the normal gain clamp ever produces.
pub const SOLO_MUTE_GAIN_DB: f64 = -100.0;

/// One registered audio source: capture handle, K-weighted filter pair +
/// block loudness engine, pre-fader gain stage, and state machine.
pub struct StreamProcessor {
    id: StreamId,
    label: String,
    state: StreamState,
    max_gain_db: f64,
    gain_db: AtomicDb,
    solo: bool,
    muted_by_solo: AtomicBool,
    sample_rate: u32,
    mono_source: bool,
    engine: BlockLoudnessEngine,
    reading_slot: ReadingSlot,
}

impl StreamProcessor {
    pub fn new(id: StreamId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            state: StreamState::Idle,
            max_gain_db: 0.0,
            gain_db: AtomicDb::new(0.0),
            solo: false,
            muted_by_solo: AtomicBool::new(false),
            sample_rate: 48_000,
            mono_source: false,
            engine: BlockLoudnessEngine::new(48_000),
            reading_slot: ReadingSlot::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus::from(&self.state)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, StreamState::Capturing)
    }

    pub fn solo(&self) -> bool {
        self.solo
    }

    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    /// Whether this stream is currently forced silent by another stream's
    /// solo. The stored `gain_db` field is untouched; this is a separate
    /// override consulted only by [`Self::apply_gain`].
    pub fn muted_by_solo(&self) -> bool {
        self.muted_by_solo.load(Ordering::Relaxed)
    }

    pub fn set_muted_by_solo(&self, muted: bool) {
        self.muted_by_solo.store(muted, Ordering::Relaxed);
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db.load()
    }

    pub fn max_gain_db(&self) -> f64 {
        self.max_gain_db
    }

    pub fn block_count(&self) -> u32 {
        self.engine.block_count()
    }

    /// Begin capture. Sample rate is taken from the source; channel count
    /// is normalized to stereo (mono duplicated upstream in [`push_frame`]).
    pub fn start(&mut self, source: &mut dyn CaptureSource) -> CoreResult<Event> {
        if !matches!(self.state, StreamState::Idle | StreamState::Error(_)) {
            return Err(CoreError::Internal(format!(
                "stream {} start() called while not idle",
                self.id
            )));
        }

        self.state = StreamState::Starting;
        match source.open() {
            Ok(info) => {
                self.sample_rate = info.sample_rate;
                self.mono_source = info.channels == 1;
                self.engine = BlockLoudnessEngine::new(info.sample_rate);
                self.reading_slot = ReadingSlot::new();
                self.state = StreamState::Capturing;
                tracing::info!(stream_id = %self.id, sample_rate = info.sample_rate, "capture started");
                Ok(Event::CaptureStarted {
                    stream_id: self.id,
                    sample_rate: info.sample_rate,
                })
            }
            Err(kind) => {
                self.state = StreamState::Error(kind.clone());
                tracing::warn!(stream_id = %self.id, %kind, "capture failed");
                Err(CoreError::CaptureFailed {
                    stream_id: self.id,
                    reason: kind.to_string(),
                })
            }
        }
    }

    /// Tear down capture. Idempotent.
    pub fn stop(&mut self, source: &mut dyn CaptureSource) -> Event {
        source.close();
        self.state = StreamState::Idle;
        tracing::info!(stream_id = %self.id, "capture stopped");
        Event::CaptureStopped { stream_id: self.id }
    }

    /// Host-signaled termination of the underlying source (track ended,
    /// device unplugged, host shutdown): self-cleans to `Idle`.
    pub fn mark_stream_ended(&mut self, reason: impl Into<String>) -> Event {
        self.state = StreamState::Idle;
        let reason = reason.into();
        tracing::info!(stream_id = %self.id, reason = %reason, "stream ended");
        Event::StreamEnded {
            stream_id: self.id,
            reason,
        }
    }

    /// Push one frame of raw (pre-gain, pre-filter) samples from the
    /// capture source. `frame` is one sample per input channel (1 or 2).
    /// Returns a `LoudnessUpdate` event at the ~10 Hz publish cadence.
    ///
    /// This is the audio-thread hot path: no allocation, no locking, no
    /// logging below this call.
    #[inline]
    pub fn push_frame(&mut self, frame: &[f64]) -> Option<Event> {
        if !matches!(self.state, StreamState::Capturing) {
            return None;
        }
        let stereo = if self.mono_source || frame.len() == 1 {
            [frame[0], frame[0]]
        } else {
            [frame[0], frame[1]]
        };

        let reading = self.engine.push_frame(stereo)?;
        self.reading_slot.publish(reading);
        Some(Event::LoudnessUpdate {
            stream_id: self.id,
            momentary: reading.momentary,
            short_term: reading.short_term,
            integrated: reading.integrated,
            block_count: reading.block_count,
        })
    }

    /// Apply the stream's current gain to a playback-branch frame. This is
    /// the *other* branch fed by the same capture source: it
    /// never touches the analysis engine above, so gain changes cannot
    /// affect measured loudness.
    pub fn apply_gain(&self, frame: &mut [f64]) {
        let gain_db = if self.muted_by_solo.load(Ordering::Relaxed) {
            SOLO_MUTE_GAIN_DB
        } else {
            self.gain_db.load()
        };
        let gain = crate::types::db_to_linear(gain_db);
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
    }

    /// Set gain, clamped into `[-60, max_gain_db]`. Always returns an
    /// event carrying the applied (possibly clamped) value.
    pub fn set_gain(&mut self, requested_db: f64) -> (f64, Event) {
        let (applied, _clamped) = clamp_reporting(requested_db, MIN_GAIN_DB, self.max_gain_db);
        self.gain_db.store(applied);
        (
            applied,
            Event::GainUpdated {
                stream_id: self.id,
                gain_db: applied,
            },
        )
    }

    /// Set the per-stream maximum-gain ceiling, clamped into `[-20, +20]`.
    /// If the current gain now exceeds the new ceiling, it is reclamped
    /// too.
    pub fn set_max_gain(&mut self, requested_db: f64) -> (f64, f64) {
        let (max_applied, _) = clamp_reporting(requested_db, MIN_MAX_GAIN_DB, MAX_MAX_GAIN_DB);
        self.max_gain_db = max_applied;
        let current = self.gain_db.load();
        if current > max_applied {
            self.gain_db.store(max_applied);
        }
        (max_applied, self.gain_db.load())
    }

    pub fn reset_measurements(&mut self) -> Event {
        self.engine.reset();
        self.reading_slot = ReadingSlot::new();
        tracing::debug!(stream_id = %self.id, "measurements reset");
        Event::MeasurementsReset { stream_id: self.id }
    }

    pub fn latest_reading(&self) -> LoudnessReading {
        self.reading_slot.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSource {
        sample_rate: u32,
        channels: u32,
        fail: Option<CaptureErrorKind>,
        opened: bool,
    }

    impl CaptureSource for MockSource {
        fn open(&mut self) -> Result<CaptureInfo, CaptureErrorKind> {
            if let Some(kind) = self.fail.clone() {
                return Err(kind);
            }
            self.opened = true;
            Ok(CaptureInfo {
                sample_rate: self.sample_rate,
                channels: self.channels,
            })
        }

        fn close(&mut self) {
            self.opened = false;
        }
    }

    fn stereo_source() -> MockSource {
        MockSource {
            sample_rate: 48_000,
            channels: 2,
            fail: None,
            opened: false,
        }
    }

    #[test]
    fn start_transitions_to_capturing_and_emits_event() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        let mut source = stereo_source();
        let event = stream.start(&mut source).unwrap();
        assert!(stream.is_capturing());
        matches!(event, Event::CaptureStarted { .. });
    }

    #[test]
    fn failed_start_never_reaches_capturing() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        let mut source = MockSource {
            sample_rate: 48_000,
            channels: 2,
            fail: Some(CaptureErrorKind::Timeout),
            opened: false,
        };
        let err = stream.start(&mut source).unwrap_err();
        assert!(!stream.is_capturing());
        assert!(matches!(err, CoreError::CaptureFailed { .. }));
        assert!(matches!(stream.status(), StreamStatus::Error(_)));
    }

    #[test]
    fn gain_is_clamped_to_max_gain_ceiling() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        let (applied, _) = stream.set_gain(100.0);
        assert_eq!(applied, 0.0, "default max_gain_db is 0");

        stream.set_max_gain(20.0);
        let (applied, _) = stream.set_gain(100.0);
        assert_eq!(applied, 20.0);

        let (applied, _) = stream.set_gain(-1000.0);
        assert_eq!(applied, MIN_GAIN_DB);
    }

    #[test]
    fn lowering_max_gain_reclamps_current_gain() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        stream.set_max_gain(20.0);
        stream.set_gain(15.0);
        assert_eq!(stream.gain_db(), 15.0);

        stream.set_max_gain(10.0);
        assert_eq!(stream.gain_db(), 10.0);
    }

    #[test]
    fn reset_measurements_clears_reading_and_block_count() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        let mut source = stereo_source();
        stream.start(&mut source).unwrap();
        for _ in 0..96_000 {
            stream.push_frame(&[0.1, 0.1]);
        }
        assert!(stream.block_count() > 0);

        stream.reset_measurements();
        assert_eq!(stream.block_count(), 0);
        assert_eq!(stream.latest_reading(), LoudnessReading::SILENT);
    }

    #[test]
    fn gain_does_not_affect_measured_loudness() {
        let mut stream = StreamProcessor::new(StreamId::new(), "test");
        let mut source = stereo_source();
        stream.start(&mut source).unwrap();
        stream.set_max_gain(20.0);
        stream.set_gain(12.0);

        for i in 0..96_000 {
            let t = i as f64 / 48_000.0;
            let s = (2.0 * std::f64::consts::PI * 1000.0 * t).sin() * 0.1;
            stream.push_frame(&[s, s]);
        }
        let with_gain = stream.latest_reading().integrated;

        let mut stream2 = StreamProcessor::new(StreamId::new(), "test2");
        let mut source2 = stereo_source();
        stream2.start(&mut source2).unwrap();
        for i in 0..96_000 {
            let t = i as f64 / 48_000.0;
            let s = (2.0 * std::f64::consts::PI * 1000.0 * t).sin() * 0.1;
            stream2.push_frame(&[s, s]);
        }
        let without_gain = stream2.latest_reading().integrated;

        assert!((with_gain - without_gain).abs() < 1e-9);
    }

    #[test]
    fn mono_source_is_duplicated_to_stereo() {
        let mut stream = StreamProcessor::new(StreamId::new(), "mono");
        let mut source = MockSource {
            sample_rate: 48_000,
            channels: 1,
            fail: None,
            opened: false,
        };
        stream.start(&mut source).unwrap();
        for _ in 0..48_000 {
            stream.push_frame(&[0.2]);
        }
        assert!(stream.block_count() > 0);
    }

    #[test]
    fn apply_gain_scales_the_playback_frame() {
        let mut stream = StreamProcessor::new(StreamId::new(), "gain-apply");
        stream.set_max_gain(20.0);
        stream.set_gain(20.0);

        let mut frame = [0.1, 0.2];
        stream.apply_gain(&mut frame);
        let expected = 10f64.powf(20.0 / 20.0);
        assert!((frame[0] - 0.1 * expected).abs() < 1e-9);
        assert!((frame[1] - 0.2 * expected).abs() < 1e-9);
    }

    #[test]
    fn apply_gain_mutes_when_muted_by_solo_without_touching_stored_gain() {
        let mut stream = StreamProcessor::new(StreamId::new(), "gain-solo");
        stream.set_max_gain(20.0);
        stream.set_gain(6.0);
        stream.set_muted_by_solo(true);

        let mut frame = [0.5, 0.5];
        stream.apply_gain(&mut frame);
        assert!(frame[0].abs() < 1e-4, "expected near-silence, got {frame:?}");
        assert_eq!(stream.gain_db(), 6.0, "stored gain must survive solo mute");
    }
}
