// SPDX-License-Identifier: Apache-2.0

//! Coordinator: owns the set of Stream Processors, the shared
//! Limiter, solo state, and auto-balance settings, and runs the balancing
//! control loop. A plain struct behind a `tokio::sync::RwLock`, with
//! background duties spawned by the binary rather than owned by the struct
//! itself.

use std::collections::HashMap;

use loudness_core::{
    AutoBalanceSettings, CaptureSource, CoreError, CoreResult, Event, Limiter, LimiterSettings,
    LoudnessReading, StreamId, StreamProcessor, StreamStatus, MAX_TARGET_LUFS,
    MIN_BLOCKS_FOR_RELIABLE_LUFS, MIN_TARGET_LUFS,
};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::persistence::{self, PersistedState};

/// Snapshot of one stream returned by `GetStreams`.
#[derive(Clone, Debug, Serialize)]
pub struct StreamSnapshot {
    pub id: StreamId,
    pub label: String,
    pub status: StreamStatus,
    pub gain_db: f64,
    pub max_gain_db: f64,
    pub solo: bool,
    pub reading: LoudnessReading,
}

/// A registered stream plus the capture source keeping it alive, so `stop`
/// can close it.
struct ManagedStream {
    processor: StreamProcessor,
    source: Box<dyn CaptureSource>,
}

pub struct Coordinator {
    streams: HashMap<StreamId, ManagedStream>,
    auto_balance: AutoBalanceSettings,
    limiter: Limiter,
    solo_stream: Option<StreamId>,
    events: broadcast::Sender<Event>,
}

impl Coordinator {
    pub fn new(events: broadcast::Sender<Event>, persisted: PersistedState) -> Self {
        Self {
            streams: HashMap::new(),
            auto_balance: persisted.auto_balance,
            limiter: Limiter::new(48_000, persisted.limiter),
            solo_stream: None,
            events,
        }
    }

    fn publish(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn persist(&self) {
        let state = PersistedState {
            auto_balance: self.auto_balance,
            limiter: self.limiter.settings(),
        };
        if let Err(err) = persistence::save(&state) {
            tracing::warn!(error = %err, "failed to persist settings");
        }
    }

    /// Apply a stream's current gain (or its solo mute override) to a
    /// playback-branch frame in place. This is the analysis-independent
    /// branch of the Stream Processor (spec.md §4.3): the caller is
    /// expected to sum the result with every other capturing stream's
    /// contribution and run it through [`Coordinator::process_output_frame`].
    pub fn apply_gain(&self, id: StreamId, frame: &mut [f64]) -> CoreResult<()> {
        let managed = self.streams.get(&id).ok_or(CoreError::UnknownStream(id))?;
        managed.processor.apply_gain(frame);
        Ok(())
    }

    /// Run one summed-output frame through the shared Limiter. The caller
    /// (the daemon's playback mix tick) discards the processed samples --
    /// there is no real output device in this reference daemon -- but the
    /// call still exercises the actual dynamics-processing code path the
    /// Limiter settings configure.
    pub fn process_output_frame(&mut self, frame: &mut [f64]) {
        self.limiter.process_frame(frame);
    }

    /// `RegisterStream`: registers and immediately starts capture through
    /// the given source. Two registrations of the same id: the second
    /// fails with `AlreadyRegistered`.
    pub fn register_stream(
        &mut self,
        id: StreamId,
        label: impl Into<String>,
        mut source: Box<dyn CaptureSource>,
    ) -> CoreResult<()> {
        if self.streams.contains_key(&id) {
            return Err(CoreError::AlreadyRegistered(id));
        }

        let mut processor = StreamProcessor::new(id, label);
        match processor.start(source.as_mut()) {
            Ok(event) => {
                self.publish(event);
                self.streams.insert(id, ManagedStream { processor, source });
                Ok(())
            }
            Err(err) => {
                if let CoreError::CaptureFailed { stream_id, reason } = &err {
                    self.publish(Event::CaptureError {
                        stream_id: *stream_id,
                        kind: loudness_core::CaptureErrorKind::Backend(reason.clone()),
                    });
                }
                Err(err)
            }
        }
    }

    /// `UnregisterStream`.
    pub fn unregister_stream(&mut self, id: StreamId) -> CoreResult<()> {
        let mut managed = self.streams.remove(&id).ok_or(CoreError::UnknownStream(id))?;
        let event = managed.processor.stop(managed.source.as_mut());
        self.publish(event);
        if self.solo_stream == Some(id) {
            self.solo_stream = None;
            self.unmute_all();
        }
        Ok(())
    }

    /// Feed one frame of raw samples to a capturing stream's analysis
    /// engine. Returns the stream's share of the event stream; callers
    /// driving a synthetic or real source call this per frame.
    pub fn push_frame(&mut self, id: StreamId, frame: &[f64]) -> CoreResult<()> {
        let managed = self.streams.get_mut(&id).ok_or(CoreError::UnknownStream(id))?;
        if let Some(event) = managed.processor.push_frame(frame) {
            self.publish(event);
        }
        Ok(())
    }

    /// `SetGain`.
    pub fn set_gain(&mut self, id: StreamId, gain_db: f64) -> CoreResult<f64> {
        let managed = self.streams.get_mut(&id).ok_or(CoreError::UnknownStream(id))?;
        let (applied, event) = managed.processor.set_gain(gain_db);
        self.publish(event);
        Ok(applied)
    }

    /// `SetMaxGain`.
    pub fn set_max_gain(&mut self, id: StreamId, max_gain_db: f64) -> CoreResult<(f64, f64)> {
        let managed = self.streams.get_mut(&id).ok_or(CoreError::UnknownStream(id))?;
        let (applied_max, applied_gain) = managed.processor.set_max_gain(max_gain_db);
        self.publish(Event::GainUpdated {
            stream_id: id,
            gain_db: applied_gain,
        });
        Ok((applied_max, applied_gain))
    }

    /// `ResetMeasurements`.
    pub fn reset_measurements(&mut self, id: StreamId) -> CoreResult<()> {
        let managed = self.streams.get_mut(&id).ok_or(CoreError::UnknownStream(id))?;
        let event = managed.processor.reset_measurements();
        self.publish(event);
        Ok(())
    }

    /// `GetStreams`.
    pub fn snapshots(&self) -> (Vec<StreamSnapshot>, Option<StreamId>) {
        let snapshots = self
            .streams
            .values()
            .map(|managed| StreamSnapshot {
                id: managed.processor.id(),
                label: managed.processor.label().to_string(),
                status: managed.processor.status(),
                gain_db: managed.processor.gain_db(),
                max_gain_db: managed.processor.max_gain_db(),
                solo: managed.processor.solo(),
                reading: managed.processor.latest_reading(),
            })
            .collect();
        (snapshots, self.solo_stream)
    }

    fn unmute_all(&mut self) {
        for managed in self.streams.values_mut() {
            managed.processor.set_solo(false);
            managed.processor.set_muted_by_solo(false);
        }
    }

    /// `ToggleSolo`: if `id` is already solo, clear it; otherwise solo it
    /// and mute every other stream. Unknown ids are rejected rather than
    /// silently creating solo state for a stream that doesn't exist.
    pub fn toggle_solo(&mut self, id: StreamId) -> CoreResult<Option<StreamId>> {
        if !self.streams.contains_key(&id) {
            return Err(CoreError::UnknownStream(id));
        }

        if self.solo_stream == Some(id) {
            self.solo_stream = None;
            self.unmute_all();
        } else {
            self.solo_stream = Some(id);
            for (stream_id, managed) in self.streams.iter_mut() {
                let is_solo = *stream_id == id;
                managed.processor.set_solo(is_solo);
                managed.processor.set_muted_by_solo(!is_solo);
            }
        }
        Ok(self.solo_stream)
    }

    /// `ClearSolo`.
    pub fn clear_solo(&mut self) -> Option<StreamId> {
        if self.solo_stream.is_some() {
            self.solo_stream = None;
            self.unmute_all();
        }
        self.solo_stream
    }

    /// `SetAutoBalance`: either field may be omitted to leave it unchanged.
    pub fn set_auto_balance(&mut self, enabled: Option<bool>, target_lufs: Option<f64>) -> AutoBalanceSettings {
        if let Some(enabled) = enabled {
            self.auto_balance.enabled = enabled;
        }
        if let Some(target) = target_lufs {
            self.auto_balance.target_lufs = target;
        }
        self.auto_balance = self.auto_balance.clamped();
        self.persist();
        self.auto_balance
    }

    pub fn auto_balance(&self) -> AutoBalanceSettings {
        self.auto_balance
    }

    /// `BalanceNow` / the continuous-balance tick: for every capturing,
    /// non-muted stream with enough history, compute `target - integrated`
    /// clamped into the stream's allowed gain band and apply it.
    pub fn balance_now(&mut self, target_lufs: Option<f64>) {
        let target = target_lufs
            .unwrap_or(self.auto_balance.target_lufs)
            .clamp(MIN_TARGET_LUFS, MAX_TARGET_LUFS);

        for managed in self.streams.values_mut() {
            let processor = &mut managed.processor;
            if !processor.is_capturing() {
                continue;
            }
            if processor.muted_by_solo() {
                continue;
            }
            let reading = processor.latest_reading();
            if reading.block_count < MIN_BLOCKS_FOR_RELIABLE_LUFS || reading.integrated.is_infinite() {
                continue;
            }

            let required = target - reading.integrated;
            let (applied, event) = processor.set_gain(required);
            let _ = applied;
            self.publish(event);
        }
    }

    /// `SetLimiter`: only the fields present in `partial` override the
    /// current settings; everything else is preserved before clamping.
    pub fn set_limiter(&mut self, partial: PartialLimiterSettings) -> LimiterSettings {
        let mut settings = self.limiter.settings();
        if let Some(enabled) = partial.enabled {
            settings.enabled = enabled;
        }
        if let Some(threshold_db) = partial.threshold_db {
            settings.threshold_db = threshold_db;
        }
        if let Some(knee_db) = partial.knee_db {
            settings.knee_db = knee_db;
        }
        if let Some(ratio) = partial.ratio {
            settings.ratio = ratio;
        }
        if let Some(attack_ms) = partial.attack_ms {
            settings.attack_ms = attack_ms;
        }
        if let Some(release_ms) = partial.release_ms {
            settings.release_ms = release_ms;
        }

        let applied = self.limiter.set_settings(settings);
        self.publish(Event::LimiterUpdated { limiter: applied });
        self.persist();
        applied
    }

    /// `GetLimiter`.
    pub fn limiter_settings(&self) -> LimiterSettings {
        self.limiter.settings()
    }

    /// Stale-stream sweep (every 5 s): drop streams the host reports as
    /// gone, publishing `StreamEnded{reason: "stream gone"}`.
    pub fn sweep_stale<F>(&mut self, mut still_exists: F)
    where
        F: FnMut(StreamId) -> bool,
    {
        let stale: Vec<StreamId> = self
            .streams
            .keys()
            .copied()
            .filter(|id| !still_exists(*id))
            .collect();

        for id in stale {
            if let Some(mut managed) = self.streams.remove(&id) {
                managed.source.close();
            }
            if self.solo_stream == Some(id) {
                self.solo_stream = None;
                self.unmute_all();
            }
            self.publish(Event::StreamEnded {
                stream_id: id,
                reason: "stream gone".to_string(),
            });
        }
    }
}

/// `SetLimiter`'s payload: every field optional so a client can update a
/// subset without first reading the current settings.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct PartialLimiterSettings {
    pub enabled: Option<bool>,
    pub threshold_db: Option<f64>,
    pub knee_db: Option<f64>,
    pub ratio: Option<f64>,
    pub attack_ms: Option<f64>,
    pub release_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use loudness_core::{CaptureErrorKind, CaptureInfo};

    struct StubSource {
        fail: bool,
    }

    impl CaptureSource for StubSource {
        fn open(&mut self) -> Result<CaptureInfo, CaptureErrorKind> {
            if self.fail {
                Err(CaptureErrorKind::DeviceUnavailable)
            } else {
                Ok(CaptureInfo {
                    sample_rate: 48_000,
                    channels: 2,
                })
            }
        }

        fn close(&mut self) {}
    }

    fn coordinator() -> Coordinator {
        let (tx, _rx) = broadcast::channel(64);
        Coordinator::new(tx, PersistedState::default())
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut c = coordinator();
        let id = StreamId::new();
        c.register_stream(id, "a", Box::new(StubSource { fail: false })).unwrap();
        let err = c
            .register_stream(id, "a-again", Box::new(StubSource { fail: false }))
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRegistered(_)));
    }

    #[test]
    fn solo_then_solo_again_restores_all_gains() {
        let mut c = coordinator();
        let a = StreamId::new();
        let b = StreamId::new();
        let cc = StreamId::new();
        for (id, gain) in [(a, -3.0), (b, -6.0), (cc, 0.0)] {
            c.register_stream(id, "s", Box::new(StubSource { fail: false })).unwrap();
            c.set_max_gain(id, 20.0).unwrap();
            c.set_gain(id, gain).unwrap();
        }

        c.toggle_solo(b).unwrap();
        assert!(c.streams[&b].processor.muted_by_solo() == false);
        assert!(c.streams[&a].processor.muted_by_solo());
        assert!(c.streams[&cc].processor.muted_by_solo());

        c.toggle_solo(b).unwrap();
        assert!(!c.streams[&a].processor.muted_by_solo());
        assert!(!c.streams[&b].processor.muted_by_solo());
        assert!(!c.streams[&cc].processor.muted_by_solo());

        assert_eq!(c.streams[&a].processor.gain_db(), -3.0);
        assert_eq!(c.streams[&b].processor.gain_db(), -6.0);
        assert_eq!(c.streams[&cc].processor.gain_db(), 0.0);
    }

    fn push_sine(c: &mut Coordinator, id: StreamId, frames: usize, dbfs: f64) {
        let amplitude = 10f64.powf(dbfs / 20.0);
        let processor = &mut c.streams.get_mut(&id).unwrap().processor;
        for i in 0..frames {
            let t = i as f64 / 48_000.0;
            let s = (2.0 * std::f64::consts::PI * 1000.0 * t).sin() * amplitude;
            let _ = processor.push_frame(&[s, s]);
        }
    }

    #[test]
    fn balance_now_clamps_to_max_gain_then_reaches_target_once_raised() {
        let mut c = coordinator();
        let id = StreamId::new();
        c.register_stream(id, "s", Box::new(StubSource { fail: false })).unwrap();
        push_sine(&mut c, id, 48_000 * 5, -30.0);

        // max_gain_db defaults to 0: balance cannot reach -14 from -30.
        c.balance_now(Some(-14.0));
        assert_eq!(c.streams[&id].processor.gain_db(), 0.0);

        c.set_max_gain(id, 20.0).unwrap();
        c.balance_now(Some(-14.0));
        let applied = c.streams[&id].processor.gain_db();
        assert!((applied - 16.0).abs() < 1.0, "expected ~+16 dB, got {applied}");
    }

    #[test]
    fn warm_up_guard_skips_balance_before_minimum_blocks() {
        let mut c = coordinator();
        let id = StreamId::new();
        c.register_stream(id, "s", Box::new(StubSource { fail: false })).unwrap();
        c.set_max_gain(id, 20.0).unwrap();
        c.set_gain(id, 3.0).unwrap();

        // block_size (19_200) + 4 hops (4_800 each) = 5 blocks, below
        // MIN_BLOCKS_FOR_RELIABLE_LUFS.
        push_sine(&mut c, id, 19_200 + 4 * 4_800, -20.0);
        assert_eq!(c.streams[&id].processor.block_count(), 5);

        c.balance_now(Some(-14.0));
        assert_eq!(c.streams[&id].processor.gain_db(), 3.0);
    }

    #[test]
    fn failed_registration_does_not_insert_a_stream() {
        let mut c = coordinator();
        let id = StreamId::new();
        let err = c
            .register_stream(id, "s", Box::new(StubSource { fail: true }))
            .unwrap_err();
        assert!(matches!(err, CoreError::CaptureFailed { .. }));
        assert!(c.snapshots().0.is_empty());
    }

    #[test]
    fn apply_gain_scales_the_playback_branch_not_the_analysis_branch() {
        let mut c = coordinator();
        let id = StreamId::new();
        c.register_stream(id, "s", Box::new(StubSource { fail: false })).unwrap();
        c.set_max_gain(id, 20.0).unwrap();
        c.set_gain(id, 20.0).unwrap();

        let mut frame = [0.1, 0.1];
        c.apply_gain(id, &mut frame).unwrap();
        let expected = 10f64.powf(20.0 / 20.0);
        assert!((frame[0] - 0.1 * expected).abs() < 1e-9);

        // The analysis branch never sees the gain: pushing more of the same
        // signal after a gain change doesn't retroactively change it, and
        // apply_gain itself never touches the block engine.
        assert_eq!(c.streams[&id].processor.block_count(), 0);
    }

    #[test]
    fn apply_gain_on_unknown_stream_is_rejected() {
        let c = coordinator();
        let mut frame = [0.1, 0.1];
        let err = c.apply_gain(StreamId::new(), &mut frame).unwrap_err();
        assert!(matches!(err, CoreError::UnknownStream(_)));
    }

    #[test]
    fn process_output_frame_drives_the_shared_limiter() {
        let mut c = coordinator();
        c.set_limiter(PartialLimiterSettings {
            enabled: Some(true),
            threshold_db: Some(-3.0),
            knee_db: Some(1.0),
            ratio: Some(20.0),
            attack_ms: Some(1.0),
            release_ms: Some(50.0),
        });

        let mut last = [0.0, 0.0];
        for _ in 0..48_000 {
            let mut frame = [0.99, 0.99];
            c.process_output_frame(&mut frame);
            last = frame;
        }
        let peak_db = 20.0 * last[0].abs().log10();
        assert!(peak_db < -2.0, "steady-state peak {peak_db} dB not limited");
    }
}
