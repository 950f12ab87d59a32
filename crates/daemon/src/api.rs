// SPDX-License-Identifier: Apache-2.0

//! REST + SSE handlers: one handler per command in the table,
//! plus `GET /api/v1/events` for the fire-and-forget event stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json};
use futures::stream::Stream;
use loudness_core::{CoreError, LimiterSettings, StreamId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::SourceSpec;
use crate::coordinator::{PartialLimiterSettings, StreamSnapshot};
use crate::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    error: &'static str,
    message: String,
}

fn map_core_error(err: CoreError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match &err {
        CoreError::AlreadyRegistered(_) => (StatusCode::CONFLICT, "already_registered"),
        CoreError::UnknownStream(_) => (StatusCode::NOT_FOUND, "unknown_stream"),
        CoreError::CaptureFailed { .. } => (StatusCode::SERVICE_UNAVAILABLE, "capture_failed"),
        CoreError::StreamGone { .. } => (StatusCode::GONE, "stream_gone"),
        CoreError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
        CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ErrorResponse {
            error: kind,
            message: err.to_string(),
        }),
    )
}

#[derive(Deserialize)]
pub struct RegisterStreamRequest {
    pub stream_id: Option<Uuid>,
    pub label: String,
    #[serde(default)]
    pub source_handle: SourceSpec,
}

#[derive(Serialize)]
pub struct RegisterStreamResponse {
    ok: bool,
    stream_id: StreamId,
}

/// POST /api/v1/streams
pub async fn register_stream(
    State(state): State<AppState>,
    Json(req): Json<RegisterStreamRequest>,
) -> Result<Json<RegisterStreamResponse>, (StatusCode, Json<ErrorResponse>)> {
    let id = req.stream_id.map(StreamId).unwrap_or_else(StreamId::new);
    let spec = req.source_handle;

    {
        let mut coordinator = state.coordinator.write().await;
        coordinator
            .register_stream(id, req.label, Box::new(crate::capture::SyntheticSource::new(spec.clone())))
            .map_err(map_core_error)?;
    }

    // The boxed `CaptureSource` just registered only exposes open/close; the
    // generator that actually produces samples for `spawn_playback_mix`
    // lives in `AppState::generators`, keyed the same way. A source that
    // can never open (`Unavailable`) has nothing to pump.
    if !matches!(spec, SourceSpec::Unavailable) {
        state
            .generators
            .lock()
            .await
            .insert(id, crate::capture::SyntheticSource::new(spec));
    }

    Ok(Json(RegisterStreamResponse { ok: true, stream_id: id }))
}

/// DELETE /api/v1/streams/{id}
pub async fn unregister_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let stream_id = StreamId(id);
    state
        .coordinator
        .write()
        .await
        .unregister_stream(stream_id)
        .map_err(map_core_error)?;
    state.generators.lock().await.remove(&stream_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Drives every registered stream's synthetic generator at an approximate
/// real-time rate, exercising both branches spec.md §4.3 describes:
/// * the analysis branch (`Coordinator::push_frame`), silent by
///   construction;
/// * the playback branch (`StreamProcessor::apply_gain`), whose output is
///   summed across every capturing stream and run through the shared
///   `Limiter` (`Coordinator::process_output_frame`) exactly as §2's
///   `gain -> sum -> limiter -> output` data flow specifies.
///
/// This reference daemon has no real output device, so the limited mix is
/// discarded once produced -- but producing it is what exercises the gain
/// and limiter code paths end to end. Stands in for the host-supplied
/// audio thread the core itself does not implement (spec §1: the host
/// environment is an external collaborator).
pub async fn spawn_playback_mix(state: AppState) {
    const TICK_MS: u64 = 20;
    const FRAMES_PER_TICK: usize = 48_000 * TICK_MS as usize / 1000;
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    let mut buf = vec![0.0f64; FRAMES_PER_TICK * 2];
    let mut mix = vec![[0.0f64; 2]; FRAMES_PER_TICK];

    loop {
        interval.tick().await;

        let mut generators = state.generators.lock().await;
        if generators.is_empty() {
            continue;
        }
        mix.iter_mut().for_each(|frame| *frame = [0.0, 0.0]);

        let mut coordinator = state.coordinator.write().await;
        let mut gone = Vec::new();
        for (&id, generator) in generators.iter_mut() {
            generator.fill(&mut buf);
            for (i, frame) in buf.chunks(2).enumerate() {
                if coordinator.push_frame(id, frame).is_err() {
                    gone.push(id);
                    break;
                }
                let mut playback = [frame[0], frame[1]];
                if coordinator.apply_gain(id, &mut playback).is_err() {
                    gone.push(id);
                    break;
                }
                mix[i][0] += playback[0];
                mix[i][1] += playback[1];
            }
        }
        for frame in mix.iter_mut() {
            coordinator.process_output_frame(frame);
        }
        drop(coordinator);

        for id in gone {
            generators.remove(&id);
        }
    }
}

#[derive(Deserialize)]
pub struct SetGainRequest {
    pub gain_db: f64,
}

#[derive(Serialize)]
pub struct SetGainResponse {
    ok: bool,
    applied_gain_db: f64,
}

/// POST /api/v1/streams/{id}/gain
pub async fn set_gain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetGainRequest>,
) -> Result<Json<SetGainResponse>, (StatusCode, Json<ErrorResponse>)> {
    let applied = state
        .coordinator
        .write()
        .await
        .set_gain(StreamId(id), req.gain_db)
        .map_err(map_core_error)?;
    Ok(Json(SetGainResponse { ok: true, applied_gain_db: applied }))
}

#[derive(Deserialize)]
pub struct SetMaxGainRequest {
    pub max_gain_db: f64,
}

#[derive(Serialize)]
pub struct SetMaxGainResponse {
    ok: bool,
    applied_max_gain_db: f64,
    applied_gain_db: f64,
}

/// POST /api/v1/streams/{id}/max-gain
pub async fn set_max_gain(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetMaxGainRequest>,
) -> Result<Json<SetMaxGainResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (applied_max_gain_db, applied_gain_db) = state
        .coordinator
        .write()
        .await
        .set_max_gain(StreamId(id), req.max_gain_db)
        .map_err(map_core_error)?;
    Ok(Json(SetMaxGainResponse {
        ok: true,
        applied_max_gain_db,
        applied_gain_db,
    }))
}

/// POST /api/v1/streams/{id}/reset
pub async fn reset_measurements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .coordinator
        .write()
        .await
        .reset_measurements(StreamId(id))
        .map_err(map_core_error)?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct GetStreamsResponse {
    streams: Vec<StreamSnapshot>,
    solo_stream: Option<StreamId>,
}

/// GET /api/v1/streams
pub async fn get_streams(State(state): State<AppState>) -> Json<GetStreamsResponse> {
    let (streams, solo_stream) = state.coordinator.read().await.snapshots();
    Json(GetStreamsResponse { streams, solo_stream })
}

#[derive(Serialize)]
pub struct SoloResponse {
    ok: bool,
    solo_stream: Option<StreamId>,
}

/// POST /api/v1/streams/{id}/solo
pub async fn toggle_solo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SoloResponse>, (StatusCode, Json<ErrorResponse>)> {
    let solo_stream = state
        .coordinator
        .write()
        .await
        .toggle_solo(StreamId(id))
        .map_err(map_core_error)?;
    Ok(Json(SoloResponse { ok: true, solo_stream }))
}

/// POST /api/v1/solo/clear
pub async fn clear_solo(State(state): State<AppState>) -> Json<SoloResponse> {
    let solo_stream = state.coordinator.write().await.clear_solo();
    Json(SoloResponse { ok: true, solo_stream })
}

#[derive(Deserialize)]
pub struct SetAutoBalanceRequest {
    pub enabled: Option<bool>,
    pub target_lufs: Option<f64>,
}

#[derive(Serialize)]
pub struct AutoBalanceResponse {
    ok: bool,
    auto_balance: loudness_core::AutoBalanceSettings,
}

/// POST /api/v1/auto-balance
pub async fn set_auto_balance(
    State(state): State<AppState>,
    Json(req): Json<SetAutoBalanceRequest>,
) -> Json<AutoBalanceResponse> {
    let auto_balance = state
        .coordinator
        .write()
        .await
        .set_auto_balance(req.enabled, req.target_lufs);
    Json(AutoBalanceResponse { ok: true, auto_balance })
}

#[derive(Deserialize, Default)]
pub struct BalanceNowRequest {
    pub target_lufs: Option<f64>,
}

/// POST /api/v1/balance-now
pub async fn balance_now(State(state): State<AppState>, Json(req): Json<BalanceNowRequest>) -> StatusCode {
    state.coordinator.write().await.balance_now(req.target_lufs);
    StatusCode::OK
}

#[derive(Serialize)]
pub struct LimiterResponse {
    ok: bool,
    limiter: LimiterSettings,
}

/// POST /api/v1/limiter
pub async fn set_limiter(
    State(state): State<AppState>,
    Json(partial): Json<PartialLimiterSettings>,
) -> Json<LimiterResponse> {
    let limiter = state.coordinator.write().await.set_limiter(partial);
    Json(LimiterResponse { ok: true, limiter })
}

/// GET /api/v1/limiter
pub async fn get_limiter(State(state): State<AppState>) -> Json<LimiterResponse> {
    let limiter = state.coordinator.read().await.limiter_settings();
    Json(LimiterResponse { ok: true, limiter })
}

/// GET /api/v1/events -- Server-Sent-Events fan-out of the core's fire-
/// and-forget event stream. A lagged subscriber misses events rather than
/// blocking the publisher; it is expected to resync via `GetStreams`.
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(SseEvent::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

pub async fn status() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "running", "version": env!("CARGO_PKG_VERSION") }))
}
