// SPDX-License-Identifier: Apache-2.0

//! Loudness Balancer Daemon
//!
//! Hosts the Coordinator behind a REST + Server-Sent-Events surface:
//! command handlers live in [`api`], background duties (continuous
//! balance, stale-stream sweep, the playback mix tick) are spawned by
//! `main`, and settings persistence lives in [`persistence`].

pub mod api;
pub mod capture;
pub mod coordinator;
pub mod persistence;

use std::collections::HashMap;
use std::sync::Arc;

use loudness_core::{Event, StreamId};
use tokio::sync::{broadcast, Mutex, RwLock};

pub use coordinator::Coordinator;

use crate::capture::SyntheticSource;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RwLock<Coordinator>>,
    pub events: broadcast::Sender<Event>,
    /// Per-stream synthetic sample generators driving both branches of the
    /// playback mix tick (see [`api::spawn_playback_mix`]): the analysis
    /// branch (`Coordinator::push_frame`) and the playback branch
    /// (`StreamProcessor::apply_gain` summed into the shared `Limiter`).
    /// Keyed separately from `Coordinator`'s `CaptureSource` handles because
    /// those are boxed as the opaque trait object and cannot generate
    /// samples themselves.
    pub generators: Arc<Mutex<HashMap<StreamId, SyntheticSource>>>,
}

impl AppState {
    pub fn new(persisted: persistence::PersistedState) -> Self {
        let (events, _rx) = broadcast::channel(256);
        let coordinator = Coordinator::new(events.clone(), persisted);
        Self {
            coordinator: Arc::new(RwLock::new(coordinator)),
            events,
            generators: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
