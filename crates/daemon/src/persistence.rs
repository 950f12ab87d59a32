// SPDX-License-Identifier: Apache-2.0

//! Persisted settings: `auto_balance` and `limiter`, stored as one
//! JSON document under the platform config directory. The stream set is
//! never persisted -- live capture cannot be resumed across a process
//! restart.

use std::path::PathBuf;

use loudness_core::{AutoBalanceSettings, LimiterSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub auto_balance: AutoBalanceSettings,
    #[serde(default = "LimiterSettings::default_enabled")]
    pub limiter: LimiterSettings,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            auto_balance: AutoBalanceSettings::default(),
            limiter: LimiterSettings::default_enabled(),
        }
    }
}

fn state_path() -> Result<PathBuf, PersistenceError> {
    let mut dir = dirs::config_dir().ok_or(PersistenceError::NoConfigDir)?;
    dir.push("loudness-balancer");
    Ok(dir.join("state.json"))
}

/// Load persisted state, falling back to defaults if the file does not
/// exist yet (first run) or cannot be parsed (treated as absent, with a
/// logged warning rather than a hard failure -- a corrupt settings file
/// should not prevent the daemon from starting).
pub fn load() -> PersistedState {
    let path = match state_path() {
        Ok(path) => path,
        Err(_) => return PersistedState::default(),
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed state file");
                PersistedState::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read state file");
            PersistedState::default()
        }
    }
}

pub fn save(state: &PersistedState) -> Result<(), PersistenceError> {
    let path = state_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Write {
            path: path.clone(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(state).map_err(|source| PersistenceError::Parse {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|source| PersistenceError::Write { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_round_trips_through_json() {
        let state = PersistedState::default();
        let json = serde_json::to_string(&state).unwrap();
        let parsed: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.auto_balance, state.auto_balance);
        assert_eq!(parsed.limiter, state.limiter);
    }

    #[test]
    fn partial_document_fills_in_defaults() {
        let parsed: PersistedState = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.auto_balance, AutoBalanceSettings::default());
        assert_eq!(parsed.limiter, LimiterSettings::default_enabled());
    }
}
