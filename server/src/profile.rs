//! Player profiles in an opaque key-value store.
//!
//! The room never waits on storage. It emits a [`StatsDelta`] per player when a match ends and
//! the game loop hands it to [`run_persistence`] over a bounded channel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Key-value storage for serialized profiles.
pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

/// In-process store used by the server binary and the tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.inner.lock() {
            Ok(map) => map.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn put(&self, key: &str, value: String) {
        match self.inner.lock() {
            Ok(mut map) => {
                map.insert(key.to_string(), value);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key.to_string(), value);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    #[serde(default)]
    pub dust: u64,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub distance: f64,
}

/// What one finished match adds to a player's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsDelta {
    pub player_id: u32,
    pub dust: u64,
    pub won: bool,
    pub lost: bool,
    pub goals: u32,
    pub distance: f64,
}

pub fn profile_key(player_id: u32) -> String {
    format!("blitz/player/{}", player_id)
}

/// Read a profile. Missing or unreadable entries start from zero.
pub fn load_profile(store: &dyn ProfileStore, player_id: u32) -> PlayerProfile {
    let key = profile_key(player_id);
    let Some(raw) = store.get(&key) else {
        return PlayerProfile::default();
    };
    match serde_json::from_str(&raw) {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Discarding unreadable profile {}: {}", key, e);
            PlayerProfile::default()
        }
    }
}

pub fn apply_delta(store: &dyn ProfileStore, delta: &StatsDelta) -> PlayerProfile {
    let mut profile = load_profile(store, delta.player_id);
    profile.dust = profile.dust.saturating_add(delta.dust);
    profile.wins += delta.won as u32;
    profile.losses += delta.lost as u32;
    profile.goals += delta.goals;
    profile.distance += delta.distance;

    match serde_json::to_string(&profile) {
        Ok(json) => store.put(&profile_key(delta.player_id), json),
        Err(e) => warn!("Failed to serialize profile {}: {}", delta.player_id, e),
    }
    profile
}

/// Drain deltas into the store until every sender is gone.
pub async fn run_persistence(mut rx: mpsc::Receiver<StatsDelta>, store: Arc<dyn ProfileStore>) {
    while let Some(delta) = rx.recv().await {
        let profile = apply_delta(store.as_ref(), &delta);
        debug!(
            "Saved profile {}: {} dust, {}W/{}L",
            delta.player_id, profile.dust, profile.wins, profile.losses
        );
    }
}
