//! Shared fixtures for integration tests
//!
//! Engines don't share a radio here. Each one gets a [`RecordingTransport`]
//! that keeps every outbound envelope, and tests move the recorded text to
//! other engines with [`relay`], which gives full control over delivery order
//! and loss.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use griddown_team_core::{
    ConnectionState, EngineConfig, InboundOutcome, MemoryStore, MeshTransport, NewTeam,
    RallyMirror, RallyPoint, SettingsStore, TeamEngine, TeamError,
};
use parking_lot::Mutex;

/// Low KDF cost keeps encrypted-package tests fast
pub const TEST_KDF_ITERATIONS: u32 = 1_000;

/// Transport that records sent text instead of transmitting it
pub struct RecordingTransport {
    node_id: String,
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<String>>,
    fail_sends: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new(node_id: &str) -> Arc<Self> {
        Arc::new(Self {
            node_id: node_id.to_string(),
            state: Mutex::new(ConnectionState::Connected),
            sent: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
        })
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }

    /// Take everything sent so far
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MeshTransport for RecordingTransport {
    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn node_id(&self) -> Option<String> {
        Some(self.node_id.clone())
    }

    async fn send_text(&self, text: &str) -> Result<(), TeamError> {
        if *self.fail_sends.lock() {
            return Err(TeamError::Transport("radio busy".to_string()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

/// Rally mirror that remembers the last list it was given
#[derive(Default)]
pub struct CapturingMirror {
    pub last: Mutex<Option<Vec<RallyPoint>>>,
}

impl RallyMirror for CapturingMirror {
    fn rally_points_changed(&self, points: &[RallyPoint]) {
        *self.last.lock() = Some(points.to_vec());
    }
}

/// Settings store whose every call fails, like a full or read-only disk
pub struct FailingStore;

#[async_trait]
impl SettingsStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, TeamError> {
        Err(TeamError::Storage("disk unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), TeamError> {
        Err(TeamError::Storage("disk unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), TeamError> {
        Err(TeamError::Storage("disk unavailable".to_string()))
    }
}

/// An engine wired to its own recording transport
pub struct Node {
    pub engine: TeamEngine,
    pub radio: Arc<RecordingTransport>,
    pub store: MemoryStore,
}

impl Node {
    pub fn new(node_id: &str) -> Self {
        let radio = RecordingTransport::new(node_id);
        let store = MemoryStore::new();
        let engine = TeamEngine::builder(Arc::new(store.clone()))
            .transport(radio.clone())
            .config(EngineConfig::default().with_kdf_iterations(TEST_KDF_ITERATIONS))
            .build();
        Self {
            engine,
            radio,
            store,
        }
    }

    /// A node that has created a team named `team_name`
    pub async fn leader(node_id: &str, team_name: &str) -> Self {
        let mut node = Self::new(node_id);
        node.engine
            .create_team(NewTeam::named(team_name, node_id.to_uppercase()))
            .await
            .expect("create team");
        node
    }
}

/// Deliver everything `from` has sent to each of `to`, in send order
pub async fn relay(from: &Node, to: &mut [&mut Node]) -> Vec<InboundOutcome> {
    let mut outcomes = Vec::new();
    for text in from.radio.drain() {
        for node in to.iter_mut() {
            outcomes.push(node.engine.handle_incoming(&text).await);
        }
    }
    outcomes
}
