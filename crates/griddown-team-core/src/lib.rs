//! GridDown Team Engine Core Library
//!
//! Shared team state for small field groups over a low-bandwidth radio mesh.
//!
//! ## Overview
//!
//! A team is one record (members, roles, rally points, comm plan) held by
//! every member's device. Changes are broadcast as small JSON envelopes on the
//! team's mesh channel and merged in arrival order; there is no server and no
//! delivery guarantee. New members join out of band from an invite code or a
//! passphrase-encrypted `.gdteam` package.
//!
//! ## Core Principles
//!
//! - **Offline-first**: every operation works without a radio link
//! - **Fire-and-forget sync**: broadcasts are dropped when disconnected
//! - **One leader**: role changes and leader handoff keep a single leader
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use griddown_team_core::{NewRallyPoint, NewTeam, RallyType, RedbStore, TeamEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RedbStore::open("~/.griddown/team.redb")?);
//!     let mut engine = TeamEngine::builder(store).build();
//!
//!     if !engine.load().await? {
//!         engine.create_team(NewTeam::named("Ridge Runners", "Alpha")).await?;
//!     }
//!
//!     engine
//!         .add_rally_point(NewRallyPoint::new("Trailhead", RallyType::Primary, 39.74, -105.51))
//!         .await?;
//!
//!     println!("invite: {}", engine.invite_code()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod geo;
pub mod package;
pub mod permissions;
pub mod storage;
pub mod sync;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use crypto::PassphraseCipher;
pub use engine::{
    IgnoreReason, InboundOutcome, NewRallyPoint, NewTeam, ProfileUpdate, TeamEngine,
    TeamEngineBuilder, TeamInfoUpdate,
};
pub use error::{TeamError, TeamResult};
pub use geo::Fix;
pub use package::{
    build_invite, parse_invite, DisplayPackage, EncryptedPackage, EncryptionScheme, InviteCode,
    PackageOptions, TeamPackage, TeamSeed,
};
pub use permissions::Permission;
pub use storage::{MemoryStore, RedbStore, SettingsStore};
pub use sync::{
    ConnectionState, MeshTransport, RallyMirror, SyncSubtype, TeamEnvelope, TeamEvent,
};
pub use types::*;
