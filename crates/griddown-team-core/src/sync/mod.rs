//! Mesh synchronization layer
//!
//! Team changes travel as broadcast-only JSON envelopes on the team's mesh
//! channel. There is no acknowledgement, retry, queue or version vector:
//! a change sent while the radio is down is simply lost, and the receiving
//! side applies whatever arrives in arrival order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  TeamEngine                                                  │
//! │  ├── outbound: TeamEnvelope ──► MeshTransport::send_text     │
//! │  └── inbound:  handle_incoming(text)                         │
//! │        ├── TeamEnvelope::parse   (filter non-team traffic)   │
//! │        ├── team id / own echo filter                         │
//! │        └── apply_envelope        (per-subtype merge rules)   │
//! │                                                              │
//! │  broadcast::Sender<TeamEvent> ──► UI subscribers             │
//! │  RallyMirror                  ──► map waypoint layer         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod apply;
pub mod envelope;
pub mod events;
pub mod transport;

pub use apply::{apply_envelope, shallow_merge, touch_sender, Effect, MemberRef, RallyList};
pub use envelope::{ParsedMessage, SyncSubtype, TeamEnvelope, ENVELOPE_TAG};
pub use events::{RallyMirror, TeamEvent};
pub use transport::{ConnectionState, MeshTransport};
