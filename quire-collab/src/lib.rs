//! # quire-collab: Document sessions for Quire
//!
//! Keeps one client's view of a shared document in step with the
//! collaboration server, and reads back its saved versions.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  commands   ┌──────────────┐  SyncMessage  ┌────────────┐
//! │ SessionHandle │ ──────────► │ SyncSession  │ ────────────► │ WsTransport│ ◄──► server
//! │ (cloneable)   │ ◄────────── │ (state       │ ◄──────────── │ (reconnect)│
//! └───────────────┘   watch     │  machine)    │ TransportEvent└────────────┘
//!                               └──────┬───────┘
//!                                      │ Outbox (while pending)
//!                                      ▼
//!                               quire-core Delta
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Binary wire protocol (bincode envelope, JSON payloads)
//! - [`transport`]: `Transport` trait and the WebSocket implementation
//! - [`outbox`]: Messages held while the link is pending
//! - [`session`]: Per-document state machine with debounced saving
//! - [`driver`]: Tokio task running a session, and one-shot requests
//! - [`history`]: Colorized version history
//! - [`config`]: Client settings

pub mod config;
pub mod driver;
pub mod error;
pub mod history;
pub mod outbox;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use driver::{fetch_templates, open_document, spawn_session, SessionHandle};
pub use error::SessionError;
pub use history::HistorySession;
pub use outbox::Outbox;
pub use protocol::{MessageType, ProtocolError, SavePayload, SyncMessage, TemplateDraft};
pub use session::{
    ChangeSource, ConnectionState, SaveStatus, SessionState, SyncSession, TemplateCatalog,
};
pub use transport::{Transport, TransportEvent, WsTransport};
