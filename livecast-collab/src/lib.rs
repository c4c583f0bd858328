//! # livecast-collab: live document broadcasting to a collaboration hub
//!
//! Pushes one editor's document (content, cursor, filename/type) to a remote
//! hub session so viewers can follow edits as they happen.
//!
//! ## Architecture
//!
//! ```text
//!  editor events ──▸ ChangeTracker ──▸ OperationBuilder
//!                          │
//!                          ▼
//!                   SessionChannel ──(gated)──▸ HubTransport ──ws──▸ hub
//!                          ▲                         │
//!                          │                         ▼
//!              ConnectionStateMachine ◂──── HubEvent { epoch, event }
//! ```
//!
//! Everything runs on the caller's single event loop. The [`Broadcaster`] is
//! the one dispatch point: hub events, editor events and commands all go
//! through it. Only the transport task does I/O.
//!
//! ## Modules
//!
//! - [`protocol`]: Hub operations, request bodies and JSON framing
//! - [`config`]: Settings, validation and the reconnect policy
//! - [`operations`]: Editor changes to ordered update batches
//! - [`transport`]: Transport traits and the WebSocket implementation
//! - [`channel`]: Session-gated send path
//! - [`connection`]: Connection/authorization state machine
//! - [`tracker`]: Active document tracking
//! - [`broadcaster`]: Dispatch point tying it all together
//!
//! ## Delivery
//!
//! | Traffic | Guarantee |
//! |---------|-----------|
//! | Handshake calls | Serialized: registration only after authorization |
//! | Content / info / cursor | At most once, in submission order |
//! | Anything while not registered | Dropped, superseded by the next resync |

pub mod protocol;
pub mod config;
pub mod operations;
pub mod transport;
pub mod channel;
pub mod connection;
pub mod tracker;
pub mod broadcaster;

// Re-exports for convenience
pub use protocol::{
    CursorKind, CursorPosition, CursorState, HubError, HubMethod, Line, SessionId, UpdateKind,
    UpdateOperation,
};
pub use config::{BroadcastSettings, ConfigError, ConnectionConfig, PreconditionError, ReconnectPolicy};
pub use operations::{OperationBuilder, TextChange};
pub use transport::{Connector, Epoch, HubEvent, HubTransport, TransportEvent, WsConnector};
pub use channel::{SessionChannel, SessionLink};
pub use connection::{
    ConnectionPhase, ConnectionStateMachine, Notice, NoticeLevel, NullObserver, Reaction,
    StatusObserver,
};
pub use tracker::{
    ActiveEditor, ChangeTracker, DocumentId, DocumentSnapshot, EditorEvent, EditorHost, Selection,
};
pub use broadcaster::Broadcaster;
