//! Session-bound send path.
//!
//! [`SessionLink`] holds the transport and the session fields; it is owned
//! by the connection state machine. [`SessionChannel`] is the short-lived
//! facade the rest of the core pushes updates through. Every push is gated
//! on "authorized and session registered" and is at-most-once: a gated push
//! is dropped, not queued, and a failed push is logged, not retried. The
//! full resync after the next successful registration supersedes whatever
//! was lost.

use std::collections::HashMap;

use serde::Serialize;

use crate::protocol::{
    CursorState, HubError, HubMethod, Invocation, RemoveSessionRequest, SessionId,
    UpdateOperation, UpdateSessionContentRequest, UpdateSessionCursorRequest,
    UpdateSessionInfoRequest,
};
use crate::transport::HubTransport;

/// Transport plus session state for the current broadcast.
pub struct SessionLink {
    transport: Option<Box<dyn HubTransport>>,
    authorized: bool,
    session_id: Option<SessionId>,
    /// Per-connection call id, monotonically increasing from 1
    next_call_id: u64,
    /// Handshake and removal calls still waiting for a reply
    pending: HashMap<u64, HubMethod>,
}

impl Default for SessionLink {
    fn default() -> Self {
        Self {
            transport: None,
            authorized: false,
            session_id: None,
            next_call_id: 1,
            pending: HashMap::new(),
        }
    }
}

impl SessionLink {
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// True when session traffic may flow.
    pub fn is_ready(&self) -> bool {
        self.authorized && self.session_id.is_some() && self.transport.is_some()
    }

    /// Install a fresh transport. Call ids restart at 1.
    pub(crate) fn attach(&mut self, transport: Box<dyn HubTransport>) {
        self.close_transport();
        self.clear_session();
        self.next_call_id = 1;
        self.transport = Some(transport);
    }

    pub(crate) fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    pub(crate) fn clear_session(&mut self) {
        self.authorized = false;
        self.session_id = None;
        self.pending.clear();
    }

    pub(crate) fn register(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
        self.authorized = true;
    }

    /// Which call a reply belongs to.
    pub(crate) fn take_pending(&mut self, id: u64) -> Option<HubMethod> {
        self.pending.remove(&id)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send a call, ungated. Used directly by the handshake.
    pub(crate) fn call<T: Serialize>(&mut self, method: HubMethod, request: &T) -> Result<u64, HubError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| HubError::Transport("no open transport".to_string()))?;

        let id = self.next_call_id;
        let invocation = Invocation::new(id, method, request)?;
        self.next_call_id += 1;
        if method.awaits_reply() {
            self.pending.insert(id, method);
        }
        log::trace!("Invoking {method} #{id}");
        transport.invoke(invocation);
        Ok(id)
    }
}

/// Gated facade over a [`SessionLink`]. Each push returns whether it was
/// handed to the transport.
pub struct SessionChannel<'a> {
    link: &'a mut SessionLink,
}

impl<'a> SessionChannel<'a> {
    pub fn new(link: &'a mut SessionLink) -> Self {
        Self { link }
    }

    pub fn is_ready(&self) -> bool {
        self.link.is_ready()
    }

    /// Push an update batch. Empty batches are not sent.
    pub fn push_content(&mut self, batch: Vec<UpdateOperation>) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.send(HubMethod::UpdateSessionContent, |id| UpdateSessionContentRequest {
            id,
            data: batch,
        })
    }

    pub fn push_info(&mut self, filename: &str, content_type: &str) -> bool {
        self.send(HubMethod::UpdateSessionInfo, |id| UpdateSessionInfoRequest {
            id,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        })
    }

    pub fn push_cursor(&mut self, cursor: CursorState) -> bool {
        self.send(HubMethod::UpdateSessionCursor, |id| UpdateSessionCursorRequest {
            id,
            anchor: cursor.anchor,
            active: cursor.active,
            kind: cursor.kind,
        })
    }

    /// Ask the hub to drop the session. No-op without one.
    pub fn remove_session(&mut self) -> bool {
        let sent = self.send(HubMethod::RemoveSession, |id| RemoveSessionRequest { id });
        if sent {
            log::info!("Removing session");
        }
        sent
    }

    fn send<T, F>(&mut self, method: HubMethod, build: F) -> bool
    where
        T: Serialize,
        F: FnOnce(SessionId) -> T,
    {
        if !self.link.is_ready() {
            log::trace!("Dropping {method}: no authorized session");
            return false;
        }
        let Some(id) = self.link.session_id.clone() else {
            return false;
        };

        match self.link.call(method, &build(id)) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Failed to send {method}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::{CursorPosition, UpdateKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Transport that records what it was asked to do.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        pub calls: Rc<RefCell<Vec<Invocation>>>,
        pub closed: Rc<RefCell<u32>>,
    }

    impl RecordingTransport {
        pub(crate) fn methods(&self) -> Vec<HubMethod> {
            self.calls.borrow().iter().map(|c| c.method).collect()
        }
    }

    impl HubTransport for RecordingTransport {
        fn invoke(&mut self, invocation: Invocation) {
            self.calls.borrow_mut().push(invocation);
        }

        fn close(&mut self) {
            *self.closed.borrow_mut() += 1;
        }
    }

    fn ready_link() -> (SessionLink, RecordingTransport) {
        let transport = RecordingTransport::default();
        let mut link = SessionLink::default();
        link.attach(Box::new(transport.clone()));
        link.register(SessionId::new("session-1"));
        (link, transport)
    }

    #[test]
    fn test_pushes_dropped_without_session() {
        let transport = RecordingTransport::default();
        let mut link = SessionLink::default();
        link.attach(Box::new(transport.clone()));

        let mut channel = SessionChannel::new(&mut link);
        for _ in 0..3 {
            assert!(!channel.push_content(vec![UpdateOperation::bare(UpdateKind::ResetAll)]));
            assert!(!channel.push_info("a.rs", "code:rust"));
            assert!(!channel.push_cursor(CursorState::from_selection(
                CursorPosition::default(),
                CursorPosition::default(),
            )));
            assert!(!channel.remove_session());
        }
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn test_pushes_dropped_without_transport() {
        let mut link = SessionLink::default();
        link.register(SessionId::new("orphan"));
        let mut channel = SessionChannel::new(&mut link);
        assert!(!channel.is_ready());
        assert!(!channel.push_info("a.rs", "code:rust"));
    }

    #[test]
    fn test_pushes_flow_when_ready() {
        let (mut link, transport) = ready_link();
        let mut channel = SessionChannel::new(&mut link);

        assert!(channel.push_info("src/main.rs", "code:rust"));
        assert!(channel.push_content(vec![UpdateOperation::bare(UpdateKind::RemoveMarker)]));
        assert!(channel.push_cursor(CursorState::from_selection(
            CursorPosition::new(0, 0),
            CursorPosition::new(0, 4),
        )));

        assert_eq!(
            transport.methods(),
            vec![
                HubMethod::UpdateSessionInfo,
                HubMethod::UpdateSessionContent,
                HubMethod::UpdateSessionCursor,
            ]
        );
        let ids: Vec<_> = transport.calls.borrow().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let info: serde_json::Value =
            serde_json::from_str(&transport.calls.borrow()[0].argument).unwrap();
        assert_eq!(info["id"], "session-1");
        assert_eq!(info["filename"], "src/main.rs");
        assert_eq!(info["type"], "code:rust");

        let cursor: serde_json::Value =
            serde_json::from_str(&transport.calls.borrow()[2].argument).unwrap();
        assert_eq!(cursor["type"], 1);
    }

    #[test]
    fn test_empty_batch_not_sent() {
        let (mut link, transport) = ready_link();
        assert!(!SessionChannel::new(&mut link).push_content(Vec::new()));
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn test_replies_map_back_to_methods() {
        let (mut link, _transport) = ready_link();
        SessionChannel::new(&mut link).remove_session();
        assert_eq!(link.take_pending(1), Some(HubMethod::RemoveSession));
        assert_eq!(link.take_pending(1), None);
    }

    #[test]
    fn test_unanswered_pushes_are_not_tracked() {
        let (mut link, transport) = ready_link();
        let mut channel = SessionChannel::new(&mut link);
        for _ in 0..200 {
            channel.push_content(vec![UpdateOperation::bare(UpdateKind::RemoveMarker)]);
            channel.push_info("x", "code:plaintext");
            channel.push_cursor(CursorState::from_selection(
                CursorPosition::default(),
                CursorPosition::default(),
            ));
        }
        assert_eq!(transport.calls.borrow().len(), 600);
        assert_eq!(link.pending_len(), 0);
    }

    #[test]
    fn test_attach_resets_call_ids_and_session() {
        let (mut link, first) = ready_link();
        SessionChannel::new(&mut link).push_info("x", "t");

        let second = RecordingTransport::default();
        link.attach(Box::new(second.clone()));

        assert_eq!(*first.closed.borrow(), 1);
        assert!(!link.is_authorized());
        assert!(link.session_id().is_none());

        let id = link.call(HubMethod::Authorize, &serde_json::json!({})).unwrap();
        assert_eq!(id, 1);
        assert_eq!(second.methods(), vec![HubMethod::Authorize]);
    }
}
