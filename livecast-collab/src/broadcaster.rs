//! Single dispatch point for one broadcast.
//!
//! Hub events, editor events and user commands all funnel through a
//! [`Broadcaster`]. It owns the state machine, the tracker and the editor
//! host, so every transition observes one consistent snapshot.

use crate::config::{ConnectionConfig, PreconditionError};
use crate::connection::{ConnectionPhase, ConnectionStateMachine, Reaction, StatusObserver};
use crate::protocol::SessionId;
use crate::tracker::{ChangeTracker, EditorEvent, EditorHost};
use crate::transport::{Connector, Epoch, HubEvent};

pub struct Broadcaster<H: EditorHost> {
    machine: ConnectionStateMachine,
    tracker: ChangeTracker,
    host: H,
}

impl<H: EditorHost> Broadcaster<H> {
    pub fn new(connector: Box<dyn Connector>, observer: Box<dyn StatusObserver>, host: H) -> Self {
        Self {
            machine: ConnectionStateMachine::new(connector, observer),
            tracker: ChangeTracker::new(),
            host,
        }
    }

    pub fn start(&mut self, config: ConnectionConfig) -> Result<(), PreconditionError> {
        self.machine.start(config)
    }

    pub fn stop(&mut self) {
        self.machine.stop();
    }

    /// Stop, then start with `config`. An invalid config leaves the running
    /// broadcast alone.
    pub fn restart(&mut self, config: ConnectionConfig) -> Result<(), PreconditionError> {
        config.validate()?;
        self.machine.stop();
        self.machine.start(config)
    }

    /// Resend the active document. Dropped unless a session is registered.
    pub fn refresh(&mut self) {
        let mut channel = self.machine.channel();
        self.tracker.resend_active_document(&self.host, &mut channel);
    }

    pub fn handle_hub_event(&mut self, event: HubEvent) {
        if self.machine.handle(event) == Reaction::Resync {
            self.refresh();
        }
    }

    pub fn handle_editor_event(&mut self, event: EditorEvent) {
        let mut channel = self.machine.channel();
        self.tracker.handle(event, &self.host, &mut channel);
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.machine.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.machine.is_connected()
    }

    pub fn is_authorized(&self) -> bool {
        self.machine.is_authorized()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.machine.session_id()
    }

    pub fn epoch(&self) -> Epoch {
        self.machine.epoch()
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}
