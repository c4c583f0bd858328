//! Connection and authorization state machine.
//!
//! ```text
//!                start
//!  Disconnected ───────▸ Connecting ──connected──▸ SignedIn
//!       ▲                    │                        │ Authorize ok
//!       │ stop / failure     │ connect failed         │ AppendSession ok
//!       ├────────────────────┘                        ▼
//!       │                 reconnected            Connected ◂─┐
//!       │    ┌──────────────────────────────────────┘ │       │
//!       │    ▼                                        │ reconnecting
//!       └─ Reconnecting ◂─────────────────────────────┘       │
//!            └────────────────────────────────────────────────┘
//! ```
//!
//! All transitions run synchronously inside [`ConnectionStateMachine::handle`]
//! or the explicit `start`/`stop` calls. Events carry the [`Epoch`] of the
//! transport that raised them; anything from an older epoch is discarded, so
//! a late "registration succeeded" after `stop` cannot resurrect a session.

use std::fmt;

use crate::channel::{SessionChannel, SessionLink};
use crate::config::{ConnectionConfig, PreconditionError};
use crate::protocol::{
    decode_response, AppendSessionRequest, AppendSessionResponse, AuthorizeRequest,
    AuthorizeResponse, HubError, HubMethod, SessionId, PLACEHOLDER_CONTENT_TYPE,
};
use crate::transport::{Connector, Epoch, HubEvent, TransportEvent};

/// Lifecycle phase of the broadcast connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    SignedIn,
    Connected,
    Reconnecting,
}

impl ConnectionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::SignedIn => "SignedIn",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
        }
    }

    fn is_handshaking(&self) -> bool {
        matches!(self, Self::Connecting | Self::SignedIn)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Status display. Purely observational.
pub trait StatusObserver {
    fn phase_changed(&mut self, _old: ConnectionPhase, _new: ConnectionPhase) {}

    fn notify(&mut self, _notice: Notice) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl StatusObserver for NullObserver {}

/// What the caller must do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Nothing,
    /// A session was just registered: resend the active document.
    Resync,
}

/// Owns the one transport of the current broadcast and its handshake.
pub struct ConnectionStateMachine {
    phase: ConnectionPhase,
    epoch: Epoch,
    config: Option<ConnectionConfig>,
    link: SessionLink,
    connector: Box<dyn Connector>,
    observer: Box<dyn StatusObserver>,
    /// Consecutive failed automatic reconnect attempts
    reconnect_failures: u32,
}

impl ConnectionStateMachine {
    pub fn new(connector: Box<dyn Connector>, observer: Box<dyn StatusObserver>) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            epoch: Epoch::default(),
            config: None,
            link: SessionLink::default(),
            connector,
            observer,
            reconnect_failures: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// True iff a transport currently exists, whatever the phase.
    pub fn is_connected(&self) -> bool {
        self.link.has_transport()
    }

    pub fn is_authorized(&self) -> bool {
        self.link.is_authorized()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.link.session_id()
    }

    /// Gated send path bound to the current session.
    pub fn channel(&mut self) -> SessionChannel<'_> {
        SessionChannel::new(&mut self.link)
    }

    /// Open a transport and begin the handshake.
    pub fn start(&mut self, config: ConnectionConfig) -> Result<(), PreconditionError> {
        config.validate()?;
        if self.is_connected() {
            log::warn!("Start ignored: already connected ({})", self.phase);
            self.observer.notify(Notice::warning("Already connected"));
            return Err(PreconditionError::AlreadyConnected);
        }

        self.epoch = self.epoch.next();
        self.reconnect_failures = 0;
        log::info!(
            "Connecting to {} on {} (epoch {})",
            config.hub_name,
            config.endpoint_url,
            self.epoch
        );
        let transport = self.connector.connect(&config, self.epoch);
        self.link.attach(transport);
        self.config = Some(config);
        self.set_phase(ConnectionPhase::Connecting);
        Ok(())
    }

    /// User-driven stop. Safe from any phase, idempotent.
    pub fn stop(&mut self) {
        if self.is_connected() {
            self.channel().remove_session();
            log::info!("Stopping broadcast");
        }
        self.teardown();
    }

    /// Feed one transport event through the machine.
    pub fn handle(&mut self, event: HubEvent) -> Reaction {
        if event.epoch != self.epoch {
            log::debug!(
                "Ignoring {:?} from stale epoch {} (current {})",
                event.event,
                event.epoch,
                self.epoch
            );
            return Reaction::Nothing;
        }

        match event.event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::ConnectFailed(reason) => {
                if self.phase == ConnectionPhase::Connecting {
                    let message = format!("Could not connect to {}: {reason}", self.hub_label());
                    self.fail(HubError::Transport(reason), message);
                }
            }
            TransportEvent::Error(reason) => {
                if self.phase.is_handshaking() {
                    let message = format!("Connection to {} failed: {reason}", self.hub_label());
                    self.fail(HubError::Transport(reason), message);
                } else {
                    log::warn!("Transport error: {reason}");
                }
            }
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Reconnecting { attempt } => self.on_reconnecting(attempt),
            TransportEvent::ReconnectFailed { attempt, reason } => {
                self.on_reconnect_failed(attempt, &reason)
            }
            TransportEvent::Reconnected => {
                if self.phase == ConnectionPhase::Reconnecting {
                    self.reconnect_failures = 0;
                    self.set_phase(ConnectionPhase::Connected);
                }
            }
            TransportEvent::Completed { id, outcome } => return self.on_completed(id, outcome),
        }
        Reaction::Nothing
    }

    fn on_connected(&mut self) {
        if self.phase != ConnectionPhase::Connecting {
            return;
        }
        let Some(config) = self.config.as_ref() else {
            return;
        };
        let request = AuthorizeRequest {
            user_name: config.user_name.clone(),
            access_token: config.access_token.clone(),
            room_name: config.room_name.clone(),
            room_token: config.room_token.clone(),
        };
        let established = format!("Established connection to {}", self.hub_label());

        self.observer.notify(Notice::info(established));
        self.set_phase(ConnectionPhase::SignedIn);
        if let Err(e) = self.link.call(HubMethod::Authorize, &request) {
            let message = format!("Authentication failed ({})", self.credentials_label());
            self.fail(e, message);
        }
    }

    fn on_completed(&mut self, id: u64, outcome: Result<String, String>) -> Reaction {
        let Some(method) = self.link.take_pending(id) else {
            log::trace!("Reply #{id} matches no pending call");
            return Reaction::Nothing;
        };

        if !method.is_handshake() {
            match outcome {
                Ok(_) => log::trace!("{method} #{id} acknowledged"),
                Err(message) => log::error!("Failed to {method}: {message}"),
            }
            return Reaction::Nothing;
        }

        if self.phase != ConnectionPhase::SignedIn {
            log::debug!("Late {method} reply ignored in phase {}", self.phase);
            return Reaction::Nothing;
        }

        match method {
            HubMethod::Authorize => {
                self.on_authorized(outcome);
                Reaction::Nothing
            }
            _ => self.on_registered(outcome),
        }
    }

    fn on_authorized(&mut self, outcome: Result<String, String>) {
        let result = handshake_reply::<AuthorizeResponse>(HubMethod::Authorize, outcome)
            .and_then(|response| {
                if response.success {
                    Ok(())
                } else {
                    Err(HubError::Rejected(HubMethod::Authorize))
                }
            });

        if let Err(e) = result {
            let message = format!("Authentication failed ({})", self.credentials_label());
            self.fail(e, message);
            return;
        }

        let message = match self.config.as_ref() {
            Some(config) => format!(
                "Authentication success (User: {}). Now broadcasting to {}",
                config.user_name, config.room_name
            ),
            None => "Authentication success".to_string(),
        };
        log::info!("{message}");
        self.observer.notify(Notice::info(message));

        let placeholder = AppendSessionRequest {
            filename: String::new(),
            content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
        };
        if let Err(e) = self.link.call(HubMethod::AppendSession, &placeholder) {
            self.fail(e, "Failed to register session".to_string());
        }
    }

    fn on_registered(&mut self, outcome: Result<String, String>) -> Reaction {
        let result = handshake_reply::<AppendSessionResponse>(HubMethod::AppendSession, outcome)
            .and_then(|response| match (response.success, response.id) {
                (true, Some(id)) => Ok(id),
                (true, None) => Err(HubError::Malformed {
                    method: HubMethod::AppendSession,
                    reason: "missing session id".to_string(),
                }),
                (false, _) => Err(HubError::Rejected(HubMethod::AppendSession)),
            });

        match result {
            Ok(session_id) => {
                log::info!("Registered session (Session Id: {session_id})");
                self.link.register(session_id);
                self.set_phase(ConnectionPhase::Connected);
                Reaction::Resync
            }
            Err(e) => {
                self.fail(e, "Failed to register session".to_string());
                Reaction::Nothing
            }
        }
    }

    fn on_disconnected(&mut self) {
        if self.phase == ConnectionPhase::Disconnected {
            return;
        }
        let message = format!("Disconnected connection to {}", self.hub_label());
        log::info!("{message}");
        self.observer.notify(Notice::info(message));
        self.teardown();
    }

    fn on_reconnecting(&mut self, attempt: u32) {
        match self.phase {
            ConnectionPhase::Connected | ConnectionPhase::Reconnecting => {
                log::info!("Reconnecting to {} (attempt {attempt})", self.hub_label());
                if attempt > self.max_reconnect_attempts() {
                    self.give_up();
                } else {
                    self.set_phase(ConnectionPhase::Reconnecting);
                }
            }
            ConnectionPhase::Connecting | ConnectionPhase::SignedIn => {
                let message = format!("Connection to {} lost during sign-in", self.hub_label());
                self.fail(HubError::Transport("link lost during handshake".to_string()), message);
            }
            ConnectionPhase::Disconnected => {}
        }
    }

    fn on_reconnect_failed(&mut self, attempt: u32, reason: &str) {
        if self.phase != ConnectionPhase::Reconnecting {
            return;
        }
        self.reconnect_failures += 1;
        log::warn!("Reconnect attempt {attempt} failed: {reason}");
        if self.reconnect_failures >= self.max_reconnect_attempts() {
            self.give_up();
        }
    }

    fn give_up(&mut self) {
        let message = format!(
            "Gave up reconnecting to {} after {} attempts",
            self.hub_label(),
            self.reconnect_failures
        );
        log::error!("{message}");
        self.observer.notify(Notice::error(message));
        self.teardown();
    }

    /// Abort the attempt: report, then tear down.
    fn fail(&mut self, error: HubError, message: String) {
        log::error!("{message}: {error}");
        self.observer.notify(Notice::error(message));
        self.teardown();
    }

    /// Drop the transport and session, invalidate in-flight callbacks.
    fn teardown(&mut self) {
        self.epoch = self.epoch.next();
        self.reconnect_failures = 0;
        self.link.close_transport();
        self.link.clear_session();
        self.set_phase(ConnectionPhase::Disconnected);
    }

    fn set_phase(&mut self, new: ConnectionPhase) {
        let old = self.phase;
        if old == new {
            return;
        }
        self.phase = new;
        log::info!("Status changed from {old} to {new}");
        self.observer.phase_changed(old, new);
    }

    fn max_reconnect_attempts(&self) -> u32 {
        self.config
            .as_ref()
            .map(|config| config.reconnect.max_attempts)
            .unwrap_or_default()
    }

    fn hub_label(&self) -> String {
        match self.config.as_ref() {
            Some(config) => format!("{} on {}", config.hub_name, config.endpoint_url),
            None => "hub".to_string(),
        }
    }

    fn credentials_label(&self) -> String {
        match self.config.as_ref() {
            Some(config) => format!("User: {}, Room: {}", config.user_name, config.room_name),
            None => String::new(),
        }
    }
}

fn handshake_reply<T: serde::de::DeserializeOwned>(
    method: HubMethod,
    outcome: Result<String, String>,
) -> Result<T, HubError> {
    match outcome {
        Ok(raw) => decode_response(method, &raw),
        Err(message) => Err(HubError::Remote { method, message }),
    }
}
