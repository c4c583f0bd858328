//! Duplex hub transport.
//!
//! The state machine only sees two traits: a [`Connector`] that opens a
//! transport for a given connection epoch, and the [`HubTransport`] it gets
//! back. Both are non-blocking. Everything the transport observes comes back
//! later as a [`HubEvent`] tagged with the epoch it was opened under.
//!
//! [`WsConnector`] is the WebSocket implementation:
//!
//! ```text
//!  HubTransport::invoke ──mpsc──▸ connection task ──ws──▸ hub
//!                                      │
//!  HubEvent ◂──────────mpsc────────────┘  (replies, lifecycle, retries)
//! ```
//!
//! A single task owns the socket, so frames leave in submission order. After
//! an unexpected loss the task retries under [`ReconnectPolicy`]; frames
//! submitted meanwhile are held and flushed once the link is back. A frame
//! whose send failed is dropped, not replayed.

use std::collections::VecDeque;
use std::fmt;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{ConnectionConfig, ReconnectPolicy};
use crate::protocol::{CompletionFrame, Invocation};

/// Generation counter of connection attempts. Bumped on every start, stop
/// and forced teardown; events from older generations are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a transport can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Initial connect succeeded
    Connected,
    /// Initial connect failed; the transport is gone
    ConnectFailed(String),
    /// Link lost; automatic attempt `attempt` is starting
    Reconnecting { attempt: u32 },
    /// Automatic attempt `attempt` failed
    ReconnectFailed { attempt: u32, reason: String },
    /// Link restored by an automatic attempt
    Reconnected,
    /// Link lost for good
    Disconnected,
    /// Non-fatal transport problem
    Error(String),
    /// Reply to invocation `id`: the response body or the hub's error
    Completed { id: u64, outcome: Result<String, String> },
}

/// A transport event stamped with the epoch of the transport that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEvent {
    pub epoch: Epoch,
    pub event: TransportEvent,
}

impl HubEvent {
    pub fn new(epoch: Epoch, event: TransportEvent) -> Self {
        Self { epoch, event }
    }
}

/// An open duplex session to the hub.
pub trait HubTransport {
    /// Queue a call. Never blocks; the reply arrives as
    /// [`TransportEvent::Completed`].
    fn invoke(&mut self, invocation: Invocation);

    /// Flush queued calls, then close. No further events are meaningful.
    fn close(&mut self);
}

/// Opens transports.
pub trait Connector {
    fn connect(&mut self, config: &ConnectionConfig, epoch: Epoch) -> Box<dyn HubTransport>;
}

// ───────────────────────────────────────────────────────────────────
// WebSocket implementation
// ───────────────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Frame(String),
    Close,
}

/// Opens WebSocket transports. Must be used from inside a tokio runtime.
pub struct WsConnector {
    events: mpsc::UnboundedSender<HubEvent>,
}

impl WsConnector {
    /// Create a connector and the receiver its transports report to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HubEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, config: &ConnectionConfig, epoch: Epoch) -> Box<dyn HubTransport> {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = ConnectionTask {
            url: config.socket_url(),
            policy: config.reconnect,
            outgoing: outgoing_rx,
            backlog: VecDeque::new(),
            sink: EventSink { epoch, events: self.events.clone() },
        };
        log::debug!("Opening hub transport {epoch} to {}", task.url);
        tokio::spawn(task.run());

        Box::new(WsTransport {
            hub: config.hub_name.clone(),
            outgoing,
        })
    }
}

/// Handle to a connection task.
pub struct WsTransport {
    hub: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl HubTransport for WsTransport {
    fn invoke(&mut self, invocation: Invocation) {
        let frame = invocation.to_frame(&self.hub);
        match serde_json::to_string(&frame) {
            Ok(text) => {
                if self.outgoing.send(Outgoing::Frame(text)).is_err() {
                    log::debug!("{} #{} not sent: transport closed", invocation.method, invocation.id);
                }
            }
            Err(e) => log::error!("Failed to encode {} frame: {e}", invocation.method),
        }
    }

    fn close(&mut self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

struct EventSink {
    epoch: Epoch,
    events: mpsc::UnboundedSender<HubEvent>,
}

impl EventSink {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(HubEvent::new(self.epoch, event)).is_err() {
            log::trace!("Hub event dropped: receiver gone");
        }
    }
}

enum PumpExit {
    /// Close requested (or the handle was dropped)
    Closed,
    /// Link lost unexpectedly
    Lost(String),
}

struct ConnectionTask {
    url: String,
    policy: ReconnectPolicy,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    /// Frames waiting for the link to come back
    backlog: VecDeque<String>,
    sink: EventSink,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut stream = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                self.sink.emit(TransportEvent::ConnectFailed(e.to_string()));
                return;
            }
        };
        self.sink.emit(TransportEvent::Connected);

        loop {
            match self.pump(&mut stream).await {
                PumpExit::Closed => {
                    log::debug!("Hub transport {} closed", self.sink.epoch);
                    return;
                }
                PumpExit::Lost(reason) => {
                    log::warn!("Hub connection lost: {reason}");
                }
            }

            match self.reconnect().await {
                Some(restored) => stream = restored,
                None => return,
            }
        }
    }

    /// Shuttle frames both ways until the link drops or a close is requested.
    async fn pump<S>(&mut self, stream: &mut S) -> PumpExit
    where
        S: Sink<Message, Error = WsError> + Stream<Item = Result<Message, WsError>> + Unpin,
    {
        while let Some(text) = self.backlog.pop_front() {
            if let Err(e) = stream.send(Message::Text(text.into())).await {
                return PumpExit::Lost(e.to_string());
            }
        }

        loop {
            tokio::select! {
                request = self.outgoing.recv() => match request {
                    Some(Outgoing::Frame(text)) => {
                        // A frame that failed mid-send may have reached the hub; never resend it.
                        if let Err(e) = stream.send(Message::Text(text.into())).await {
                            return PumpExit::Lost(e.to_string());
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = stream.close().await;
                        return PumpExit::Closed;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.on_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        return PumpExit::Lost("closed by hub".to_string());
                    }
                    Some(Err(e)) => return PumpExit::Lost(e.to_string()),
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn on_text(&self, text: &str) {
        match CompletionFrame::decode(text) {
            Ok(Some(frame)) => {
                let id = frame.id;
                self.sink.emit(TransportEvent::Completed { id, outcome: frame.into_outcome() });
            }
            Ok(None) => log::debug!("Ignoring hub push: {text}"),
            Err(e) => self.sink.emit(TransportEvent::Error(e.to_string())),
        }
    }

    /// Bounded retry loop. `None` when the task should end.
    async fn reconnect(&mut self) -> Option<WsStream> {
        for attempt in 1..=self.policy.max_attempts {
            self.sink.emit(TransportEvent::Reconnecting { attempt });
            if !self.wait(self.policy.delay).await {
                return None;
            }

            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    log::info!("Hub connection restored on attempt {attempt}");
                    self.sink.emit(TransportEvent::Reconnected);
                    return Some(stream);
                }
                Err(e) => self.sink.emit(TransportEvent::ReconnectFailed {
                    attempt,
                    reason: e.to_string(),
                }),
            }
        }

        self.sink.emit(TransportEvent::Disconnected);
        None
    }

    /// Sleep, holding submitted frames. `false` if a close came in.
    async fn wait(&mut self, delay: std::time::Duration) -> bool {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                request = self.outgoing.recv() => match request {
                    Some(Outgoing::Frame(text)) => self.backlog.push_back(text),
                    Some(Outgoing::Close) | None => return false,
                },
            }
        }
    }
}
