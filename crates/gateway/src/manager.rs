//! Connection lifecycle management for the backend socket.
//!
//! One `ConnectionManager` owns one logical connection. Commands, inbound
//! frames and timer expiry all arrive on a single actor task, so state
//! transitions are strictly sequential and the reconnect timer can never
//! outlive the state that armed it.

use crate::{
    backoff,
    envelope::InboundMessage,
    transport::{Dialer, FrameSink, FrameStream, WsDialer},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Publicly observable state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket is open. A reconnect may be pending.
    Disconnected,
    /// A dial is in progress.
    Connecting,
    /// The socket is open; `send` will transmit.
    Connected,
    /// The reconnect budget is exhausted. Terminal until `connect()` is
    /// called again.
    Error,
}

/// Tunables for the reconnect policy.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// Base delay for the exponential backoff schedule.
    pub backoff_base: Duration,
    /// Upper bound on any single reconnect delay.
    pub backoff_cap: Duration,
    /// Consecutive failed reconnects tolerated before giving up.
    pub max_reconnect_attempts: u32,
}

/// Why a `send` did not transmit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,
    #[error("transmit failed: {0}")]
    Transport(String),
}

enum Command {
    Connect,
    Disconnect,
    Send(String, oneshot::Sender<Result<(), SendError>>),
}

/// Handle to the connection actor. Cheap to clone; all clones drive the
/// same underlying connection.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    inbound_rx: watch::Receiver<Option<InboundMessage>>,
}

impl ConnectionManager {
    /// Spawns the connection actor against the production dialer.
    ///
    /// The actor starts disconnected; call [`connect`](Self::connect) to
    /// open the socket.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_dialer(config, Arc::new(WsDialer))
    }

    /// Spawns the connection actor with a custom dialer.
    pub fn with_dialer(config: GatewayConfig, dialer: Arc<dyn Dialer>) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (inbound_tx, inbound_rx) = watch::channel(None);
        let driver = Driver {
            config,
            dialer,
            commands: command_rx,
            state_tx,
            inbound_tx,
            attempts: 0,
        };
        tokio::spawn(driver.run());
        Self {
            commands,
            state_rx,
            inbound_rx,
        }
    }

    /// Opens the connection. A no-op while already connected; from the
    /// terminal `Error` state this starts a fresh reconnect budget.
    pub fn connect(&self) {
        let _ = self.commands.try_send(Command::Connect);
    }

    /// Closes the connection and cancels any pending reconnect. The
    /// manager stays disconnected until the next `connect()`.
    pub fn disconnect(&self) {
        let _ = self.commands.try_send(Command::Disconnect);
    }

    /// Serializes `message` and transmits it if the connection is open.
    ///
    /// Nothing is buffered across disconnects: when not connected this
    /// reports [`SendError::NotConnected`] and the caller decides whether
    /// to queue or drop.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), SendError> {
        let frame =
            serde_json::to_string(message).map_err(|e| SendError::Transport(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Send(frame, reply_tx))
            .await
            .is_err()
        {
            return Err(SendError::NotConnected);
        }
        reply_rx.await.unwrap_or(Err(SendError::NotConnected))
    }

    /// Read-only view of the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Read-only view of the latest inbound message. Messages are not
    /// queued; a new delivery overwrites the previous one.
    pub fn messages(&self) -> watch::Receiver<Option<InboundMessage>> {
        self.inbound_rx.clone()
    }
}

enum Phase {
    Idle,
    Error,
    Dial,
    Backoff(Duration),
    Live(Box<dyn FrameSink>, Box<dyn FrameStream>),
}

struct Driver {
    config: GatewayConfig,
    dialer: Arc<dyn Dialer>,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: watch::Sender<Option<InboundMessage>>,
    attempts: u32,
}

impl Driver {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            let next = match phase {
                Phase::Idle | Phase::Error => self.wait_for_connect().await,
                Phase::Dial => self.dial().await,
                Phase::Backoff(delay) => self.wait_backoff(delay).await,
                Phase::Live(sink, stream) => self.live(sink, stream).await,
            };
            match next {
                Some(p) => phase = p,
                // All handles dropped: the actor is done.
                None => return,
            }
        }
    }

    /// Parked with no socket and no timer; only `connect()` moves on.
    async fn wait_for_connect(&mut self) -> Option<Phase> {
        loop {
            match self.commands.recv().await? {
                Command::Connect => {
                    self.attempts = 0;
                    return Some(Phase::Dial);
                }
                Command::Disconnect => {
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                }
                Command::Send(_, reply) => {
                    let _ = reply.send(Err(SendError::NotConnected));
                }
            }
        }
    }

    async fn dial(&mut self) -> Option<Phase> {
        let _ = self.state_tx.send(ConnectionState::Connecting);
        let dialer = Arc::clone(&self.dialer);
        let url = self.config.url.clone();
        let mut dial = std::pin::pin!(async move { dialer.dial(&url).await });
        loop {
            tokio::select! {
                result = &mut dial => {
                    return Some(match result {
                        Ok((sink, stream)) => {
                            self.attempts = 0;
                            info!(url = %self.config.url, "gateway connected");
                            let _ = self.state_tx.send(ConnectionState::Connected);
                            Phase::Live(sink, stream)
                        }
                        Err(error) => {
                            warn!(%error, "gateway dial failed");
                            self.after_drop()
                        }
                    });
                }
                command = self.commands.recv() => match command {
                    // Already connecting.
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect) => {
                        let _ = self.state_tx.send(ConnectionState::Disconnected);
                        return Some(Phase::Idle);
                    }
                    Some(Command::Send(_, reply)) => {
                        let _ = reply.send(Err(SendError::NotConnected));
                    }
                    None => return None,
                },
            }
        }
    }

    /// Waits out one backoff delay. The timer is owned here: leaving the
    /// phase for any reason drops it, so no reconnect can fire later.
    async fn wait_backoff(&mut self, delay: Duration) -> Option<Phase> {
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                () = &mut timer => return Some(Phase::Dial),
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {
                        self.attempts = 0;
                        return Some(Phase::Dial);
                    }
                    Some(Command::Disconnect) => {
                        let _ = self.state_tx.send(ConnectionState::Disconnected);
                        return Some(Phase::Idle);
                    }
                    Some(Command::Send(_, reply)) => {
                        let _ = reply.send(Err(SendError::NotConnected));
                    }
                    None => return None,
                },
            }
        }
    }

    async fn live(
        &mut self,
        mut sink: Box<dyn FrameSink>,
        mut stream: Box<dyn FrameStream>,
    ) -> Option<Phase> {
        loop {
            tokio::select! {
                frame = stream.next_frame() => match frame {
                    Ok(Some(text)) => match InboundMessage::parse(&text) {
                        Some(message) => {
                            debug!(kind = %message.kind, "inbound message");
                            let _ = self.inbound_tx.send(Some(message));
                        }
                        // Malformed payloads never affect connection state.
                        None => warn!("discarding malformed inbound frame"),
                    },
                    Ok(None) => {
                        info!("gateway connection closed by peer");
                        sink.close().await;
                        return Some(self.after_drop());
                    }
                    Err(error) => {
                        warn!(%error, "gateway connection failed");
                        sink.close().await;
                        return Some(self.after_drop());
                    }
                },
                command = self.commands.recv() => match command {
                    // Already connected.
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect) => {
                        sink.close().await;
                        let _ = self.state_tx.send(ConnectionState::Disconnected);
                        return Some(Phase::Idle);
                    }
                    Some(Command::Send(frame, reply)) => {
                        let result = sink
                            .send(frame)
                            .await
                            .map_err(|e| SendError::Transport(e.to_string()));
                        // A failed transmit means the socket is gone; the
                        // read side observes the close and drives the retry.
                        let _ = reply.send(result);
                    }
                    None => {
                        sink.close().await;
                        return None;
                    }
                },
            }
        }
    }

    /// Bookkeeping after an unsolicited close, error, or failed dial.
    fn after_drop(&mut self) -> Phase {
        if self.attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = self.attempts,
                "reconnect budget exhausted, giving up"
            );
            let _ = self.state_tx.send(ConnectionState::Error);
            Phase::Error
        } else {
            self.attempts += 1;
            let delay = backoff::delay(
                self.config.backoff_base,
                self.config.backoff_cap,
                self.attempts,
            );
            debug!(attempt = self.attempts, ?delay, "reconnect scheduled");
            let _ = self.state_tx.send(ConnectionState::Disconnected);
            Phase::Backoff(delay)
        }
    }
}
