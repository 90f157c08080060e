// WebSocket connection to the match server.
//
// A single background transport task owns the socket. It forwards inbound
// text frames as `ConnectionEvent`s, writes queued outbound frames, pings
// the server to detect dead links and, when configured, reconnects after a
// loss. The `ConnectionManager` handle is the only way to reach that task.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;

/// Capacity of the outbound frame queue.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// How long `teardown` waits for the transport task before aborting it.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Events emitted by the transport task to the dispatcher.
#[derive(Debug, PartialEq)]
pub enum ConnectionEvent {
    /// The WebSocket handshake with the server completed.
    Connected { endpoint: String },
    /// An established connection was lost.
    Disconnected,
    /// A text frame was received (raw JSON string).
    Message(String),
}

/// Transport settings, resolved from [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    /// A session with no inbound frame for this long is considered lost.
    pub idle_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        ConnectionSettings {
            endpoint: config.server.url.trim().to_string(),
            reconnect: config.connection.reconnect,
            reconnect_delay: config.connection.reconnect_delay(),
            ping_interval: config.connection.ping_interval(),
            idle_timeout: config.connection.idle_timeout(),
        }
    }
}

/// Why a single WebSocket session ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Server closed, socket error, or idle timeout.
    Lost,
    /// `teardown` was requested.
    Shutdown,
    /// Nobody listens for events any more.
    EventsClosed,
}

/// What to do with one item read from the socket.
#[derive(Debug, PartialEq)]
pub(crate) enum FrameAction {
    Forward(String),
    Ignore,
    Closed,
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Handle to the one live connection of this client.
///
/// Dropping the handle aborts the transport task; `teardown` closes it
/// cleanly. Either way the socket is released exactly once.
pub struct ConnectionManager {
    outbound_tx: mpsc::Sender<String>,
    connected_rx: watch::Receiver<bool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start the transport task. Connection progress is reported through
    /// `events_tx`; failures only show up as the absence of `Connected`.
    pub fn connect(settings: ConnectionSettings, events_tx: mpsc::Sender<ConnectionEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(transport_loop(
            settings,
            outbound_rx,
            events_tx,
            connected_tx,
            shutdown_rx,
        ));

        ConnectionManager {
            outbound_tx,
            connected_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Queue a text frame. Returns `false` when the frame was dropped because
    /// there is no live connection or the queue is full.
    pub fn send(&self, text: String) -> bool {
        if !self.is_connected() {
            debug!("Dropping outbound frame: not connected");
            return false;
        }
        match self.outbound_tx.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping outbound frame: {}", e);
                false
            }
        }
    }

    /// Close the connection and stop the transport task. Consumes the
    /// handle, so it can only happen once.
    pub async fn teardown(mut self) {
        debug!("Connection teardown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match time::timeout(TEARDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Transport task terminated with join error: {}", e),
                Err(_) => {
                    warn!("Transport task did not exit within {:?}, aborting", TEARDOWN_TIMEOUT);
                    task.abort();
                }
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Transport task
// ---------------------------------------------------------------------------

async fn transport_loop(
    settings: ConnectionSettings,
    mut outbound_rx: mpsc::Receiver<String>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    connected_tx: watch::Sender<bool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let attempt = tokio::select! {
            res = tokio_tungstenite::connect_async(settings.endpoint.as_str()) => res,
            _ = &mut shutdown_rx => break,
        };

        match attempt {
            Ok((ws, _response)) => {
                info!("Connected to {}", settings.endpoint);

                // Frames queued for a previous connection must not leak into
                // this one.
                while outbound_rx.try_recv().is_ok() {}

                let _ = connected_tx.send(true);
                if events_tx
                    .send(ConnectionEvent::Connected {
                        endpoint: settings.endpoint.clone(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }

                let end =
                    run_session(ws, &settings, &mut outbound_rx, &events_tx, &mut shutdown_rx)
                        .await;
                let _ = connected_tx.send(false);

                match end {
                    SessionEnd::Lost => {
                        info!("Connection to {} lost", settings.endpoint);
                        if events_tx.send(ConnectionEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                    SessionEnd::Shutdown | SessionEnd::EventsClosed => break,
                }
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", settings.endpoint, e);
            }
        }

        if !settings.reconnect {
            break;
        }

        tokio::select! {
            _ = time::sleep(settings.reconnect_delay) => {
                debug!("Reconnecting to {}", settings.endpoint);
            }
            _ = &mut shutdown_rx => break,
        }
    }

    let _ = connected_tx.send(false);
    info!("Transport task exiting");
}

/// Drive one established WebSocket session until it ends.
///
/// Generic over the stream type so it can be tested over in-memory duplex
/// pipes without opening TCP ports.
pub(crate) async fn run_session<S>(
    ws: WebSocketStream<S>,
    settings: &ConnectionSettings,
    outbound_rx: &mut mpsc::Receiver<String>,
    events_tx: &mpsc::Sender<ConnectionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    let mut ping = time::interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = read.next() => {
                last_seen = Instant::now();
                match classify_frame(frame, &settings.endpoint) {
                    FrameAction::Forward(text) => {
                        if events_tx.send(ConnectionEvent::Message(text)).await.is_err() {
                            return SessionEnd::EventsClosed;
                        }
                    }
                    FrameAction::Ignore => {}
                    FrameAction::Closed => return SessionEnd::Lost,
                }
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!("Failed to send frame to {}: {}", settings.endpoint, e);
                    return SessionEnd::Lost;
                }
            }

            _ = ping.tick() => {
                let idle = last_seen.elapsed();
                if idle > settings.idle_timeout {
                    warn!(
                        "No frame from {} for {:?}, treating connection as lost",
                        settings.endpoint, idle
                    );
                    return SessionEnd::Lost;
                }
                if let Err(e) = write.send(Message::Ping(Vec::<u8>::new().into())).await {
                    warn!("Failed to ping {}: {}", settings.endpoint, e);
                    return SessionEnd::Lost;
                }
            }

            _ = &mut *shutdown_rx => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close frame not delivered to {}: {}", settings.endpoint, e);
                }
                return SessionEnd::Shutdown;
            }
        }
    }
}

/// Map one read result to an action. Binary, ping, pong and raw frames are
/// ignored; tungstenite answers pings on its own.
pub(crate) fn classify_frame(
    frame: Option<Result<Message, WsError>>,
    endpoint: &str,
) -> FrameAction {
    match frame {
        Some(Ok(Message::Text(text))) => FrameAction::Forward(text.to_string()),
        Some(Ok(Message::Close(_))) => {
            info!("Server {} sent close frame", endpoint);
            FrameAction::Closed
        }
        Some(Err(e)) => {
            warn!("WebSocket error from {}: {}", endpoint, e);
            FrameAction::Closed
        }
        None => FrameAction::Closed,
        Some(Ok(_)) => FrameAction::Ignore,
    }
}
