// Match client: the single dispatcher between the connection and the UI.
//
// One task owns the `ConnectionManager` and the current `ClientState`. It
// listens on two channels with `tokio::select!`:
// 1. Connection events from the transport task
// 2. Commands (intents, shutdown) from `MatchClient` handles
//
// Each item is folded into the state before the next one is looked at, and
// every changed snapshot is published on a watch channel for the UI.

use std::mem;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionSettings};
use crate::match_state::ClientState;
use crate::protocol::{ClientMessage, ServerEvent};
use crate::reducer;

/// Capacity of the connection event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("match client is no longer running")]
    Closed,
}

/// Discrete UI actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    JoinQueue { name: String },
    /// Submit `code`, or the editor buffer when `None`.
    Submit { code: Option<String> },
    EditCode(String),
    RequestRematch,
    ReturnToLobby,
}

enum Command {
    Intent(Intent),
    Shutdown(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// MatchClient handle
// ---------------------------------------------------------------------------

/// Cloneable UI-side handle.
///
/// Intent methods queue the action and return immediately; the effects
/// show up later in the published snapshots. They only fail once the
/// dispatcher has stopped.
#[derive(Clone)]
pub struct MatchClient {
    commands_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ClientState>,
}

impl MatchClient {
    /// Connect to the configured server and start the dispatcher.
    pub fn start(config: &ClientConfig) -> (MatchClient, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connection =
            ConnectionManager::connect(ConnectionSettings::from_config(config), events_tx);
        Self::spawn(
            ClientState::new(&config.player.language),
            connection,
            events_rx,
        )
    }

    /// Start the dispatcher over an already started connection.
    pub fn spawn(
        initial: ClientState,
        connection: ConnectionManager,
        events_rx: mpsc::Receiver<ConnectionEvent>,
    ) -> (MatchClient, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initial.clone());

        let task = tokio::spawn(run(
            Dispatcher::new(initial),
            events_rx,
            commands_rx,
            connection,
            state_tx,
        ));

        (
            MatchClient {
                commands_tx,
                state_rx,
            },
            task,
        )
    }

    pub fn join_queue(&self, name: impl Into<String>) -> Result<(), ClientError> {
        self.intent(Intent::JoinQueue { name: name.into() })
    }

    pub fn submit(&self, code: Option<String>) -> Result<(), ClientError> {
        self.intent(Intent::Submit { code })
    }

    pub fn edit_code(&self, code: impl Into<String>) -> Result<(), ClientError> {
        self.intent(Intent::EditCode(code.into()))
    }

    pub fn request_rematch(&self) -> Result<(), ClientError> {
        self.intent(Intent::RequestRematch)
    }

    pub fn return_to_lobby(&self) -> Result<(), ClientError> {
        self.intent(Intent::ReturnToLobby)
    }

    pub fn intent(&self, intent: Intent) -> Result<(), ClientError> {
        self.commands_tx
            .send(Command::Intent(intent))
            .map_err(|_| ClientError::Closed)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ClientState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }

    /// Stop the dispatcher and close the connection. Resolves once the
    /// connection is released; later calls return `ClientError::Closed`.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands_tx
            .send(Command::Shutdown(ack_tx))
            .map_err(|_| ClientError::Closed)?;
        ack_rx.await.map_err(|_| ClientError::Closed)
    }
}

impl std::fmt::Debug for MatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state_rx.borrow();
        f.debug_struct("MatchClient")
            .field("connected", &state.connected)
            .field("phase", &state.phase())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Owns the state and applies events and intents to it. No I/O; the run
/// loop passes in the hook that puts outbound messages on the wire.
pub(crate) struct Dispatcher {
    state: ClientState,
}

impl Dispatcher {
    pub(crate) fn new(state: ClientState) -> Self {
        Dispatcher { state }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &ClientState {
        &self.state
    }

    pub(crate) fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { endpoint } => {
                info!("Connected to match server at {}", endpoint);
                self.update(reducer::on_connected);
            }
            ConnectionEvent::Disconnected => {
                info!("Disconnected from match server");
                self.update(reducer::on_disconnected);
            }
            // Frames that do not decode are dropped without a trace.
            ConnectionEvent::Message(text) => {
                if let Ok(event) = ServerEvent::decode(&text) {
                    debug!("Received {}", event.name());
                    self.update(|state| reducer::apply(state, event));
                }
            }
        }
    }

    /// Apply an intent and hand any outbound message to `send`. State that
    /// records a sent message is only committed once `send` accepts it.
    /// Intents that do not fit the current phase are dropped silently.
    pub(crate) fn on_intent(
        &mut self,
        intent: Intent,
        send: impl FnOnce(&ClientMessage) -> bool,
    ) {
        match intent {
            Intent::JoinQueue { name } => {
                if let Some(msg) = reducer::join_queue(&self.state, &name) {
                    send(&msg);
                }
            }
            Intent::Submit { code } => {
                if let Some(msg) = reducer::submit(&self.state, code.as_deref()) {
                    send(&msg);
                }
            }
            Intent::RequestRematch => {
                let (voted, vote) = reducer::request_rematch(self.state.clone());
                if let Some(msg) = vote {
                    if send(&msg) {
                        self.state = voted;
                    }
                }
            }
            Intent::EditCode(code) => self.update(|state| reducer::edit_code(state, code)),
            Intent::ReturnToLobby => self.update(reducer::return_to_lobby),
        }
    }

    fn update(&mut self, f: impl FnOnce(ClientState) -> ClientState) {
        let before = self.state.phase();
        self.state = f(mem::take(&mut self.state));
        let after = self.state.phase();
        if before != after {
            info!("Phase {} -> {}", before.as_str(), after.as_str());
        }
    }

    /// Publish the state if it differs from what subscribers last saw.
    pub(crate) fn publish(&self, state_tx: &watch::Sender<ClientState>) {
        state_tx.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Main dispatch loop
// ---------------------------------------------------------------------------

async fn run(
    mut dispatcher: Dispatcher,
    mut events_rx: mpsc::Receiver<ConnectionEvent>,
    mut commands_rx: mpsc::UnboundedReceiver<Command>,
    connection: ConnectionManager,
    state_tx: watch::Sender<ClientState>,
) {
    info!("Match client dispatcher started");

    // Once the transport task is gone, stop polling its channel so
    // tokio::select! never spins on a closed receiver.
    let mut events_open = true;
    let mut shutdown_ack = None;

    loop {
        tokio::select! {
            event = events_rx.recv(), if events_open => {
                match event {
                    Some(event) => dispatcher.on_connection_event(event),
                    None => {
                        info!("Transport stopped; no further connection events");
                        events_open = false;
                    }
                }
            }

            cmd = commands_rx.recv() => {
                match cmd {
                    Some(Command::Intent(intent)) => {
                        dispatcher.on_intent(intent, |msg| emit(&connection, msg));
                    }
                    Some(Command::Shutdown(ack)) => {
                        info!("Shutdown requested");
                        shutdown_ack = Some(ack);
                        break;
                    }
                    None => {
                        info!("All client handles dropped, shutting down");
                        break;
                    }
                }
            }
        }

        dispatcher.publish(&state_tx);
    }

    connection.teardown().await;
    dispatcher.on_connection_event(ConnectionEvent::Disconnected);
    dispatcher.publish(&state_tx);

    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
    info!("Match client dispatcher exiting");
}

/// Encode and queue one message. Returns whether the connection took it.
fn emit(connection: &ConnectionManager, msg: &ClientMessage) -> bool {
    match msg.encode() {
        Ok(text) => {
            let sent = connection.send(text);
            if sent {
                debug!("Sent {}", msg.name());
            } else {
                warn!("Could not send {}: connection unavailable", msg.name());
            }
            sent
        }
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_state::Phase;

    fn frame(json: &str) -> ConnectionEvent {
        ConnectionEvent::Message(json.to_string())
    }

    fn connected() -> Dispatcher {
        let mut d = Dispatcher::new(ClientState::default());
        d.on_connection_event(ConnectionEvent::Connected {
            endpoint: "ws://test".into(),
        });
        d
    }

    fn in_match() -> Dispatcher {
        let mut d = connected();
        d.on_connection_event(frame(r#"{"event":"session","data":{"userId":"u1"}}"#));
        d.on_connection_event(frame(
            r#"{"event":"match.start","data":{"matchId":"m1","problem":{"starter_code":{"python":"def f(): pass"}},"players":[],"remaining":300}}"#,
        ));
        d
    }

    #[test]
    fn decoded_frames_reach_the_reducer() {
        let d = in_match();
        assert_eq!(d.state().phase(), Phase::InMatch);
        assert_eq!(d.state().editor, "def f(): pass");
        assert_eq!(d.state().self_user_id(), Some("u1"));
    }

    #[test]
    fn undecodable_frames_leave_state_untouched() {
        let mut d = connected();
        let before = d.state().clone();
        d.on_connection_event(frame("garbage"));
        d.on_connection_event(frame(r#"{"event":"chat","data":{}}"#));
        d.on_connection_event(frame(r#"{"event":"timer.tick","data":{"remaining":"soon"}}"#));
        assert_eq!(d.state(), &before);
    }

    /// Run one intent with a send hook that accepts every message.
    fn sent(d: &mut Dispatcher, intent: Intent) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        d.on_intent(intent, |msg| {
            out.push(msg.clone());
            true
        });
        out
    }

    /// Run one intent with a send hook that rejects every message.
    fn rejected(d: &mut Dispatcher, intent: Intent) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        d.on_intent(intent, |msg| {
            out.push(msg.clone());
            false
        });
        out
    }

    #[test]
    fn join_queue_intent_emits_one_message() {
        let mut d = connected();
        assert_eq!(
            sent(&mut d, Intent::JoinQueue { name: "Ann".into() }),
            vec![ClientMessage::QueueJoin { name: "Ann".into() }]
        );
    }

    #[test]
    fn join_queue_while_disconnected_emits_nothing() {
        let mut d = Dispatcher::new(ClientState::default());
        assert!(sent(&mut d, Intent::JoinQueue { name: "Ann".into() }).is_empty());
    }

    #[test]
    fn edit_then_submit_sends_edited_buffer() {
        let mut d = in_match();
        assert!(sent(&mut d, Intent::EditCode("def f(): return 2".into())).is_empty());
        assert_eq!(
            sent(&mut d, Intent::Submit { code: None }),
            vec![ClientMessage::RoomSubmit {
                match_id: "m1".into(),
                code: "def f(): return 2".into(),
                lang: "python".into(),
            }]
        );
    }

    #[test]
    fn submit_after_match_over_is_guarded() {
        let mut d = in_match();
        d.on_connection_event(frame(r#"{"event":"match.over","data":{"winnerId":"u1"}}"#));
        assert!(sent(
            &mut d,
            Intent::Submit {
                code: Some("x".into())
            }
        )
        .is_empty());
        assert_eq!(
            sent(&mut d, Intent::RequestRematch),
            vec![ClientMessage::RematchRequest]
        );
        assert!(sent(&mut d, Intent::RequestRematch).is_empty());
        assert!(d.state().is_rematch_pending());
    }

    #[test]
    fn rejected_rematch_vote_can_be_retried() {
        let mut d = in_match();
        d.on_connection_event(frame(r#"{"event":"match.over","data":{"winnerId":"u1"}}"#));

        assert_eq!(
            rejected(&mut d, Intent::RequestRematch),
            vec![ClientMessage::RematchRequest]
        );
        assert!(!d.state().is_rematch_pending());
        assert!(d.state().can_request_rematch());

        assert_eq!(
            sent(&mut d, Intent::RequestRematch),
            vec![ClientMessage::RematchRequest]
        );
        assert!(d.state().is_rematch_pending());
    }

    #[test]
    fn return_to_lobby_intent_changes_phase() {
        let mut d = in_match();
        d.on_connection_event(frame(r#"{"event":"match.over","data":{}}"#));
        assert!(sent(&mut d, Intent::ReturnToLobby).is_empty());
        assert_eq!(d.state().phase(), Phase::Lobby);
    }

    #[test]
    fn disconnect_event_resets_to_lobby() {
        let mut d = in_match();
        d.on_connection_event(ConnectionEvent::Disconnected);
        assert!(!d.state().connected);
        assert_eq!(d.state().phase(), Phase::Lobby);
        assert!(d.state().session.is_none());
    }

    #[test]
    fn publish_only_notifies_on_change() {
        let d = connected();
        let (tx, mut rx) = watch::channel(ClientState::default());
        rx.mark_unchanged();

        d.publish(&tx);
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        d.publish(&tx);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn client_error_message() {
        assert_eq!(ClientError::Closed.to_string(), "match client is no longer running");
    }
}
