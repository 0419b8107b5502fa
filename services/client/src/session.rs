//! The client session runtime.
//!
//! Composes the three resilience components into one running session:
//! typed input and completed voice utterances go out over the gateway,
//! assistant replies come back through the inbound watch and are read
//! aloud, and editor snapshots are funneled through the suggestions
//! coordinator. The runtime is the only writer to each component; the
//! UI observes their published state and feeds [`UiEvent`]s in.

use crate::{
    api::{SessionSummary, Suggestion},
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use anyhow::Result;
use duet_core::{
    coordinator::RequestCoordinator,
    voice::{VoiceSession, VoiceState},
};
use duet_gateway::{ConnectionManager, ConnectionState};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Input events the embedding UI feeds into the runtime.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// The user submitted a typed chat message.
    ChatInput(String),
    /// The editor contents changed (pair-programming surface).
    EditorChanged { code: String, language: String },
    /// The user explicitly asked for suggestions right now.
    SuggestionsRequested { code: String, language: String },
    /// The user opened the session list.
    SessionListOpened,
    /// The user pressed the microphone button.
    MicPressed,
    /// The user toggled spoken playback of assistant replies.
    AutoPlayToggled(bool),
    /// The user toggled wake mode.
    WakeModeToggled(bool),
}

/// One running assistant session.
pub struct SessionRuntime {
    state: AppState,
    gateway: ConnectionManager,
    voice: VoiceSession,
    utterances: mpsc::Receiver<String>,
    ui_events: mpsc::Receiver<UiEvent>,
    suggestions: RequestCoordinator<Result<Vec<Suggestion>>>,
    sessions: RequestCoordinator<Result<Vec<SessionSummary>>>,
    session_id: Option<Uuid>,
}

impl SessionRuntime {
    /// Wires a runtime over an already-constructed gateway and voice
    /// session. Returns the runtime plus the UI's event sender.
    pub fn new(
        state: AppState,
        gateway: ConnectionManager,
        voice: VoiceSession,
        utterances: mpsc::Receiver<String>,
    ) -> (Self, mpsc::Sender<UiEvent>) {
        let suggestions = RequestCoordinator::new(state.config.suggest_debounce);
        // The session list is only fetched on explicit opens; it shares
        // the supersession discipline, not the debounce.
        let sessions = RequestCoordinator::new(state.config.suggest_debounce);
        let (ui_tx, ui_events) = mpsc::channel(32);
        (
            Self {
                state,
                gateway,
                voice,
                utterances,
                ui_events,
                suggestions,
                sessions,
                session_id: None,
            },
            ui_tx,
        )
    }

    /// Resumes an existing session on connect instead of starting a new
    /// one.
    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Latest non-superseded suggestions resolution.
    pub fn suggestions(&self) -> watch::Receiver<Option<Result<Vec<Suggestion>>>> {
        self.suggestions.results()
    }

    /// Latest non-superseded session list resolution.
    pub fn sessions(&self) -> watch::Receiver<Option<Result<Vec<SessionSummary>>>> {
        self.sessions.results()
    }

    /// Runs the session until `cancel` fires or every input side closes.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut inbound = self.gateway.messages();
        let mut connection = self.gateway.state();
        self.gateway.connect();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("session runtime shutting down");
                    self.voice.stop_listening();
                    self.gateway.disconnect();
                    break;
                }
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connection.borrow_and_update();
                    self.on_connection_change(state).await;
                }
                changed = inbound.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = inbound.borrow_and_update().clone();
                    if let Some(message) = latest {
                        if let Some(decoded) = ServerMessage::decode(&message) {
                            self.on_server_message(decoded);
                        }
                    }
                }
                Some(utterance) = self.utterances.recv() => {
                    self.send_user_message(utterance).await;
                }
                event = self.ui_events.recv() => match event {
                    Some(event) => self.on_ui_event(event).await,
                    None => break,
                },
            }
        }
        Ok(())
    }

    async fn on_connection_change(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                info!("gateway connected, initializing session");
                let init = ClientMessage::Init {
                    session_id: self.session_id,
                };
                if let Err(error) = self.gateway.send(&init).await {
                    warn!(%error, "failed to send session init");
                }
            }
            ConnectionState::Error => {
                warn!("gateway gave up reconnecting; waiting for a manual reconnect");
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }
    }

    fn on_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Initialized { session_id } => {
                self.session_id = Some(session_id);
                info!(%session_id, "session initialized");
            }
            ServerMessage::AssistantMessage { text } => {
                // A no-op when auto-play is off or the platform has no
                // synthesis support.
                self.voice.speak(text);
            }
            ServerMessage::Error { message } => {
                warn!(%message, "server reported an error");
            }
        }
    }

    async fn on_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::ChatInput(text) => self.send_user_message(text).await,
            UiEvent::EditorChanged { code, language } => {
                let api = self.state.api.clone();
                self.suggestions
                    .submit(async move { api.fetch_suggestions(&code, &language).await });
            }
            UiEvent::SuggestionsRequested { code, language } => {
                let api = self.state.api.clone();
                self.suggestions
                    .submit_now(async move { api.fetch_suggestions(&code, &language).await });
            }
            UiEvent::SessionListOpened => {
                let api = self.state.api.clone();
                self.sessions.submit_now(async move { api.list_sessions().await });
            }
            UiEvent::MicPressed => {
                if !self.voice.is_supported() {
                    warn!("voice input is not available on this platform");
                } else if *self.voice.state().borrow() == VoiceState::Listening {
                    self.voice.stop_listening();
                } else {
                    self.voice.start_listening();
                }
            }
            UiEvent::AutoPlayToggled(enabled) => {
                self.voice.set_auto_play(enabled);
                // The backend skips voice processing for muted clients.
                let notice = ClientMessage::SetVoiceEnabled { enabled };
                if let Err(error) = self.gateway.send(&notice).await {
                    warn!(%error, "voice preference not sent");
                }
                self.persist(|settings| settings.auto_play = enabled).await;
            }
            UiEvent::WakeModeToggled(enabled) => {
                self.voice.set_wake_mode(enabled);
                self.persist(|settings| settings.wake_mode = enabled).await;
            }
        }
    }

    async fn send_user_message(&mut self, text: String) {
        let message = ClientMessage::UserMessage { text };
        if let Err(error) = self.gateway.send(&message).await {
            // Nothing is buffered across disconnects: the UI keeps the
            // draft and retries once the state shows connected again.
            warn!(%error, "chat message not sent");
        }
    }

    async fn persist(&self, update: impl FnOnce(&mut crate::settings::VoiceSettings)) {
        let mut settings = self.state.settings.lock().await;
        if let Err(error) = settings.update(update) {
            warn!(%error, "failed to persist voice settings");
        }
    }
}
