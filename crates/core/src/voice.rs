//! Voice capture and playback state machine.
//!
//! A `VoiceSession` coordinates one speech recognizer and one speech
//! synthesizer behind a single actor task. Every command, engine event
//! and timer expiry flows through that task's event loop, so transitions
//! are strictly sequential and every timer is an owned value cleared on
//! each exit path.

use crate::engine::{RecognizerEvent, SpeechRecognizer, SpeechSynthesizer, SynthesizerEvent};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Inactivity window applied to a listening attempt unless overridden.
pub const DEFAULT_LISTEN_WINDOW: Duration = Duration::from_secs(10);

/// Externally visible state of a voice surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    /// Nothing is capturing or playing.
    Idle,
    /// A recognition attempt is running.
    Listening,
    /// A transcript was produced and awaits the caller's next move.
    Processing,
    /// A synthesized utterance is playing.
    Speaking,
}

/// Tunables for a voice session.
///
/// Constructed explicitly by the embedder; there is deliberately no
/// `Default` so the wake-mode cooldown is always a stated policy rather
/// than an inferred one.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// How long a listening attempt waits for the first speech before
    /// giving up. Once the user has spoken the window no longer applies.
    pub listen_window: Duration,
    /// Pause between an attempt ending and wake mode re-arming the next.
    pub wake_cooldown: Duration,
    /// Whether `speak` synthesizes at all.
    pub auto_play: bool,
    /// Whether wake mode starts enabled.
    pub wake_mode: bool,
}

enum Command {
    StartListening,
    StopListening,
    Speak(String),
    SetWakeMode(bool),
    SetAutoPlay(bool),
}

/// Handle to a voice session actor.
///
/// Entry points never fail outward: engine errors become state
/// transitions, and on a platform without speech support every call is a
/// silent no-op (see [`is_supported`](Self::is_supported)).
#[derive(Clone)]
pub struct VoiceSession {
    commands: Option<mpsc::Sender<Command>>,
    state_rx: watch::Receiver<VoiceState>,
    transcript_rx: watch::Receiver<String>,
}

impl VoiceSession {
    /// Spawns a session actor over the given engine pair.
    ///
    /// Returns the handle plus the stream of completed utterances: each
    /// non-empty transcript whose attempt ended normally is delivered
    /// there exactly once.
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        config: VoiceConfig,
    ) -> (Self, mpsc::Receiver<String>) {
        let (commands, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(VoiceState::Idle);
        let (transcript_tx, transcript_rx) = watch::channel(String::new());
        let (utterance_tx, utterance_rx) = mpsc::channel(16);
        let session = Session {
            recognizer,
            synthesizer,
            wake_mode: config.wake_mode,
            auto_play: config.auto_play,
            config,
            commands: command_rx,
            state_tx,
            transcript_tx,
            utterances: utterance_tx,
            state: VoiceState::Idle,
            transcript: String::new(),
            has_spoken: false,
            window_deadline: None,
            wake_rearm_at: None,
            rec_events: None,
            synth_events: None,
        };
        tokio::spawn(session.run());
        (
            Self {
                commands: Some(commands),
                state_rx,
                transcript_rx,
            },
            utterance_rx,
        )
    }

    /// A session for platforms without speech support: every entry point
    /// is a no-op and the state never leaves `Idle`.
    pub fn unsupported() -> (Self, mpsc::Receiver<String>) {
        let (_, state_rx) = watch::channel(VoiceState::Idle);
        let (_, transcript_rx) = watch::channel(String::new());
        let (_, utterance_rx) = mpsc::channel(1);
        (
            Self {
                commands: None,
                state_rx,
                transcript_rx,
            },
            utterance_rx,
        )
    }

    /// Whether the platform supports voice at all. Detected once at
    /// initialization; stable for the session's lifetime.
    pub fn is_supported(&self) -> bool {
        self.commands.is_some()
    }

    /// Begins a listening attempt. A no-op while already listening.
    pub fn start_listening(&self) {
        self.send(Command::StartListening);
    }

    /// Ends the current attempt, if any. Safe to call from any state;
    /// unconditionally cancels the inactivity countdown.
    pub fn stop_listening(&self) {
        self.send(Command::StopListening);
    }

    /// Speaks `text`, superseding anything queued or playing. A no-op
    /// when auto-play is disabled.
    pub fn speak(&self, text: impl Into<String>) {
        self.send(Command::Speak(text.into()));
    }

    /// Enables or disables continuous re-arming of listening.
    pub fn set_wake_mode(&self, enabled: bool) {
        self.send(Command::SetWakeMode(enabled));
    }

    /// Enables or disables spoken playback of `speak` calls.
    pub fn set_auto_play(&self, enabled: bool) {
        self.send(Command::SetAutoPlay(enabled));
    }

    /// Read-only view of the session state.
    pub fn state(&self) -> watch::Receiver<VoiceState> {
        self.state_rx.clone()
    }

    /// Read-only view of the live transcript of the current attempt.
    pub fn transcript(&self) -> watch::Receiver<String> {
        self.transcript_rx.clone()
    }

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            let _ = commands.try_send(command);
        }
    }
}

struct Session {
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    config: VoiceConfig,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<VoiceState>,
    transcript_tx: watch::Sender<String>,
    utterances: mpsc::Sender<String>,
    state: VoiceState,
    transcript: String,
    wake_mode: bool,
    auto_play: bool,
    has_spoken: bool,
    /// Inactivity countdown for the current attempt; `None` once the user
    /// has spoken or no attempt is running.
    window_deadline: Option<Instant>,
    /// When wake mode should re-arm listening; `None` when nothing is
    /// scheduled.
    wake_rearm_at: Option<Instant>,
    rec_events: Option<mpsc::Receiver<RecognizerEvent>>,
    synth_events: Option<mpsc::Receiver<SynthesizerEvent>>,
}

impl Session {
    async fn run(mut self) {
        loop {
            let far = Instant::now() + Duration::from_secs(86_400);
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Handle dropped: tear down engines and timers.
                    None => break,
                },
                event = recv_opt(&mut self.rec_events), if self.rec_events.is_some() => {
                    match event {
                        Some(event) => self.on_recognizer_event(event).await,
                        // Engine endpoint dropped without a terminal event.
                        None => self.on_recognizer_gone().await,
                    }
                }
                event = recv_opt(&mut self.synth_events), if self.synth_events.is_some() => {
                    match event {
                        Some(event) => self.on_synthesizer_event(event),
                        None => self.on_synthesizer_event(SynthesizerEvent::Finished),
                    }
                }
                () = time::sleep_until(self.window_deadline.unwrap_or(far)),
                    if self.window_deadline.is_some() =>
                {
                    self.on_window_elapsed().await;
                }
                () = time::sleep_until(self.wake_rearm_at.unwrap_or(far)),
                    if self.wake_rearm_at.is_some() =>
                {
                    self.on_wake_rearm().await;
                }
            }
        }
        if self.state == VoiceState::Listening {
            self.recognizer.stop().await;
        }
        self.synthesizer.cancel().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartListening => self.start_listening().await,
            Command::StopListening => self.stop_listening().await,
            Command::Speak(text) => self.speak(text).await,
            Command::SetWakeMode(enabled) => {
                self.wake_mode = enabled;
                if !enabled {
                    self.wake_rearm_at = None;
                }
            }
            Command::SetAutoPlay(enabled) => self.auto_play = enabled,
        }
    }

    async fn start_listening(&mut self) {
        if self.state == VoiceState::Listening {
            return;
        }
        if self.state == VoiceState::Speaking {
            self.synthesizer.cancel().await;
            self.synth_events = None;
        }
        self.wake_rearm_at = None;
        self.has_spoken = false;
        self.set_transcript(String::new());
        let (events_tx, events_rx) = mpsc::channel(16);
        match self.recognizer.start(events_tx).await {
            Ok(()) => {
                self.rec_events = Some(events_rx);
                self.window_deadline = Some(Instant::now() + self.config.listen_window);
                self.set_state(VoiceState::Listening);
            }
            Err(error) => {
                warn!(%error, "recognizer failed to start");
                self.enter_idle();
            }
        }
    }

    async fn stop_listening(&mut self) {
        self.window_deadline = None;
        if self.state != VoiceState::Listening {
            return;
        }
        self.recognizer.stop().await;
        self.conclude_attempt();
    }

    async fn speak(&mut self, text: String) {
        if !self.auto_play {
            return;
        }
        if self.state == VoiceState::Listening {
            // Engines cannot run capture and playback at the same time.
            self.recognizer.stop().await;
            self.rec_events = None;
            self.window_deadline = None;
        }
        // Platform synthesizers queue utterances globally; always flush
        // before starting the new one.
        self.synthesizer.cancel().await;
        self.synth_events = None;
        self.wake_rearm_at = None;
        let (events_tx, events_rx) = mpsc::channel(4);
        match self.synthesizer.speak(&text, events_tx).await {
            Ok(()) => {
                self.synth_events = Some(events_rx);
                self.set_state(VoiceState::Speaking);
            }
            Err(error) => {
                warn!(%error, "synthesis failed to start");
                self.enter_idle();
            }
        }
    }

    async fn on_recognizer_event(&mut self, event: RecognizerEvent) {
        if self.state != VoiceState::Listening {
            // A stale event from an attempt that was already stopped.
            return;
        }
        match event {
            RecognizerEvent::Result { text, is_final } => {
                if !self.has_spoken && !text.trim().is_empty() {
                    // First speech: the user gets unlimited time from here.
                    self.has_spoken = true;
                    self.window_deadline = None;
                }
                debug!(is_final, "transcript updated");
                self.set_transcript(text);
            }
            RecognizerEvent::Ended => self.conclude_attempt(),
            RecognizerEvent::Error(message) => {
                warn!(%message, "recognition error");
                self.recognizer.stop().await;
                self.rec_events = None;
                self.window_deadline = None;
                self.set_transcript(String::new());
                self.enter_idle();
            }
        }
    }

    async fn on_recognizer_gone(&mut self) {
        self.rec_events = None;
        if self.state == VoiceState::Listening {
            self.conclude_attempt();
        }
    }

    fn on_synthesizer_event(&mut self, event: SynthesizerEvent) {
        if self.state != VoiceState::Speaking {
            return;
        }
        if let SynthesizerEvent::Error(message) = &event {
            warn!(%message, "synthesis error");
        }
        self.synth_events = None;
        self.enter_idle();
    }

    async fn on_window_elapsed(&mut self) {
        self.window_deadline = None;
        if self.state != VoiceState::Listening || self.has_spoken {
            return;
        }
        // No speech inside the window: this is a cancellation, not a
        // completed utterance, so the transcript is cleared.
        info!("listening window elapsed without speech");
        self.recognizer.stop().await;
        self.rec_events = None;
        self.set_transcript(String::new());
        self.enter_idle();
    }

    async fn on_wake_rearm(&mut self) {
        self.wake_rearm_at = None;
        if self.wake_mode && self.state == VoiceState::Idle {
            debug!("wake mode re-arming listening");
            self.start_listening().await;
        }
    }

    /// Wraps up a listening attempt whose transcript is final: non-empty
    /// transcripts move to `Processing` and are delivered to the
    /// embedder, empty ones drop straight back to `Idle`.
    fn conclude_attempt(&mut self) {
        self.window_deadline = None;
        self.rec_events = None;
        if self.transcript.is_empty() {
            self.enter_idle();
        } else {
            self.set_state(VoiceState::Processing);
            if self.utterances.try_send(self.transcript.clone()).is_err() {
                warn!("utterance dropped, consumer is not keeping up");
            }
        }
    }

    fn enter_idle(&mut self) {
        self.set_state(VoiceState::Idle);
        if self.wake_mode {
            self.wake_rearm_at = Some(Instant::now() + self.config.wake_cooldown);
        }
    }

    fn set_state(&mut self, next: VoiceState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "voice state change");
        }
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    fn set_transcript(&mut self, text: String) {
        self.transcript = text;
        let _ = self.transcript_tx.send(self.transcript.clone());
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockSpeechRecognizer, MockSpeechSynthesizer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Harness {
        session: VoiceSession,
        utterances: mpsc::Receiver<String>,
        starts: Arc<Mutex<Vec<mpsc::Sender<RecognizerEvent>>>>,
        stops: Arc<AtomicUsize>,
        speaks: Arc<Mutex<Vec<(String, mpsc::Sender<SynthesizerEvent>)>>>,
        cancels: Arc<AtomicUsize>,
    }

    impl Harness {
        fn recognizer_events(&self) -> mpsc::Sender<RecognizerEvent> {
            self.starts.lock().unwrap().last().expect("no attempt started").clone()
        }

        fn start_count(&self) -> usize {
            self.starts.lock().unwrap().len()
        }

        fn spoken(&self) -> Vec<String> {
            self.speaks.lock().unwrap().iter().map(|(text, _)| text.clone()).collect()
        }

        fn synthesizer_events(&self) -> mpsc::Sender<SynthesizerEvent> {
            self.speaks.lock().unwrap().last().expect("nothing spoken").1.clone()
        }
    }

    fn harness(config: VoiceConfig) -> Harness {
        let starts: Arc<Mutex<Vec<mpsc::Sender<RecognizerEvent>>>> = Arc::default();
        let stops = Arc::new(AtomicUsize::new(0));
        let speaks: Arc<Mutex<Vec<(String, mpsc::Sender<SynthesizerEvent>)>>> = Arc::default();
        let cancels = Arc::new(AtomicUsize::new(0));

        let mut recognizer = MockSpeechRecognizer::new();
        let captured = Arc::clone(&starts);
        recognizer.expect_start().returning(move |events| {
            captured.lock().unwrap().push(events);
            Ok(())
        });
        let counted = Arc::clone(&stops);
        recognizer.expect_stop().returning(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let mut synthesizer = MockSpeechSynthesizer::new();
        let captured = Arc::clone(&speaks);
        synthesizer.expect_speak().returning(move |text, events| {
            captured.lock().unwrap().push((text.to_string(), events));
            Ok(())
        });
        let counted = Arc::clone(&cancels);
        synthesizer.expect_cancel().returning(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let (session, utterances) =
            VoiceSession::new(Box::new(recognizer), Box::new(synthesizer), config);
        Harness {
            session,
            utterances,
            starts,
            stops,
            speaks,
            cancels,
        }
    }

    fn config() -> VoiceConfig {
        VoiceConfig {
            listen_window: DEFAULT_LISTEN_WINDOW,
            wake_cooldown: Duration::from_millis(300),
            auto_play: true,
            wake_mode: false,
        }
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    async fn wait_for_state(session: &VoiceSession, expected: VoiceState) {
        let mut state = session.state();
        time::timeout(Duration::from_secs(120), state.wait_for(|s| *s == expected))
            .await
            .expect("state never reached")
            .expect("session gone");
    }

    #[tokio::test(start_paused = true)]
    async fn start_listening_begins_an_attempt() {
        let h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        assert_eq!(h.start_count(), 1);
        assert_eq!(*h.session.transcript().borrow(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn start_listening_is_idempotent_while_listening() {
        let h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;
        h.session.start_listening();
        settle().await;

        assert_eq!(h.start_count(), 1);
        assert_eq!(*h.session.state().borrow(), VoiceState::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_with_empty_transcript() {
        let mut h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        time::sleep(DEFAULT_LISTEN_WINDOW + Duration::from_millis(10)).await;
        settle().await;

        assert_eq!(*h.session.state().borrow(), VoiceState::Idle);
        assert_eq!(*h.session.transcript().borrow(), "");
        assert!(h.stops.load(Ordering::SeqCst) >= 1);
        assert!(h.utterances.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn first_speech_cancels_the_countdown() {
        let mut h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        h.recognizer_events()
            .send(RecognizerEvent::Result {
                text: "hello there".into(),
                is_final: false,
            })
            .await
            .unwrap();
        settle().await;

        // Far past the window: listening continues until the engine ends.
        time::sleep(DEFAULT_LISTEN_WINDOW * 6).await;
        assert_eq!(*h.session.state().borrow(), VoiceState::Listening);

        h.recognizer_events()
            .send(RecognizerEvent::Ended)
            .await
            .unwrap();
        wait_for_state(&h.session, VoiceState::Processing).await;

        assert_eq!(h.utterances.recv().await.unwrap(), "hello there");
    }

    #[tokio::test(start_paused = true)]
    async fn ended_attempt_without_speech_returns_to_idle() {
        let mut h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        h.recognizer_events()
            .send(RecognizerEvent::Ended)
            .await
            .unwrap();
        wait_for_state(&h.session, VoiceState::Idle).await;

        assert!(h.utterances.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_mode_rearms_after_the_cooldown() {
        let mut wake = config();
        wake.wake_mode = true;
        let h = harness(wake);

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        time::sleep(DEFAULT_LISTEN_WINDOW + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(h.start_count(), 1);

        // Still idle halfway through the cooldown.
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*h.session.state().borrow(), VoiceState::Idle);

        time::sleep(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(h.start_count(), 2);
        assert_eq!(*h.session.state().borrow(), VoiceState::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_is_a_noop_when_auto_play_is_disabled() {
        let mut muted = config();
        muted.auto_play = false;
        let h = harness(muted);

        h.session.speak("quiet please");
        settle().await;

        assert_eq!(*h.session.state().borrow(), VoiceState::Idle);
        assert!(h.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn speak_stops_recognition_first() {
        let h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        h.session.speak("a reply");
        wait_for_state(&h.session, VoiceState::Speaking).await;

        assert!(h.stops.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.spoken(), vec!["a reply".to_string()]);

        h.synthesizer_events()
            .send(SynthesizerEvent::Finished)
            .await
            .unwrap();
        wait_for_state(&h.session, VoiceState::Idle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn speak_supersedes_the_current_utterance() {
        let h = harness(config());

        h.session.speak("first");
        wait_for_state(&h.session, VoiceState::Speaking).await;
        let cancels_before = h.cancels.load(Ordering::SeqCst);

        h.session.speak("second");
        settle().await;

        assert!(h.cancels.load(Ordering::SeqCst) > cancels_before);
        assert_eq!(h.spoken(), vec!["first".to_string(), "second".to_string()]);

        h.synthesizer_events()
            .send(SynthesizerEvent::Finished)
            .await
            .unwrap();
        wait_for_state(&h.session, VoiceState::Idle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn recognition_errors_return_to_idle() {
        let h = harness(config());

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;

        h.recognizer_events()
            .send(RecognizerEvent::Error("microphone lost".into()))
            .await
            .unwrap();
        wait_for_state(&h.session, VoiceState::Idle).await;

        assert_eq!(*h.session.transcript().borrow(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_listening_is_idempotent_from_any_state() {
        let mut h = harness(config());

        // From idle: nothing to do, nothing breaks.
        h.session.stop_listening();
        settle().await;
        assert_eq!(*h.session.state().borrow(), VoiceState::Idle);

        h.session.start_listening();
        wait_for_state(&h.session, VoiceState::Listening).await;
        h.recognizer_events()
            .send(RecognizerEvent::Result {
                text: "partial thought".into(),
                is_final: false,
            })
            .await
            .unwrap();
        settle().await;

        // Manual stop carries the transcript like an engine-signalled end.
        h.session.stop_listening();
        wait_for_state(&h.session, VoiceState::Processing).await;
        assert_eq!(h.utterances.recv().await.unwrap(), "partial thought");

        h.session.stop_listening();
        settle().await;
        assert_eq!(*h.session.state().borrow(), VoiceState::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_platform_noops_everywhere() {
        let (session, mut utterances) = VoiceSession::unsupported();

        assert!(!session.is_supported());
        session.start_listening();
        session.speak("nothing happens");
        session.stop_listening();

        assert_eq!(*session.state().borrow(), VoiceState::Idle);
        assert!(utterances.try_recv().is_err());
    }
}
