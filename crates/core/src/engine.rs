//! Speech capability contracts.
//!
//! Recognition and synthesis are black boxes to the runtime: platform
//! engines (a browser speech API, an on-device model, a realtime
//! provider) implement these traits and report progress through event
//! channels. A [`VoiceSession`](crate::voice::VoiceSession) owns one
//! instance of each and is their only caller; nothing else in the
//! application touches an engine directly.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Progress reported by an active recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// The transcript so far. Both interim hypotheses and engine-confirmed
    /// text carry the full text of the attempt, so the latest event always
    /// supersedes earlier ones.
    Result { text: String, is_final: bool },
    /// The engine finished the attempt (end of utterance or stop).
    Ended,
    /// The engine failed; the attempt is over.
    Error(String),
}

/// Completion signal from a synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizerEvent {
    /// Playback finished normally.
    Finished,
    /// Synthesis or playback failed.
    Error(String),
}

/// A speech-to-text capability running one recognition attempt at a time.
///
/// `start` hands the engine a fresh event channel for the attempt; the
/// engine must stop emitting on it after `Ended`, `Error`, or `stop`.
/// Dropping the channel without a terminal event is treated as an end of
/// utterance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechRecognizer: Send {
    /// Begins a recognition attempt.
    async fn start(&mut self, events: mpsc::Sender<RecognizerEvent>) -> Result<()>;

    /// Stops the active attempt, if any. Idempotent.
    async fn stop(&mut self);
}

/// A text-to-speech capability playing one utterance at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send {
    /// Starts synthesizing `text`, reporting completion on `events`.
    async fn speak(&mut self, text: &str, events: mpsc::Sender<SynthesizerEvent>) -> Result<()>;

    /// Cancels anything queued or playing. Idempotent.
    async fn cancel(&mut self);
}
