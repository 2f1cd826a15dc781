//! Transcript source and permission boundaries
//!
//! The engine never talks to a speech recognizer directly. A host adapts its
//! recognizer to [`TranscriptSource`] and forwards the recognizer's callbacks
//! as [`SourceEvent`] values.

use std::fmt;
use std::future::Future;

/// One chunk of recognized speech
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// Recognizer confidence (0.0-1.0)
    pub confidence: f64,
    pub is_final: bool,
    /// Monotonic within a recognition session
    pub sequence_index: u64,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, confidence: f64, sequence_index: u64) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            sequence_index,
        }
    }

    pub fn interim(mut self) -> Self {
        self.is_final = false;
        self
    }
}

/// Error classes reported by a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceErrorKind {
    NotAllowed,
    ServiceNotAllowed,
    NoSpeech,
    Network,
    Aborted,
    AudioCapture,
    Other(String),
}

impl SourceErrorKind {
    /// Parse a recognizer error code such as `"no-speech"` or `"not-allowed"`
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" => SourceErrorKind::NotAllowed,
            "service-not-allowed" => SourceErrorKind::ServiceNotAllowed,
            "no-speech" => SourceErrorKind::NoSpeech,
            "network" => SourceErrorKind::Network,
            "aborted" => SourceErrorKind::Aborted,
            "audio-capture" => SourceErrorKind::AudioCapture,
            other => SourceErrorKind::Other(other.to_string()),
        }
    }

    /// Permission failures end detection; everything else is a transient session end
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            SourceErrorKind::NotAllowed | SourceErrorKind::ServiceNotAllowed
        )
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErrorKind::NotAllowed => write!(f, "not-allowed"),
            SourceErrorKind::ServiceNotAllowed => write!(f, "service-not-allowed"),
            SourceErrorKind::NoSpeech => write!(f, "no-speech"),
            SourceErrorKind::Network => write!(f, "network"),
            SourceErrorKind::Aborted => write!(f, "aborted"),
            SourceErrorKind::AudioCapture => write!(f, "audio-capture"),
            SourceErrorKind::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Callbacks from the transcript source, delivered in order
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    SessionStarted,
    SessionEnded,
    Transcript(TranscriptEvent),
    Error(SourceErrorKind),
}

/// Failure to start a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The recognizer does not exist on this host
    Unavailable(String),
    /// A session could not be started right now (e.g. already running)
    StartFailed(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "unavailable: {}", msg),
            SourceError::StartFailed(msg) => write!(f, "start failed: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Restartable continuous speech recognizer
pub trait TranscriptSource: Send {
    fn start(&mut self) -> Result<(), SourceError>;
    fn stop(&mut self);
}

/// Microphone permission request
pub trait AudioPermission: Send {
    /// Resolves `Err(reason)` when access is refused
    fn request(&mut self) -> impl Future<Output = Result<(), String>> + Send;
}

/// Permission that is always granted, for hosts without a permission model
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl AudioPermission for AlwaysGranted {
    async fn request(&mut self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SourceErrorKind::from_code("no-speech"), SourceErrorKind::NoSpeech);
        assert!(SourceErrorKind::from_code("not-allowed").is_permission());
        assert!(SourceErrorKind::from_code("service-not-allowed").is_permission());
        assert!(!SourceErrorKind::from_code("network").is_permission());
        assert!(!SourceErrorKind::from_code("bad-grammar").is_permission());
        assert_eq!(
            SourceErrorKind::from_code("bad-grammar").to_string(),
            "bad-grammar"
        );
    }

    #[test]
    fn test_transcript_event_builder() {
        let event = TranscriptEvent::new("hey jarvis", 0.9, 3).interim();
        assert!(!event.is_final);
        assert_eq!(event.sequence_index, 3);
    }
}
