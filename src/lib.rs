//! Wake word detection for continuous speech transcripts.
//!
//! A [`WakeWordEngine`] evaluates transcript chunks from a restartable
//! recognizer against configured wake phrases (exact, substring or fuzzy
//! match), gates them on confidence and enforces a cooldown after every
//! activation. Hosts own the engine, feed it [`SourceEvent`]s and drive its
//! timers, usually through [`session::run_engine`].

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod level;
pub mod session;
pub mod source;
pub mod wake;

pub use config::{ConfigPatch, EngineConfig, MemoryStore, Settings, SettingsStore, TomlFileStore};
pub use engine::{ActivationEvent, EngineNotice, EngineState, WakeWordEngine};
pub use error::EngineError;
pub use source::{
    AlwaysGranted, AudioPermission, SourceError, SourceErrorKind, SourceEvent, TranscriptEvent,
    TranscriptSource,
};
pub use wake::{MatchKind, WakePhrase, WakePhrases};
