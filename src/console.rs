//! Console transcript source - stdin lines stand in for a speech recognizer
//!
//! Line formats:
//! - `hey jarvis` - transcript with confidence 1.0
//! - `0.65|hey jarvis` - transcript with explicit confidence
//! - `!no-speech` - recognizer error, ends the current session

use crate::session::EngineCommand;
use crate::source::{SourceError, SourceErrorKind, SourceEvent, TranscriptEvent, TranscriptSource};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;

/// Parsed stdin line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Transcript { text: String, confidence: f64 },
    Error(SourceErrorKind),
}

/// Parse one input line, returns None for blank lines
pub fn parse_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(code) = line.strip_prefix('!') {
        return Some(ConsoleInput::Error(SourceErrorKind::from_code(code.trim())));
    }
    if let Some((conf, text)) = line.split_once('|') {
        if let Ok(confidence) = conf.trim().parse::<f64>() {
            return Some(ConsoleInput::Transcript {
                text: text.trim().to_string(),
                confidence: confidence.clamp(0.0, 1.0),
            });
        }
    }
    Some(ConsoleInput::Transcript {
        text: line.to_string(),
        confidence: 1.0,
    })
}

/// Recognizer stand-in; lines typed while no session is live are discarded
pub struct ConsoleSource {
    live: Arc<AtomicBool>,
    events: flume::Sender<SourceEvent>,
}

impl ConsoleSource {
    pub fn new(events: flume::Sender<SourceEvent>) -> Self {
        Self {
            live: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Spawn the stdin reader. Sends `Shutdown` on end of input.
    pub fn spawn_reader(&self, commands: flume::Sender<EngineCommand>) -> thread::JoinHandle<()> {
        let live = Arc::clone(&self.live);
        let events = self.events.clone();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut sequence = 0u64;
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let Some(input) = parse_line(&line) else {
                    continue;
                };
                if !live.load(Ordering::SeqCst) {
                    debug!("Not listening, ignoring input {:?}", line);
                    continue;
                }
                let sent = match input {
                    ConsoleInput::Transcript { text, confidence } => {
                        let event = TranscriptEvent::new(text, confidence, sequence);
                        sequence += 1;
                        events.send(SourceEvent::Transcript(event))
                    }
                    ConsoleInput::Error(kind) => {
                        live.store(false, Ordering::SeqCst);
                        events
                            .send(SourceEvent::Error(kind))
                            .and_then(|_| events.send(SourceEvent::SessionEnded))
                    }
                };
                if sent.is_err() {
                    break;
                }
            }
            let _ = commands.send(EngineCommand::Shutdown);
        })
    }
}

impl TranscriptSource for ConsoleSource {
    fn start(&mut self) -> Result<(), SourceError> {
        if self.live.swap(true, Ordering::SeqCst) {
            return Err(SourceError::StartFailed("session already running".to_string()));
        }
        let _ = self.events.send(SourceEvent::SessionStarted);
        Ok(())
    }

    fn stop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SourceEvent::SessionEnded);
        }
    }
}
