//! Driver loop: cooldown and restart timers fire from the tokio clock

use jarvis_wake::session::{EngineCommand, run_engine};
use jarvis_wake::{
    AlwaysGranted, ConfigPatch, EngineState, MemoryStore, SourceError, SourceErrorKind,
    SourceEvent, TranscriptEvent, TranscriptSource, WakeWordEngine,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Default)]
struct CountingSource {
    starts: Arc<AtomicUsize>,
}

impl TranscriptSource for CountingSource {
    fn start(&mut self) -> Result<(), SourceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {}
}

fn said(text: &str, seq: u64) -> SourceEvent {
    SourceEvent::Transcript(TranscriptEvent::new(text, 0.95, seq))
}

#[tokio::test(start_paused = true)]
async fn cooldown_restarts_listening() {
    let source = CountingSource::default();
    let starts = Arc::clone(&source.starts);
    let mut engine = WakeWordEngine::new(source, AlwaysGranted, MemoryStore::new());
    let activations = engine.subscribe();

    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::unbounded();
    let driver = tokio::spawn(run_engine(engine, cmd_rx, event_rx));

    cmd_tx.send(EngineCommand::Activate).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    event_tx.send(said("hey jarvis", 0)).unwrap();
    let event = activations.recv_async().await.unwrap();
    assert_eq!(event.matched_phrase.as_str(), "hey jarvis");

    // Still cooling down
    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    cmd_tx.send(EngineCommand::Shutdown).unwrap();
    let engine = driver.await.unwrap();
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn transient_error_restarts_after_short_delay() {
    let source = CountingSource::default();
    let starts = Arc::clone(&source.starts);
    let engine = WakeWordEngine::new(source, AlwaysGranted, MemoryStore::new());

    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::unbounded();
    let driver = tokio::spawn(run_engine(engine, cmd_rx, event_rx));

    cmd_tx.send(EngineCommand::Activate).unwrap();
    event_tx
        .send(SourceEvent::Error(SourceErrorKind::NoSpeech))
        .unwrap();
    event_tx.send(SourceEvent::SessionEnded).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    drop(cmd_tx);
    drop(event_tx);
    let engine = driver.await.unwrap();
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn deactivate_command_cancels_cooldown() {
    let source = CountingSource::default();
    let starts = Arc::clone(&source.starts);
    let mut engine = WakeWordEngine::new(source, AlwaysGranted, MemoryStore::new());
    let activations = engine.subscribe();

    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::unbounded();
    let driver = tokio::spawn(run_engine(engine, cmd_rx, event_rx));

    cmd_tx
        .send(EngineCommand::UpdateConfig(ConfigPatch {
            cooldown_ms: Some(500),
            ..Default::default()
        }))
        .unwrap();
    cmd_tx
        .send(EngineCommand::AddWakePhrase("computer".to_string()))
        .unwrap();
    cmd_tx.send(EngineCommand::Activate).unwrap();
    event_tx.send(said("computer", 0)).unwrap();
    activations.recv_async().await.unwrap();

    cmd_tx.send(EngineCommand::Deactivate).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    cmd_tx.send(EngineCommand::Shutdown).unwrap();
    let engine = driver.await.unwrap();
    assert!(engine.wake_phrases().contains("computer"));
    assert_eq!(engine.config().cooldown_ms, 500);
}
