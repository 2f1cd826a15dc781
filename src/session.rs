//! Session driver - owns the engine and feeds it commands, source events and timers

use crate::config::ConfigPatch;
use crate::engine::WakeWordEngine;
use crate::source::{AudioPermission, SourceEvent, TranscriptSource};
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub enum EngineCommand {
    Activate,
    Deactivate,
    UpdateConfig(ConfigPatch),
    AddWakePhrase(String),
    RemoveWakePhrase(String),
    Shutdown,
}

/// Run the engine until `Shutdown` or until both channels close.
///
/// Every input is handled to completion before the next one is taken.
/// The engine is deactivated and handed back on exit.
pub async fn run_engine<S, P>(
    mut engine: WakeWordEngine<S, P>,
    commands: flume::Receiver<EngineCommand>,
    events: flume::Receiver<SourceEvent>,
) -> WakeWordEngine<S, P>
where
    S: TranscriptSource,
    P: AudioPermission,
{
    let mut commands_open = true;
    let mut events_open = true;

    while commands_open || events_open {
        let deadline = engine.next_deadline();
        tokio::select! {
            // Commands first so a deactivate wins over a due timer
            biased;

            cmd = commands.recv_async(), if commands_open => match cmd {
                Ok(EngineCommand::Shutdown) => break,
                Ok(cmd) => handle_command(&mut engine, cmd).await,
                Err(_) => commands_open = false,
            },
            event = events.recv_async(), if events_open => match event {
                Ok(event) => engine.handle_source_event(event),
                Err(_) => events_open = false,
            },
            _ = wait_until(deadline) => engine.fire_due_timers(),
        }
    }

    debug!("Engine driver stopping");
    engine.deactivate();
    engine
}

async fn handle_command<S, P>(engine: &mut WakeWordEngine<S, P>, cmd: EngineCommand)
where
    S: TranscriptSource,
    P: AudioPermission,
{
    match cmd {
        EngineCommand::Activate => {
            // Failures are also reported through notices
            if let Err(e) = engine.activate().await {
                warn!("Activation failed: {}", e);
            }
        }
        EngineCommand::Deactivate => engine.deactivate(),
        EngineCommand::UpdateConfig(patch) => {
            if let Err(e) = engine.update_config(patch) {
                error!("Config update failed: {}", e);
            }
        }
        EngineCommand::AddWakePhrase(phrase) => {
            if let Err(e) = engine.add_wake_phrase(&phrase) {
                error!("Adding wake phrase failed: {}", e);
            }
        }
        EngineCommand::RemoveWakePhrase(phrase) => {
            if let Err(e) = engine.remove_wake_phrase(&phrase) {
                error!("Removing wake phrase failed: {}", e);
            }
        }
        EngineCommand::Shutdown => {}
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
