//! Wake word engine - owns the recognition session lifecycle
//!
//! State machine:
//! - `Idle -> Listening` on `activate()` once permission is granted and the source starts
//! - `Listening -> Cooldown` on a matching transcript: stop session, emit, schedule cooldown
//! - `Cooldown -> Listening` when the cooldown expires in background mode
//! - `Cooldown -> Idle` when the cooldown expires without background mode
//! - any state `-> Idle` on `deactivate()` or a permission failure from the source
//! - any state `-> Idle` when the source is unavailable, or keeps failing to
//!   start past [`MAX_START_RETRIES`]
//!
//! The engine never sleeps. Pending timers are exposed as a deadline
//! ([`WakeWordEngine::next_deadline`]) and the owner calls
//! [`WakeWordEngine::fire_due_timers`] once it passes.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{self, ConfigPatch, EngineConfig, Settings, SettingsStore};
use crate::error::EngineError;
use crate::source::{AudioPermission, SourceError, SourceEvent, TranscriptEvent, TranscriptSource};
use crate::wake::{MatchKind, WakePhrase, WakePhrases};

/// Delay before restarting a session that ended on its own
pub const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Consecutive failed starts tolerated in background mode before giving up
pub const MAX_START_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Listening,
    Cooldown,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Listening => write!(f, "Listening"),
            EngineState::Cooldown => write!(f, "Cooldown"),
        }
    }
}

/// Emitted once per detected wake phrase
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationEvent {
    pub matched_phrase: WakePhrase,
    pub transcript: String,
    pub kind: MatchKind,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle notifications for collaborators (indicators, error toasts)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotice {
    /// Wake word detection turned on
    Activated,
    /// Wake word detection turned off
    Deactivated,
    ListeningStarted,
    ListeningEnded,
    PermissionDenied(String),
    SourceUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Cooldown,
    Restart,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    kind: TimerKind,
    deadline: Instant,
}

type ActivationListener = Box<dyn FnMut(&ActivationEvent) + Send>;
type NoticeListener = Box<dyn FnMut(&EngineNotice) + Send>;

pub struct WakeWordEngine<S, P> {
    source: S,
    permission: P,
    store: Box<dyn SettingsStore>,
    config: EngineConfig,
    phrases: WakePhrases,
    state: EngineState,
    /// A recognition session is running on the source
    session_live: bool,
    /// Last evaluated sequence index of the current session
    last_sequence: Option<u64>,
    /// At most one timer: cooldown or restart
    pending: Option<PendingTimer>,
    /// Failed starts since the last successful one
    start_failures: u32,
    activation_listeners: Vec<ActivationListener>,
    notice_listeners: Vec<NoticeListener>,
}

impl<S, P> WakeWordEngine<S, P>
where
    S: TranscriptSource,
    P: AudioPermission,
{
    /// Create an idle engine, loading persisted settings from the store
    pub fn new(source: S, permission: P, store: impl SettingsStore + 'static) -> Self {
        let settings = config::load_or_default(&store);
        let config = match settings.engine.validate() {
            Ok(()) => settings.engine,
            Err(e) => {
                warn!("Ignoring persisted engine config: {}", e);
                EngineConfig::default()
            }
        };
        let phrases = WakePhrases::from_strings(&settings.wake_phrases);
        if settings.active {
            debug!("Wake word detection was active in the previous session");
        }
        info!(
            "Wake word engine ready: {} phrase(s), threshold {}, sensitivity {}",
            phrases.len(),
            config.confidence_threshold,
            config.fuzzy_sensitivity
        );

        Self {
            source,
            permission,
            store: Box::new(store),
            config,
            phrases,
            state: EngineState::Idle,
            session_live: false,
            last_sequence: None,
            pending: None,
            start_failures: 0,
            activation_listeners: Vec::new(),
            notice_listeners: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != EngineState::Idle
    }

    /// A recognition session is currently running
    pub fn is_listening(&self) -> bool {
        self.session_live
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn wake_phrases(&self) -> &WakePhrases {
        &self.phrases
    }

    /// Snapshot of the record that gets persisted
    pub fn settings(&self) -> Settings {
        Settings {
            engine: self.config,
            wake_phrases: self.phrases.to_strings(),
            active: self.is_active(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a listener, called synchronously for every activation in registration order
    pub fn on_activation<F>(&mut self, listener: F)
    where
        F: FnMut(&ActivationEvent) + Send + 'static,
    {
        self.activation_listeners.push(Box::new(listener));
    }

    pub fn on_notice<F>(&mut self, listener: F)
    where
        F: FnMut(&EngineNotice) + Send + 'static,
    {
        self.notice_listeners.push(Box::new(listener));
    }

    /// Channel form of [`Self::on_activation`]
    pub fn subscribe(&mut self) -> flume::Receiver<ActivationEvent> {
        let (tx, rx) = flume::unbounded();
        self.on_activation(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    fn emit(&mut self, event: &ActivationEvent) {
        for listener in self.activation_listeners.iter_mut() {
            listener(event);
        }
    }

    fn notify(&mut self, notice: EngineNotice) {
        for listener in self.notice_listeners.iter_mut() {
            listener(&notice);
        }
    }

    // ========================================================================
    // Activation
    // ========================================================================

    /// Request microphone access and start background listening.
    ///
    /// Does nothing if already active. On failure the engine stays `Idle` and a
    /// notice is emitted before the error is returned.
    pub async fn activate(&mut self) -> Result<(), EngineError> {
        if self.is_active() {
            return Ok(());
        }

        info!("Activating wake word detection");
        if let Err(reason) = self.permission.request().await {
            warn!("Microphone permission denied: {}", reason);
            self.notify(EngineNotice::PermissionDenied(reason.clone()));
            return Err(EngineError::PermissionDenied(reason));
        }

        self.start_session()?;
        self.persist_logged();
        self.notify(EngineNotice::Activated);
        Ok(())
    }

    /// Stop listening and cancel any pending timer. Always ends `Idle`.
    pub fn deactivate(&mut self) {
        if !self.is_active() {
            self.pending = None;
            return;
        }
        info!("Deactivating wake word detection");
        self.enter_idle();
        self.notify(EngineNotice::Deactivated);
    }

    fn enter_idle(&mut self) {
        self.pending = None;
        self.start_failures = 0;
        self.stop_session();
        if self.state != EngineState::Idle {
            debug!("{} -> Idle", self.state);
            self.state = EngineState::Idle;
            self.persist_logged();
        }
    }

    fn start_session(&mut self) -> Result<(), EngineError> {
        match self.source.start() {
            Ok(()) => {
                debug!("{} -> Listening", self.state);
                self.session_live = true;
                self.last_sequence = None;
                self.start_failures = 0;
                self.state = EngineState::Listening;
                Ok(())
            }
            Err(SourceError::Unavailable(msg)) => {
                warn!("Transcript source unavailable: {}", msg);
                self.enter_idle();
                self.notify(EngineNotice::SourceUnavailable(msg.clone()));
                Err(EngineError::SourceUnavailable(msg))
            }
            Err(SourceError::StartFailed(msg))
                if self.config.background_mode && self.start_failures < MAX_START_RETRIES =>
            {
                self.start_failures += 1;
                if self.start_failures == 1 {
                    warn!("Failed to start listening ({}), retrying", msg);
                } else {
                    debug!(
                        "Failed to start listening ({}), retry {}/{}",
                        msg, self.start_failures, MAX_START_RETRIES
                    );
                }
                self.session_live = false;
                self.state = EngineState::Listening;
                self.schedule(TimerKind::Restart, RESTART_DELAY);
                Ok(())
            }
            Err(SourceError::StartFailed(msg)) => {
                warn!(
                    "Failed to start listening: {} ({} retries)",
                    msg, self.start_failures
                );
                self.enter_idle();
                self.notify(EngineNotice::SourceUnavailable(msg.clone()));
                Err(EngineError::SourceUnavailable(msg))
            }
        }
    }

    fn stop_session(&mut self) {
        if self.session_live {
            self.source.stop();
            self.session_live = false;
        }
    }

    // ========================================================================
    // Source events
    // ========================================================================

    /// Feed one callback from the transcript source
    pub fn handle_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::SessionStarted => {
                debug!("Wake word session started");
                self.notify(EngineNotice::ListeningStarted);
            }
            SourceEvent::SessionEnded => {
                debug!("Wake word session ended");
                self.notify(EngineNotice::ListeningEnded);
                self.session_ended();
            }
            SourceEvent::Transcript(transcript) => self.handle_transcript(transcript),
            SourceEvent::Error(kind) if kind.is_permission() => {
                warn!("Transcript source refused access: {}", kind);
                self.enter_idle();
                self.notify(EngineNotice::PermissionDenied(kind.to_string()));
            }
            SourceEvent::Error(kind) => {
                debug!("Transcript source error: {}", kind);
                self.session_ended();
            }
        }
    }

    fn session_ended(&mut self) {
        // Ends in Cooldown/Idle were requested by the engine itself
        if self.state != EngineState::Listening || !self.session_live {
            return;
        }
        self.session_live = false;

        if self.config.background_mode {
            self.schedule(TimerKind::Restart, RESTART_DELAY);
        } else {
            info!("Listening ended, background mode off");
            self.enter_idle();
        }
    }

    fn handle_transcript(&mut self, event: TranscriptEvent) {
        if self.state != EngineState::Listening || !self.session_live {
            debug!("Dropping transcript in {} state: {:?}", self.state, event.text);
            return;
        }
        if self
            .last_sequence
            .is_some_and(|last| event.sequence_index <= last)
        {
            debug!("Dropping stale transcript #{}", event.sequence_index);
            return;
        }
        self.last_sequence = Some(event.sequence_index);

        // NaN never clears the threshold
        if event.confidence.is_nan() || event.confidence < self.config.confidence_threshold {
            return;
        }

        let Some((phrase, kind)) = self
            .phrases
            .find_match(&event.text, self.config.fuzzy_sensitivity)
        else {
            debug!(
                "No wake phrase in {:?} (confidence {:.2})",
                event.text, event.confidence
            );
            return;
        };
        let matched_phrase = phrase.clone();
        info!(
            "Wake phrase {:?} detected ({:?}) in {:?}",
            matched_phrase.as_str(),
            kind,
            event.text
        );

        // Stop first so trailing audio cannot trigger again
        self.stop_session();
        self.state = EngineState::Cooldown;

        let activation = ActivationEvent {
            matched_phrase,
            transcript: event.text,
            kind,
            timestamp: Utc::now(),
        };
        self.emit(&activation);
        self.schedule(
            TimerKind::Cooldown,
            Duration::from_millis(self.config.cooldown_ms),
        );
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        if self.pending.is_some_and(|p| p.kind == kind) {
            return;
        }
        self.pending = Some(PendingTimer {
            kind,
            deadline: Instant::now() + delay,
        });
    }

    /// When the owner should next call [`Self::fire_due_timers`]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Run the pending timer if its deadline has passed
    pub fn fire_due_timers(&mut self) {
        let Some(pending) = self.pending else {
            return;
        };
        if Instant::now() < pending.deadline {
            return;
        }
        self.pending = None;

        match pending.kind {
            TimerKind::Cooldown if self.state == EngineState::Cooldown => {
                if self.config.background_mode {
                    debug!("Cooldown over, resuming wake word listening");
                    if let Err(e) = self.start_session() {
                        warn!("Could not resume listening: {}", e);
                    }
                } else {
                    debug!("Cooldown over, background mode off");
                    self.enter_idle();
                }
            }
            TimerKind::Restart if self.state == EngineState::Listening && !self.session_live => {
                debug!("Restarting wake word listening");
                if let Err(e) = self.start_session() {
                    warn!("Could not restart listening: {}", e);
                }
            }
            _ => {}
        }
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Merge config fields and persist. Applies from the next transcript on.
    pub fn update_config(&mut self, patch: ConfigPatch) -> Result<EngineConfig, EngineError> {
        let candidate = self.config.merged(&patch);
        candidate.validate()?;
        self.config = candidate;
        debug!("Engine config updated: {:?}", self.config);
        self.persist()?;
        Ok(self.config)
    }

    /// Add a wake phrase (case-insensitive), returns false if already present
    pub fn add_wake_phrase(&mut self, word: &str) -> Result<bool, EngineError> {
        let phrase = WakePhrase::new(word)?;
        if !self.phrases.insert(phrase) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Remove a wake phrase, returns false if it was not configured
    pub fn remove_wake_phrase(&mut self, word: &str) -> Result<bool, EngineError> {
        let Ok(phrase) = WakePhrase::new(word) else {
            return Ok(false);
        };
        if !self.phrases.remove(&phrase) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        let settings = self.settings();
        self.store.save(&settings)
    }

    fn persist_logged(&mut self) {
        if let Err(e) = self.persist() {
            warn!("Failed to save wake word settings: {}", e);
        }
    }
}
