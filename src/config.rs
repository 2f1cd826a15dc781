use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::EngineError;

pub const DEFAULT_SETTINGS_PATH: &str = "jarvis.toml";

// ============================================================================
// Engine Config
// ============================================================================

/// Runtime-tunable matching and restart policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Transcripts below this confidence are dropped (0.0-1.0)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Fuzzy similarity must exceed this value to match (0.0-1.0)
    #[serde(default = "default_fuzzy_sensitivity")]
    pub fuzzy_sensitivity: f64,
    /// Pause after an activation before listening resumes
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Keep restarting the transcript source until deactivated
    #[serde(default = "default_background_mode")]
    pub background_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            fuzzy_sensitivity: default_fuzzy_sensitivity(),
            cooldown_ms: default_cooldown_ms(),
            background_mode: default_background_mode(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        check_ratio("confidence_threshold", self.confidence_threshold)?;
        check_ratio("fuzzy_sensitivity", self.fuzzy_sensitivity)?;
        Ok(())
    }

    /// Merge a partial update, returning the candidate config (not yet validated)
    pub fn merged(&self, patch: &ConfigPatch) -> Self {
        Self {
            confidence_threshold: patch
                .confidence_threshold
                .unwrap_or(self.confidence_threshold),
            fuzzy_sensitivity: patch.fuzzy_sensitivity.unwrap_or(self.fuzzy_sensitivity),
            cooldown_ms: patch.cooldown_ms.unwrap_or(self.cooldown_ms),
            background_mode: patch.background_mode.unwrap_or(self.background_mode),
        }
    }
}

fn check_ratio(name: &str, value: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::InvalidConfig(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Partial config update; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigPatch {
    pub confidence_threshold: Option<f64>,
    pub fuzzy_sensitivity: Option<f64>,
    pub cooldown_ms: Option<u64>,
    pub background_mode: Option<bool>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_fuzzy_sensitivity() -> f64 {
    0.7
}

fn default_cooldown_ms() -> u64 {
    2000
}

fn default_background_mode() -> bool {
    true
}

// ============================================================================
// Persisted Settings
// ============================================================================

/// Durable settings record: engine config, wake phrases and last active flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default = "default_wake_phrases")]
    pub wake_phrases: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            wake_phrases: default_wake_phrases(),
            active: false,
        }
    }
}

fn default_wake_phrases() -> Vec<String> {
    vec![
        "hey jarvis".to_string(),
        "jarvis".to_string(),
        "hey jarvis please".to_string(),
    ]
}

impl Settings {
    pub fn from_toml(s: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String, EngineError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Load/save boundary for persisted settings
pub trait SettingsStore: Send {
    /// Returns `None` when nothing has been saved yet
    fn load(&self) -> Result<Option<Settings>, EngineError>;
    fn save(&mut self, settings: &Settings) -> Result<(), EngineError>;
}

/// Settings stored as a TOML file on disk
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for TomlFileStore {
    fn load(&self) -> Result<Option<Settings>, EngineError> {
        if !self.path.exists() {
            debug!("No settings at {}, using defaults", self.path.display());
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        Settings::from_toml(&contents).map(Some)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), EngineError> {
        let contents = settings.to_toml()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, contents).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// In-process store; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<Settings>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(settings))),
        }
    }

    /// Last saved record
    pub fn snapshot(&self) -> Option<Settings> {
        self.inner.lock().ok().and_then(|s| s.clone())
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Option<Settings>, EngineError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, settings: &Settings) -> Result<(), EngineError> {
        match self.inner.lock() {
            Ok(mut slot) => *slot = Some(settings.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(settings.clone()),
        }
        Ok(())
    }
}

/// Load settings from a store, falling back to defaults on a missing or unreadable record
pub fn load_or_default(store: &dyn SettingsStore) -> Settings {
    match store.load() {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(e) => {
            warn!("Failed to load wake word settings ({}), using defaults", e);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.fuzzy_sensitivity, 0.7);
        assert_eq!(config.cooldown_ms, 2000);
        assert!(config.background_mode);
    }

    #[test]
    fn test_merge_patch() {
        let config = EngineConfig::default();
        let patch = ConfigPatch {
            cooldown_ms: Some(500),
            background_mode: Some(false),
            ..Default::default()
        };
        let merged = config.merged(&patch);
        assert_eq!(merged.cooldown_ms, 500);
        assert!(!merged.background_mode);
        assert_eq!(merged.confidence_threshold, 0.8);
        assert!(ConfigPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_validate_ratios() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        config.confidence_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
        config.confidence_threshold = 0.0;
        config.fuzzy_sensitivity = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_toml_round_trip() {
        let settings = Settings {
            engine: EngineConfig {
                confidence_threshold: 0.5,
                fuzzy_sensitivity: 0.9,
                cooldown_ms: 1500,
                background_mode: false,
            },
            wake_phrases: vec!["computer".to_string(), "hey jarvis".to_string()],
            active: true,
        };
        let text = settings.to_toml().unwrap();
        assert!(text.contains("confidence_threshold = 0.5"));
        assert!(text.contains("fuzzy_sensitivity = 0.9\n"));
        assert_eq!(Settings::from_toml(&text).unwrap(), settings);

        // Ratios are written as typed, not as widened binary fractions
        let text = Settings::default().to_toml().unwrap();
        assert!(text.contains("confidence_threshold = 0.8\n"));
        assert!(text.contains("fuzzy_sensitivity = 0.7\n"));
    }

    #[test]
    fn test_settings_missing_fields_default() {
        let settings = Settings::from_toml("cooldown_ms = 100\n").unwrap();
        assert_eq!(settings.engine.cooldown_ms, 100);
        assert_eq!(settings.engine.confidence_threshold, 0.8);
        assert_eq!(settings.wake_phrases, default_wake_phrases());
        assert!(!settings.active);
    }

    #[test]
    fn test_settings_parse_error() {
        assert!(matches!(
            Settings::from_toml("cooldown_ms = \"soon\""),
            Err(EngineError::Parse(_))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TomlFileStore::new(dir.path().join("nested").join("jarvis.toml"));
        assert!(store.load().unwrap().is_none());

        let mut settings = Settings::default();
        settings.wake_phrases.push("computer".to_string());
        store.save(&settings).unwrap();

        let reopened = TomlFileStore::new(store.path().to_path_buf());
        assert_eq!(reopened.load().unwrap(), Some(settings));
    }

    #[test]
    fn test_load_or_default_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jarvis.toml");
        fs::write(&path, "this is [not toml").unwrap();
        let store = TomlFileStore::new(path);
        assert_eq!(load_or_default(&store), Settings::default());
    }

    #[test]
    fn test_memory_store_shared() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.save(&Settings::default()).unwrap();
        assert_eq!(store.snapshot(), Some(Settings::default()));
    }
}
