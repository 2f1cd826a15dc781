//! Ambient audio level - shared, lock-free microphone level for collaborators
//!
//! Wake phrase matching never reads the level; UI indicators poll it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Level above which voice activity is reported (30 of 255 on a byte analyser)
pub const VOICE_ACTIVITY_THRESHOLD: f32 = 30.0 / 255.0;

/// Read-only source of the current ambient level (0.0-1.0)
pub trait AudioLevelSensor: Send + Sync {
    fn level(&self) -> f32;
}

/// Thread-safe f32 using bit casting to AtomicU32
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, v: f32, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }
}

/// Level written by an audio thread and read by anyone holding a clone
#[derive(Debug, Clone)]
pub struct SharedLevel(Arc<AtomicF32>);

impl Default for SharedLevel {
    fn default() -> Self {
        Self(Arc::new(AtomicF32::new(0.0)))
    }
}

impl SharedLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update level, clamped to 0.0-1.0
    pub fn set(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.0.store(level, Ordering::SeqCst);
    }

    /// Update level from 8-bit analyser bins (mean of the bins)
    pub fn set_from_bins(&self, bins: &[u8]) {
        if bins.is_empty() {
            self.set(0.0);
            return;
        }
        let sum: u32 = bins.iter().map(|&b| b as u32).sum();
        self.set(sum as f32 / bins.len() as f32 / 255.0);
    }
}

impl AudioLevelSensor for SharedLevel {
    fn level(&self) -> f32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Check whether the sensor currently reports voice activity
pub fn voice_activity(sensor: &dyn AudioLevelSensor) -> bool {
    sensor.level() > VOICE_ACTIVITY_THRESHOLD
}
