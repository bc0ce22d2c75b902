use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ScreenResult;
use crate::screen::ScreenState;
use crate::shake::ShakePhase;

/// Flat counters written to the status file for outside monitoring
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub samples_seen: u64,
    pub alerts_raised: u64,
    pub location_fetches: u32,
    pub shake_phase: ShakePhase,
    // Latest accelerometer sample (g)
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    // Location, absent until a fix arrives
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub location_error: Option<String>,
}

impl StatusSnapshot {
    pub fn from_state(state: &ScreenState, uptime_seconds: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            samples_seen: state.samples_seen,
            alerts_raised: state.alerts_raised,
            location_fetches: state.location_fetches,
            shake_phase: state.shake,
            accel_x: state.sample.x,
            accel_y: state.sample.y,
            accel_z: state.sample.z,
            latitude: state.location.as_ref().map(|fix| fix.latitude),
            longitude: state.location.as_ref().map(|fix| fix.longitude),
            speed: state.location.as_ref().map(|fix| fix.speed),
            location_error: state.error.clone(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ScreenResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
