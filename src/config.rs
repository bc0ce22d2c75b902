use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ScreenError, ScreenResult};

/// Tunables for the sensor screen.
///
/// The defaults reproduce the fixed behaviour of the screen: a 1.5 g horizontal
/// threshold and a 3 second debounce window. Sampling cadence only applies to
/// the polling providers (Termux and simulated); platform streams push at their
/// own rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Horizontal acceleration (g) that must be exceeded on x or y
    pub shake_threshold_g: f64,
    /// Length of the debounce window after an alert
    pub debounce_ms: u64,
    /// Polling period for providers that sample on a timer (~50Hz)
    pub sample_interval_ms: u64,
    /// Depth of the sample channel between provider and screen
    pub sample_buffer: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            shake_threshold_g: 1.5,
            debounce_ms: 3000,
            sample_interval_ms: 20,
            sample_buffer: 500,
        }
    }
}

impl ScreenConfig {
    /// Read a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> ScreenResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: ScreenConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScreenResult<()> {
        if !self.shake_threshold_g.is_finite() || self.shake_threshold_g <= 0.0 {
            return Err(ScreenError::InvalidConfig(format!(
                "shake_threshold_g must be a positive number, got {}",
                self.shake_threshold_g
            )));
        }
        if self.debounce_ms == 0 {
            return Err(ScreenError::InvalidConfig(
                "debounce_ms must be greater than zero".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(ScreenError::InvalidConfig(
                "sample_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sample_buffer == 0 {
            return Err(ScreenError::InvalidConfig(
                "sample_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
