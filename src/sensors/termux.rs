//! Providers backed by the Termux:API command line tools.
//!
//! `termux-location` answers with a JSON object; `termux-sensor` reports
//! accelerometer readings in m/s^2, which are converted to g here.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use super::{
    offer_sample, AccelerometerSample, LocationFix, LocationProvider, MotionSensor,
    PermissionStatus, Subscription,
};
use crate::config::ScreenConfig;
use crate::error::{ScreenError, ScreenResult};

const LOCATION_COMMAND: &str = "termux-location";
const SENSOR_COMMAND: &str = "termux-sensor";

#[derive(Debug, Deserialize)]
struct TermuxLocationReply {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
}

/// Location through `termux-location`
pub struct TermuxLocationProvider {
    provider: String,
}

impl TermuxLocationProvider {
    pub fn new() -> Self {
        Self {
            provider: "gps".to_string(),
        }
    }

    /// Location source passed to `-p` (gps, network, passive)
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }
}

impl Default for TermuxLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for TermuxLocationProvider {
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
        async move {
            // Termux:API prompts for the permission on first use; a cheap
            // last-known query surfaces the answer.
            match Command::new(LOCATION_COMMAND)
                .args(["-p", "passive", "-r", "last"])
                .output()
                .await
            {
                Ok(output) => {
                    let text = String::from_utf8_lossy(&output.stdout);
                    let status = permission_from_output(output.status.success(), &text);
                    info!("[location] permission {:?}", status);
                    status
                }
                Err(e) => {
                    warn!("[location] {} unavailable: {}", LOCATION_COMMAND, e);
                    PermissionStatus::Denied
                }
            }
        }
        .boxed()
    }

    fn current_position(&self) -> BoxFuture<'_, ScreenResult<LocationFix>> {
        async move {
            let output = Command::new(LOCATION_COMMAND)
                .args(["-p", self.provider.as_str(), "-r", "once"])
                .output()
                .await?;
            if !output.status.success() {
                return Err(ScreenError::LocationFailed(format!(
                    "{} exited with {}",
                    LOCATION_COMMAND, output.status
                )));
            }
            parse_location_output(&String::from_utf8_lossy(&output.stdout))
        }
        .boxed()
    }
}

fn permission_from_output(success: bool, output: &str) -> PermissionStatus {
    if !success || output.to_ascii_lowercase().contains("permission") {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    }
}

fn parse_location_output(output: &str) -> ScreenResult<LocationFix> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ScreenError::LocationFailed("empty reply".to_string()));
    }
    let reply: TermuxLocationReply = serde_json::from_str(trimmed)
        .map_err(|e| ScreenError::LocationFailed(format!("unexpected reply: {}", e)))?;
    Ok(LocationFix::new(reply.latitude, reply.longitude, reply.speed))
}

/// Accelerometer polled through `termux-sensor`
pub struct TermuxMotionSensor {
    period: Duration,
    buffer: usize,
}

impl TermuxMotionSensor {
    pub fn new(config: &ScreenConfig) -> Self {
        Self {
            period: config.sample_interval(),
            buffer: config.sample_buffer,
        }
    }
}

impl MotionSensor for TermuxMotionSensor {
    fn subscribe(&self) -> ScreenResult<Subscription> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let period = self.period;

        let producer = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut sample_count = 0u64;
            let mut misses = 0u64;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let Some(sample) = read_accelerometer().await else {
                    misses += 1;
                    if misses == 10 {
                        warn!("[termux] no accelerometer readings from {}", SENSOR_COMMAND);
                    }
                    continue;
                };
                misses = 0;

                if !offer_sample(&tx, sample, &mut sample_count, "termux") {
                    break;
                }
            }
        });

        info!("[sensors] polling {} every {:?}", SENSOR_COMMAND, period);
        Ok(Subscription::new(rx, Some(producer)))
    }
}

async fn read_accelerometer() -> Option<AccelerometerSample> {
    match Command::new(SENSOR_COMMAND)
        .args(["-s", "accelerometer", "-n", "1"])
        .output()
        .await
    {
        Ok(output) => parse_accel_output(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            debug!("[termux] {} failed: {}", SENSOR_COMMAND, e);
            None
        }
    }
}

/// Parse one accelerometer reading (m/s^2) into g-units.
///
/// Accepts the JSON form `{"<sensor>": {"values": [x, y, z]}}` and the older
/// `x=.., y=.., z=..` event line.
fn parse_accel_output(output: &str) -> Option<AccelerometerSample> {
    if let Ok(serde_json::Value::Object(sensors)) = serde_json::from_str(output.trim()) {
        return sensors.values().find_map(|sensor| {
            let values = sensor.get("values")?.as_array()?;
            match values.as_slice() {
                [x, y, z, ..] => Some(AccelerometerSample::from_si(
                    x.as_f64()?,
                    y.as_f64()?,
                    z.as_f64()?,
                )),
                _ => None,
            }
        });
    }

    let (mut x, mut y, mut z) = (None, None, None);
    for part in output.split(',') {
        let part = part.trim();
        let part = part.rsplit(' ').next().unwrap_or(part);
        if let Some(val) = part.strip_prefix("x=") {
            x = Some(val.trim().parse().ok()?);
        } else if let Some(val) = part.strip_prefix("y=") {
            y = Some(val.trim().parse().ok()?);
        } else if let Some(val) = part.strip_prefix("z=") {
            z = Some(val.trim().parse().ok()?);
        }
    }
    Some(AccelerometerSample::from_si(x?, y?, z?))
}
