//! In-process providers for running without a device and for tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};

use super::{
    offer_sample, AccelerometerSample, LocationFix, LocationProvider, MotionSensor,
    PermissionStatus, Subscription,
};
use crate::config::ScreenConfig;
use crate::error::{ScreenError, ScreenResult};

/// Location provider with a fixed permission answer and a fixed position
pub struct SimulatedLocationProvider {
    permission: PermissionStatus,
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
    fetch_delay: Duration,
    failure: Option<String>,
    permission_requests: Arc<AtomicU32>,
    fetches: Arc<AtomicU32>,
}

impl SimulatedLocationProvider {
    /// Grants permission and reports the given position
    pub fn granted(latitude: f64, longitude: f64, speed: Option<f64>) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            latitude,
            longitude,
            speed,
            fetch_delay: Duration::ZERO,
            failure: None,
            permission_requests: Arc::new(AtomicU32::new(0)),
            fetches: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Denies permission; any fetch attempt is counted and fails
    pub fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            ..Self::granted(0.0, 0.0, None)
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Grant permission but fail every fetch with `reason`
    pub fn with_failure(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    /// Shared counter of `current_position` calls
    pub fn fetch_counter(&self) -> Arc<AtomicU32> {
        self.fetches.clone()
    }

    /// Shared counter of `request_permission` calls
    pub fn permission_counter(&self) -> Arc<AtomicU32> {
        self.permission_requests.clone()
    }
}

impl LocationProvider for SimulatedLocationProvider {
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let status = self.permission;
        async move { status }.boxed()
    }

    fn current_position(&self) -> BoxFuture<'_, ScreenResult<LocationFix>> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if !self.fetch_delay.is_zero() {
                sleep(self.fetch_delay).await;
            }
            if self.permission == PermissionStatus::Denied {
                return Err(ScreenError::PermissionDenied);
            }
            if let Some(reason) = &self.failure {
                return Err(ScreenError::LocationFailed(reason.clone()));
            }
            debug!("[location] simulated fix #{}", fetch);
            Ok(LocationFix::new(self.latitude, self.longitude, self.speed))
        }
        .boxed()
    }
}

/// Synthetic accelerometer: gentle sway around 1 g on z, with an optional
/// horizontal jolt every `jolt_every` samples.
pub struct SyntheticMotionSensor {
    period: Duration,
    buffer: usize,
    jolt_every: Option<u64>,
}

impl SyntheticMotionSensor {
    pub fn new(config: &ScreenConfig) -> Self {
        Self {
            period: config.sample_interval(),
            buffer: config.sample_buffer,
            jolt_every: None,
        }
    }

    pub fn with_jolts(mut self, every: u64) -> Self {
        self.jolt_every = Some(every.max(1));
        self
    }
}

/// Sway pattern for sample `n`, with a 2.2 g jolt on x when `jolt` is set
pub fn synthetic_sample(n: u64, jolt: bool) -> AccelerometerSample {
    use std::f64::consts::PI;
    let t = n as f64 * 0.02;
    let x = if jolt { 2.2 } else { (t * 2.0 * PI).sin() * 0.05 };
    AccelerometerSample::new(x, (t * 2.0 * PI).cos() * 0.03, 1.0 + (t * PI).sin() * 0.01)
}

impl MotionSensor for SyntheticMotionSensor {
    fn subscribe(&self) -> ScreenResult<Subscription> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let period = self.period;
        let jolt_every = self.jolt_every;

        let producer = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut sample_count = 0u64;
            let mut n = 0u64;
            loop {
                ticker.tick().await;
                n += 1;
                let jolt = jolt_every.map(|every| n % every == 0).unwrap_or(false);
                if !offer_sample(&tx, synthetic_sample(n, jolt), &mut sample_count, "synthetic") {
                    break;
                }
            }
        });

        info!("[sensors] synthetic accelerometer at {:?} per sample", period);
        Ok(Subscription::new(rx, Some(producer)))
    }
}

/// Motion sensor fed by hand through a channel sender. Supports one subscriber.
pub struct ScriptedMotionSensor {
    samples: Mutex<Option<mpsc::Receiver<AccelerometerSample>>>,
}

impl ScriptedMotionSensor {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<AccelerometerSample>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                samples: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl MotionSensor for ScriptedMotionSensor {
    fn subscribe(&self) -> ScreenResult<Subscription> {
        let mut slot = self
            .samples
            .lock()
            .map_err(|_| ScreenError::Internal("Failed to acquire sample lock".to_string()))?;
        let rx = slot.take().ok_or(ScreenError::AlreadySubscribed)?;
        Ok(Subscription::new(rx, None))
    }
}

/// Motion sensor that is never available
pub struct UnavailableMotionSensor;

impl MotionSensor for UnavailableMotionSensor {
    fn subscribe(&self) -> ScreenResult<Subscription> {
        Err(ScreenError::SensorUnavailable(
            "no accelerometer on this device".to_string(),
        ))
    }
}
