//! Sensor data model and the two platform ports the screen consumes.
//!
//! The screen never talks to a platform directly. It asks a [`LocationProvider`]
//! for permission and a single fix, and a [`MotionSensor`] for a stream of
//! accelerometer samples wrapped in a cancellable [`Subscription`].

pub mod simulated;
pub mod termux;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::ScreenResult;

/// Standard gravity, used to convert m/s^2 readings to g
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// One location fix from the platform location service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s, 0 when the platform does not report one
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, speed: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed: speed.unwrap_or(0.0),
            timestamp: Utc::now(),
        }
    }
}

/// Accelerometer sample in g-units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerometerSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a sample from a reading in m/s^2
    pub fn from_si(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x / STANDARD_GRAVITY,
            y: y / STANDARD_GRAVITY,
            z: z / STANDARD_GRAVITY,
        }
    }

    /// Largest absolute reading on the horizontal (x, y) axes
    pub fn horizontal_peak(&self) -> f64 {
        self.x.abs().max(self.y.abs())
    }
}

/// Outcome of a foreground location permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Location capability of the platform
pub trait LocationProvider: Send + Sync {
    /// Ask for foreground location permission
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus>;

    /// Fetch the current position once. Only valid after permission was granted.
    fn current_position(&self) -> BoxFuture<'_, ScreenResult<LocationFix>>;
}

/// Motion sensor capability of the platform
pub trait MotionSensor: Send + Sync {
    /// Start delivering accelerometer samples until the subscription is released
    fn subscribe(&self) -> ScreenResult<Subscription>;
}

impl<T: LocationProvider + ?Sized> LocationProvider for Box<T> {
    fn request_permission(&self) -> BoxFuture<'_, PermissionStatus> {
        (**self).request_permission()
    }

    fn current_position(&self) -> BoxFuture<'_, ScreenResult<LocationFix>> {
        (**self).current_position()
    }
}

impl<T: MotionSensor + ?Sized> MotionSensor for Box<T> {
    fn subscribe(&self) -> ScreenResult<Subscription> {
        (**self).subscribe()
    }
}

/// Live accelerometer subscription.
///
/// Released exactly once, either through [`Subscription::unsubscribe`] or on
/// drop. Releasing closes the channel so producers see it as closed, and aborts
/// the producer task if the provider attached one.
pub struct Subscription {
    samples: mpsc::Receiver<AccelerometerSample>,
    producer: Option<JoinHandle<()>>,
    released: bool,
}

impl Subscription {
    pub fn new(
        samples: mpsc::Receiver<AccelerometerSample>,
        producer: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            samples,
            producer,
            released: false,
        }
    }

    /// Next sample, or `None` once the producer has gone away
    pub async fn next(&mut self) -> Option<AccelerometerSample> {
        self.samples.recv().await
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.samples.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        debug!("[sensors] accelerometer subscription released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Push a sample from a polling producer, dropping it when the channel is full.
/// Returns `false` once the subscriber has gone away.
pub(crate) fn offer_sample(
    tx: &mpsc::Sender<AccelerometerSample>,
    sample: AccelerometerSample,
    sample_count: &mut u64,
    source: &str,
) -> bool {
    match tx.try_send(sample) {
        Ok(_) => {
            *sample_count += 1;
            if *sample_count % 100 == 0 {
                debug!("[{}] {} samples", source, sample_count);
            }
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!("[{}] Channel closed after {} samples", source, sample_count);
            false
        }
        // Channel full, drop this sample
        Err(TrySendError::Full(_)) => true,
    }
}
