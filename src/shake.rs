//! Horizontal shake detection.
//!
//! The detector is edge-triggered: a crossing while `Idle` raises one alert and
//! moves to `Alerting`; crossings while `Alerting` are ignored until the
//! debounce timer fires and the phase returns to `Idle`.
//!
//! ```text
//! Idle --crossing--> Alerting (timer armed) --timer fires--> Idle
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::future::pending;
use std::pin::Pin;
use tokio::time::{sleep, Duration, Instant, Sleep};

use crate::sensors::AccelerometerSample;

/// Text shown when a shake alert is raised
pub const SHAKE_MESSAGE: &str = "Sudden movement detected";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShakePhase {
    #[default]
    Idle,
    Alerting,
}

impl ShakePhase {
    pub fn is_alerting(&self) -> bool {
        matches!(self, ShakePhase::Alerting)
    }
}

/// Result of running one sample through the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeTransition {
    /// Below threshold
    Quiet,
    /// Crossing while idle: raise an alert and arm the timer
    Triggered,
    /// Crossing inside the debounce window
    Suppressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShakeAlert {
    pub message: String,
    pub sample: AccelerometerSample,
    /// Horizontal peak (g) that tripped the alert
    pub magnitude: f64,
    pub raised_at: DateTime<Local>,
}

impl ShakeAlert {
    pub fn new(sample: AccelerometerSample, raised_at: DateTime<Local>) -> Self {
        Self {
            message: SHAKE_MESSAGE.to_string(),
            sample,
            magnitude: sample.horizontal_peak(),
            raised_at,
        }
    }
}

pub struct ShakeDetector {
    threshold_g: f64,
}

impl ShakeDetector {
    pub fn new(threshold_g: f64) -> Self {
        Self { threshold_g }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_g
    }

    /// Strict comparison on x and y; z never counts
    pub fn exceeds(&self, sample: &AccelerometerSample) -> bool {
        sample.x.abs() > self.threshold_g || sample.y.abs() > self.threshold_g
    }

    pub fn evaluate(&self, phase: ShakePhase, sample: &AccelerometerSample) -> ShakeTransition {
        if !self.exceeds(sample) {
            return ShakeTransition::Quiet;
        }
        match phase {
            ShakePhase::Idle => ShakeTransition::Triggered,
            ShakePhase::Alerting => ShakeTransition::Suppressed,
        }
    }
}

/// One-shot timer that ends the debounce window.
///
/// Arming an already armed timer is a no-op, so the window is never extended.
pub struct DebounceTimer {
    window: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl DebounceTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the armed timer will fire
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.as_ref().map(|sleep| sleep.deadline())
    }

    /// Returns `false` if the timer was already armed
    pub fn arm(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Box::pin(sleep(self.window)));
        true
    }

    /// Drop the pending timer, if any. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Resolves when the armed timer fires and disarms it. Never resolves
    /// while disarmed.
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_below_threshold_is_quiet() {
        let detector = ShakeDetector::new(1.5);
        let samples = [
            AccelerometerSample::new(0.0, 0.0, 0.0),
            AccelerometerSample::new(1.5, -1.5, 1.0),
            AccelerometerSample::new(-1.49, 0.7, 5.0),
        ];
        for sample in &samples {
            assert_eq!(detector.evaluate(ShakePhase::Idle, sample), ShakeTransition::Quiet);
        }
    }

    #[test]
    fn test_z_axis_ignored() {
        let detector = ShakeDetector::new(1.5);
        let sample = AccelerometerSample::new(0.1, 0.1, 12.0);
        assert!(!detector.exceeds(&sample));
    }

    #[test]
    fn test_edge_triggered() {
        let detector = ShakeDetector::new(1.5);
        let jolt = AccelerometerSample::new(2.0, 0.0, 0.0);
        assert_eq!(detector.evaluate(ShakePhase::Idle, &jolt), ShakeTransition::Triggered);
        assert_eq!(
            detector.evaluate(ShakePhase::Alerting, &jolt),
            ShakeTransition::Suppressed
        );

        let negative_y = AccelerometerSample::new(0.0, -1.6, 0.0);
        assert_eq!(
            detector.evaluate(ShakePhase::Idle, &negative_y),
            ShakeTransition::Triggered
        );
    }

    #[test]
    fn test_alert_magnitude() {
        let alert = ShakeAlert::new(AccelerometerSample::new(0.3, -2.5, 1.0), Local::now());
        assert_eq!(alert.magnitude, 2.5);
        assert_eq!(alert.message, SHAKE_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_window() {
        let mut timer = DebounceTimer::new(Duration::from_secs(3));
        let start = Instant::now();
        assert!(timer.arm());

        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_does_not_extend() {
        let mut timer = DebounceTimer::new(Duration::from_secs(3));
        assert!(timer.arm());
        let first = timer.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!timer.arm());
        assert_eq!(timer.deadline(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let mut timer = DebounceTimer::new(Duration::from_secs(3));
        assert!(!timer.cancel());
        timer.arm();
        assert!(timer.cancel());

        tokio::time::advance(Duration::from_secs(10)).await;
        // Disarmed timer never completes
        assert!(timer.expired().now_or_never().is_none());
    }
}
