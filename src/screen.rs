//! The sensor screen: mount, event loop, teardown.
//!
//! All screen state lives in one [`ScreenState`] snapshot owned by a single
//! task. Every event (permission answer, location fix, accelerometer sample,
//! debounce expiry) produces a new snapshot through its own transition and is
//! published on a watch channel for renderers.

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::future::{pending, Future};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::alert::AlertSink;
use crate::config::ScreenConfig;
use crate::display::DisplayState;
use crate::error::{ScreenError, ScreenResult};
use crate::sensors::{
    AccelerometerSample, LocationFix, LocationProvider, MotionSensor, PermissionStatus,
    Subscription,
};
use crate::shake::{DebounceTimer, ShakeAlert, ShakeDetector, ShakePhase, ShakeTransition};

/// Snapshot of everything the screen shows
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScreenState {
    pub location: Option<LocationFix>,
    /// Permission error shown to the user
    pub error: Option<String>,
    pub sample: AccelerometerSample,
    pub shake: ShakePhase,
    pub last_update: Option<DateTime<Local>>,
    pub samples_seen: u64,
    pub alerts_raised: u64,
    pub location_fetches: u32,
}

impl ScreenState {
    pub fn on_permission(&self, status: PermissionStatus) -> Self {
        let mut next = self.clone();
        match status {
            PermissionStatus::Granted => next.location_fetches += 1,
            PermissionStatus::Denied => {
                next.error = Some(ScreenError::PermissionDenied.to_string());
            }
        }
        next
    }

    pub fn on_location(&self, fix: LocationFix, at: DateTime<Local>) -> Self {
        Self {
            location: Some(fix),
            last_update: Some(at),
            ..self.clone()
        }
    }

    pub fn on_sample(
        &self,
        sample: AccelerometerSample,
        transition: ShakeTransition,
        at: DateTime<Local>,
    ) -> Self {
        let mut next = self.clone();
        next.sample = sample;
        next.last_update = Some(at);
        next.samples_seen += 1;
        if transition == ShakeTransition::Triggered {
            next.shake = ShakePhase::Alerting;
            next.alerts_raised += 1;
        }
        next
    }

    pub fn on_debounce_elapsed(&self) -> Self {
        Self {
            shake: ShakePhase::Idle,
            ..self.clone()
        }
    }
}

pub struct SensorScreen<L, M, A> {
    config: ScreenConfig,
    location: L,
    motion: M,
    alerts: A,
}

impl<L, M, A> SensorScreen<L, M, A>
where
    L: LocationProvider + 'static,
    M: MotionSensor + 'static,
    A: AlertSink + 'static,
{
    pub fn new(config: ScreenConfig, location: L, motion: M, alerts: A) -> ScreenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            location,
            motion,
            alerts,
        })
    }

    /// Start the screen on the current runtime
    pub fn mount(self) -> MountedScreen {
        let (state_tx, state_rx) = watch::channel(ScreenState::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(state_tx, shutdown_rx));

        MountedScreen {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        self,
        state_tx: watch::Sender<ScreenState>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> ScreenState {
        let SensorScreen {
            config,
            location,
            motion,
            mut alerts,
        } = self;

        let detector = ShakeDetector::new(config.shake_threshold_g);
        let mut timer = DebounceTimer::new(config.debounce());
        let mut state = ScreenState::default();

        info!(
            "[screen] mounted (threshold {:.2} g, debounce {:?})",
            detector.threshold(),
            timer.window()
        );

        let mut permission = Some(location.request_permission());
        let mut fetch: Option<BoxFuture<'_, ScreenResult<LocationFix>>> = None;
        let mut subscription = match motion.subscribe() {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                error!("[screen] accelerometer subscription failed: {}", e);
                None
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                status = next_output(&mut permission) => {
                    permission = None;
                    state = state.on_permission(status);
                    match status {
                        PermissionStatus::Granted => {
                            fetch = Some(location.current_position());
                        }
                        PermissionStatus::Denied => {
                            warn!("[screen] location permission denied");
                        }
                    }
                }

                result = next_output(&mut fetch) => {
                    fetch = None;
                    match result {
                        Ok(fix) => {
                            info!("[screen] location fix {:.4}, {:.4}", fix.latitude, fix.longitude);
                            state = state.on_location(fix, Local::now());
                        }
                        Err(e) => {
                            error!("[screen] location fetch failed: {}", e);
                            continue;
                        }
                    }
                }

                sample = next_sample(&mut subscription) => {
                    let Some(sample) = sample else {
                        warn!("[screen] accelerometer stream ended after {} samples", state.samples_seen);
                        subscription = None;
                        continue;
                    };

                    let now = Local::now();
                    let transition = detector.evaluate(state.shake, &sample);
                    state = state.on_sample(sample, transition, now);

                    if transition == ShakeTransition::Triggered {
                        timer.arm();
                        let alert = ShakeAlert::new(sample, now);
                        info!("[screen] shake detected ({:.2} g)", alert.magnitude);
                        alerts.alert(&alert);
                    }
                }

                _ = timer.expired() => {
                    debug!("[screen] debounce window elapsed");
                    state = state.on_debounce_elapsed();
                }
            }

            state_tx.send_replace(state.clone());
        }

        if let Some(subscription) = subscription.take() {
            subscription.unsubscribe();
        }
        if timer.cancel() {
            debug!("[screen] cancelled pending debounce timer");
        }
        info!(
            "[screen] unmounted after {} samples, {} alerts",
            state.samples_seen, state.alerts_raised
        );
        state
    }
}

/// Poll an optional one-shot future; never resolves when the slot is empty
async fn next_output<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot.as_mut() {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_sample(subscription: &mut Option<Subscription>) -> Option<AccelerometerSample> {
    match subscription.as_mut() {
        Some(subscription) => subscription.next().await,
        None => pending().await,
    }
}

/// Handle to a running screen. Dropping it tears the screen down.
pub struct MountedScreen {
    state: watch::Receiver<ScreenState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ScreenState>>,
}

impl MountedScreen {
    /// Latest published snapshot
    pub fn snapshot(&self) -> ScreenState {
        self.state.borrow().clone()
    }

    pub fn display(&self) -> DisplayState {
        DisplayState::from(&*self.state.borrow())
    }

    /// Receiver that is notified on every published snapshot
    pub fn watch(&self) -> watch::Receiver<ScreenState> {
        self.state.clone()
    }

    /// Stop the screen: release the sensor subscription, cancel the debounce
    /// timer, and return the final state.
    pub async fn unmount(mut self) -> ScreenResult<ScreenState> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = self
            .task
            .take()
            .ok_or_else(|| ScreenError::Internal("screen already unmounted".to_string()))?;
        task.await
            .map_err(|e| ScreenError::Internal(format!("screen task failed: {}", e)))
    }
}

impl Drop for MountedScreen {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::simulated::{
        ScriptedMotionSensor, SimulatedLocationProvider, SyntheticMotionSensor,
        UnavailableMotionSensor,
    };
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Duration};

    fn jolt() -> AccelerometerSample {
        AccelerometerSample::new(2.0, 0.0, 0.0)
    }

    fn calm() -> AccelerometerSample {
        AccelerometerSample::new(0.2, -0.1, 1.0)
    }

    async fn wait_for(
        watch: &mut watch::Receiver<ScreenState>,
        condition: impl FnMut(&ScreenState) -> bool,
    ) -> ScreenState {
        watch.wait_for(condition).await.unwrap().clone()
    }

    struct Harness {
        screen: MountedScreen,
        samples: mpsc::Sender<AccelerometerSample>,
        alerts: mpsc::UnboundedReceiver<ShakeAlert>,
        watch: watch::Receiver<ScreenState>,
    }

    fn mount(location: SimulatedLocationProvider) -> Harness {
        let (sensor, samples) = ScriptedMotionSensor::new(16);
        let (alert_tx, alerts) = mpsc::unbounded_channel();
        let screen = SensorScreen::new(ScreenConfig::default(), location, sensor, alert_tx)
            .unwrap()
            .mount();
        let watch = screen.watch();
        Harness {
            screen,
            samples,
            alerts,
            watch,
        }
    }

    fn drain(alerts: &mut mpsc::UnboundedReceiver<ShakeAlert>) -> usize {
        let mut count = 0;
        while alerts.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_transitions_are_pure() {
        let initial = ScreenState::default();
        let next = initial.on_sample(jolt(), ShakeTransition::Triggered, Local::now());

        assert_eq!(initial.shake, ShakePhase::Idle);
        assert_eq!(initial.samples_seen, 0);
        assert_eq!(next.shake, ShakePhase::Alerting);
        assert_eq!(next.alerts_raised, 1);
        assert_eq!(next.sample, jolt());

        let idle = next.on_debounce_elapsed();
        assert_eq!(idle.shake, ShakePhase::Idle);
        assert_eq!(idle.alerts_raised, 1);
    }

    #[test]
    fn test_denied_sets_error_only() {
        let state = ScreenState::default().on_permission(PermissionStatus::Denied);
        assert_eq!(
            state.error.as_deref(),
            Some("Permission to access location was denied")
        );
        assert!(state.location.is_none());
        assert_eq!(state.location_fetches, 0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let (sensor, _tx) = ScriptedMotionSensor::new(1);
        let (alert_tx, _rx) = mpsc::unbounded_channel();
        let mut config = ScreenConfig::default();
        config.shake_threshold_g = -1.0;
        let result = SensorScreen::new(
            config,
            SimulatedLocationProvider::denied(),
            sensor,
            alert_tx,
        );
        assert!(matches!(result, Err(ScreenError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calm_samples_never_alert() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        let samples = [
            calm(),
            AccelerometerSample::new(1.5, 1.5, 0.0),
            AccelerometerSample::new(-1.5, -1.5, 9.0),
            AccelerometerSample::new(0.0, 0.0, 20.0),
        ];
        for sample in samples {
            h.samples.send(sample).await.unwrap();
        }

        let state = wait_for(&mut h.watch, |s| s.samples_seen == 4).await;
        assert_eq!(state.shake, ShakePhase::Idle);
        assert_eq!(state.alerts_raised, 0);
        assert_eq!(drain(&mut h.alerts), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jolt_raises_one_alert() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(jolt()).await.unwrap();
        let state = wait_for(&mut h.watch, |s| s.samples_seen == 1).await;

        assert_eq!(state.shake, ShakePhase::Alerting);
        assert_eq!(state.sample, jolt());
        let alert = h.alerts.try_recv().unwrap();
        assert_eq!(alert.magnitude, 2.0);
        assert_eq!(drain(&mut h.alerts), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_jolts_inside_window_are_suppressed() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(jolt()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 1).await;

        sleep(Duration::from_secs(1)).await;
        h.samples.send(jolt()).await.unwrap();
        sleep(Duration::from_millis(1500)).await;
        h.samples.send(AccelerometerSample::new(0.0, -3.0, 0.0)).await.unwrap();

        let state = wait_for(&mut h.watch, |s| s.samples_seen == 3).await;
        assert_eq!(state.shake, ShakePhase::Alerting);
        assert_eq!(state.alerts_raised, 1);
        assert_eq!(drain(&mut h.alerts), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_does_not_extend() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(jolt()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 1).await;
        sleep(Duration::from_millis(2500)).await;
        h.samples.send(jolt()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 2).await;

        // 3.2s after the first alert; a re-armed timer would still be running
        sleep(Duration::from_millis(700)).await;
        assert_eq!(h.screen.snapshot().shake, ShakePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_rearms_after_window() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(jolt()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 1).await;

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(h.screen.snapshot().shake, ShakePhase::Idle);

        h.samples.send(jolt()).await.unwrap();
        let state = wait_for(&mut h.watch, |s| s.samples_seen == 2).await;
        assert_eq!(state.shake, ShakePhase::Alerting);
        assert_eq!(state.alerts_raised, 2);
        assert_eq!(drain(&mut h.alerts), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_never_fetches() {
        let provider = SimulatedLocationProvider::denied();
        let fetches = provider.fetch_counter();
        let mut h = mount(provider);

        let state = wait_for(&mut h.watch, |s| s.error.is_some()).await;
        assert_eq!(
            state.error.as_deref(),
            Some("Permission to access location was denied")
        );

        // Sensors keep working without location
        h.samples.send(jolt()).await.unwrap();
        let state = wait_for(&mut h.watch, |s| s.samples_seen == 1).await;
        assert_eq!(state.alerts_raised, 1);

        sleep(Duration::from_secs(10)).await;
        let state = h.screen.snapshot();
        assert!(state.location.is_none());
        assert_eq!(state.location_fetches, 0);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_fetches_exactly_once() {
        let provider = SimulatedLocationProvider::granted(40.4168, -3.7038, Some(2.0))
            .with_fetch_delay(Duration::from_millis(800));
        let fetches = provider.fetch_counter();
        let permissions = provider.permission_counter();
        let mut h = mount(provider);

        let state = wait_for(&mut h.watch, |s| s.location.is_some()).await;
        let fix = state.location.unwrap();
        assert_eq!(fix.latitude, 40.4168);
        assert_eq!(fix.speed, 2.0);
        assert!(state.error.is_none());
        assert!(state.last_update.is_some());

        for _ in 0..5 {
            h.samples.send(calm()).await.unwrap();
        }
        wait_for(&mut h.watch, |s| s.samples_seen == 5).await;
        sleep(Duration::from_secs(30)).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(permissions.load(Ordering::SeqCst), 1);
        assert_eq!(h.screen.snapshot().location_fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_flow_while_location_pending() {
        let provider = SimulatedLocationProvider::granted(1.0, 2.0, None)
            .with_fetch_delay(Duration::from_secs(60));
        let mut h = mount(provider);

        h.samples.send(calm()).await.unwrap();
        let state = wait_for(&mut h.watch, |s| s.samples_seen == 1).await;
        assert!(state.location.is_none());
        assert_eq!(state.sample, calm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_leaves_location_pending() {
        let provider = SimulatedLocationProvider::granted(0.0, 0.0, None).with_failure("timeout");
        let mut h = mount(provider);

        wait_for(&mut h.watch, |s| s.location_fetches == 1).await;
        h.samples.send(calm()).await.unwrap();
        let state = wait_for(&mut h.watch, |s| s.samples_seen == 1).await;
        assert!(state.location.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_releases_subscription() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(calm()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 1).await;

        let final_state = h.screen.unmount().await.unwrap();
        assert_eq!(final_state.samples_seen, 1);

        assert!(h.samples.is_closed());
        assert!(h.samples.send(jolt()).await.is_err());
        assert_eq!(h.watch.borrow().samples_seen, 1);
        assert!(h.watch.has_changed().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_while_alerting_cancels_timer() {
        let mut h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));

        h.samples.send(jolt()).await.unwrap();
        wait_for(&mut h.watch, |s| s.samples_seen == 1).await;

        let final_state = h.screen.unmount().await.unwrap();
        assert_eq!(final_state.shake, ShakePhase::Alerting);

        sleep(Duration::from_secs(5)).await;
        // No debounce expiry was published after teardown
        assert_eq!(h.watch.borrow().shake, ShakePhase::Alerting);
        assert_eq!(drain(&mut h.alerts), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));
        let samples = h.samples.clone();
        drop(h.screen);

        samples.closed().await;
        assert!(samples.send(calm()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_sensor_keeps_location() {
        let (alert_tx, _alerts) = mpsc::unbounded_channel();
        let screen = SensorScreen::new(
            ScreenConfig::default(),
            SimulatedLocationProvider::granted(37.7749, -122.4194, None),
            UnavailableMotionSensor,
            alert_tx,
        )
        .unwrap()
        .mount();
        let mut watch = screen.watch();

        let state = wait_for(&mut watch, |s| s.location.is_some()).await;
        assert_eq!(state.samples_seen, 0);
        assert_eq!(state.sample, AccelerometerSample::default());

        let final_state = screen.unmount().await.unwrap();
        assert!(final_state.location.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_is_not_fatal() {
        let h = mount(SimulatedLocationProvider::granted(37.7749, -122.4194, None));
        drop(h.samples);

        sleep(Duration::from_secs(1)).await;
        let final_state = h.screen.unmount().await.unwrap();
        assert!(final_state.location.is_some());
        assert_eq!(final_state.samples_seen, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_stream_end_to_end() {
        let config = ScreenConfig::default();
        let sensor = SyntheticMotionSensor::new(&config).with_jolts(50);
        let (alert_tx, mut alerts) = mpsc::unbounded_channel();
        let screen = SensorScreen::new(
            config,
            SimulatedLocationProvider::granted(37.7749, -122.4194, Some(0.0)),
            sensor,
            alert_tx,
        )
        .unwrap()
        .mount();

        // 50 samples per second, one jolt per second, 3s debounce
        sleep(Duration::from_millis(6500)).await;
        let final_state = screen.unmount().await.unwrap();

        assert!(final_state.samples_seen >= 300);
        assert_eq!(final_state.alerts_raised, 2);
        assert_eq!(drain(&mut alerts), 2);
    }
}
