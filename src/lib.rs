// Sensor screen core
// Shows the device location and live accelerometer readings, and raises a
// debounced alert on sharp horizontal movement.

pub mod alert;
pub mod config;
pub mod display;
pub mod error;
pub mod screen;
pub mod sensors;
pub mod shake;
pub mod status;

pub use alert::{AlertSink, LogAlertSink};
pub use config::ScreenConfig;
pub use display::{DisplayState, TerminalRenderer};
pub use error::{ScreenError, ScreenResult};
pub use screen::{MountedScreen, ScreenState, SensorScreen};
pub use sensors::{
    AccelerometerSample, LocationFix, LocationProvider, MotionSensor, PermissionStatus,
    Subscription,
};
pub use shake::{ShakeAlert, ShakePhase};
pub use status::StatusSnapshot;
