use log::warn;
use tokio::sync::mpsc;

use crate::shake::ShakeAlert;

/// Surface for the user-facing shake notification
pub trait AlertSink: Send {
    fn alert(&mut self, alert: &ShakeAlert);
}

/// Forwards alerts to whoever holds the receiver (renderer, tests)
impl AlertSink for mpsc::UnboundedSender<ShakeAlert> {
    fn alert(&mut self, alert: &ShakeAlert) {
        if self.send(alert.clone()).is_err() {
            warn!("[alert] receiver gone, dropped alert: {}", alert.message);
        }
    }
}

/// Writes alerts to the log only
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&mut self, alert: &ShakeAlert) {
        warn!(
            "[alert] {} ({:.2} g at {})",
            alert.message,
            alert.magnitude,
            alert.raised_at.format("%H:%M:%S")
        );
    }
}
