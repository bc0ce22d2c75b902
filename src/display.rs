use crossterm::cursor::{MoveTo, MoveToNextLine};
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, Write};

use crate::screen::ScreenState;
use crate::shake::SHAKE_MESSAGE;

pub const TITLE: &str = "Device Sensors";
pub const FETCHING_LOCATION: &str = "Fetching location...";

/// Text view of a [`ScreenState`]. Derived only, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    /// Latitude, longitude and speed lines, or the fetching placeholder
    pub location: Vec<String>,
    pub accelerometer: String,
    pub alert: Option<String>,
    pub last_update: String,
    pub error: Option<String>,
}

impl From<&ScreenState> for DisplayState {
    fn from(state: &ScreenState) -> Self {
        let location = match &state.location {
            Some(fix) => vec![
                format!("Latitude: {:.4}", fix.latitude),
                format!("Longitude: {:.4}", fix.longitude),
                format!("Current speed: {:.4}", fix.speed),
            ],
            None => vec![FETCHING_LOCATION.to_string()],
        };

        let sample = &state.sample;
        DisplayState {
            location,
            accelerometer: format!(
                "Accelerometer - x: {:.2} | y: {:.2} | z: {:.2}",
                sample.x, sample.y, sample.z
            ),
            alert: state
                .shake
                .is_alerting()
                .then(|| SHAKE_MESSAGE.to_string()),
            last_update: state
                .last_update
                .map(|at| at.format("%H:%M:%S").to_string())
                .unwrap_or_default(),
            error: state.error.clone(),
        }
    }
}

impl DisplayState {
    /// Lines in screen order
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = vec![TITLE.to_string(), String::new()];
        lines.extend(self.location.iter().cloned());
        lines.push(String::new());
        lines.push(self.accelerometer.clone());
        if let Some(alert) = &self.alert {
            lines.push(alert.clone());
        }
        lines.push(format!("Last reading: {}", self.last_update));
        if let Some(error) = &self.error {
            lines.push(error.clone());
        }
        lines
    }
}

/// Redraws the whole screen on each call
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn draw(&mut self, display: &DisplayState) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        for line in display.render_lines() {
            let highlight = display.alert.as_deref() == Some(line.as_str())
                || display.error.as_deref() == Some(line.as_str());
            if highlight {
                queue!(
                    self.out,
                    SetForegroundColor(Color::Red),
                    Print(&line),
                    ResetColor,
                    MoveToNextLine(1)
                )?;
            } else {
                queue!(self.out, Print(&line), MoveToNextLine(1))?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
