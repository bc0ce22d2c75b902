use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, Instant};

use sensor_screen::sensors::simulated::{SimulatedLocationProvider, SyntheticMotionSensor};
use sensor_screen::sensors::termux::{TermuxLocationProvider, TermuxMotionSensor};
use sensor_screen::{
    DisplayState, LocationProvider, MotionSensor, ScreenConfig, SensorScreen, StatusSnapshot,
    TerminalRenderer,
};

#[derive(Parser, Debug)]
#[command(name = "sensor_screen")]
#[command(about = "Device location and accelerometer readings with shake alerts", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Use simulated sensors instead of Termux:API
    #[arg(long)]
    simulate: bool,

    /// With --simulate, answer the location permission request with "denied"
    #[arg(long, requires = "simulate")]
    deny_location: bool,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Horizontal shake threshold in g
    #[arg(long)]
    threshold: Option<f64>,

    /// Debounce window after an alert, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Sampling period for polled sensors, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Write a JSON status snapshot here every 2 seconds
    #[arg(long)]
    status_file: Option<PathBuf>,
}

impl Args {
    fn screen_config(&self) -> Result<ScreenConfig> {
        let mut config = match &self.config {
            Some(path) => ScreenConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ScreenConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.shake_threshold_g = threshold;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.sample_interval_ms = interval_ms;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.screen_config()?;

    info!("Sensor screen starting");
    info!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);
    info!("  Source: {}", if args.simulate { "simulated" } else { "termux" });
    info!("  Threshold: {:.2} g", config.shake_threshold_g);
    info!("  Debounce: {} ms", config.debounce_ms);

    let (location, motion): (Box<dyn LocationProvider>, Box<dyn MotionSensor>) = if args.simulate
    {
        let location = if args.deny_location {
            SimulatedLocationProvider::denied()
        } else {
            SimulatedLocationProvider::granted(37.7749, -122.4194, Some(0.0))
                .with_fetch_delay(Duration::from_millis(500))
        };
        (
            Box::new(location),
            Box::new(SyntheticMotionSensor::new(&config).with_jolts(250)),
        )
    } else {
        (
            Box::new(TermuxLocationProvider::new()),
            Box::new(TermuxMotionSensor::new(&config)),
        )
    };

    let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();
    let screen = SensorScreen::new(config, location, motion, alert_tx)?.mount();
    let mut state = screen.watch();
    let mut renderer = TerminalRenderer::new(std::io::stdout());

    let start = Instant::now();
    let run_for = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let stop = async move {
        match run_for {
            Some(limit) => tokio::select! {
                _ = sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            },
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    // 20Hz redraw
    let mut redraw = interval(Duration::from_millis(50));
    let mut status_tick = interval(Duration::from_secs(2));
    let mut alerts_seen = 0u64;

    loop {
        tokio::select! {
            _ = &mut stop => break,

            Some(alert) = alert_rx.recv() => {
                alerts_seen += 1;
                warn!(
                    "{} ({:.2} g at {})",
                    alert.message,
                    alert.magnitude,
                    alert.raised_at.format("%H:%M:%S")
                );
            }

            _ = redraw.tick() => {
                match state.has_changed() {
                    Ok(true) => {
                        let display = DisplayState::from(&*state.borrow_and_update());
                        renderer.draw(&display)?;
                    }
                    Ok(false) => {}
                    Err(_) => {
                        warn!("Screen stopped unexpectedly");
                        break;
                    }
                }
            }

            _ = status_tick.tick(), if args.status_file.is_some() => {
                if let Some(path) = &args.status_file {
                    let snapshot = StatusSnapshot::from_state(&state.borrow(), start.elapsed().as_secs());
                    if let Err(e) = snapshot.save(path) {
                        warn!("Failed to write status file {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    info!("Stopping...");
    let final_state = screen.unmount().await?;

    if let Some(path) = &args.status_file {
        StatusSnapshot::from_state(&final_state, start.elapsed().as_secs()).save(path)?;
    }

    println!("\n=== Final Stats ===");
    println!("Samples: {}", final_state.samples_seen);
    println!("Alerts: {} ({} delivered)", final_state.alerts_raised, alerts_seen);
    match &final_state.location {
        Some(fix) => println!("Location: {:.4}, {:.4}", fix.latitude, fix.longitude),
        None => println!(
            "Location: {}",
            final_state.error.as_deref().unwrap_or("not available")
        ),
    }

    Ok(())
}
