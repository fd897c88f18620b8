//! Command line utility for the STMP-960 pressure calibrator.
//!
//! Subcommands: `plan` prints a setpoint plan, `watch` streams live
//! measurements from a connected instrument, `monitor` collects a bounded
//! sample window and prints its statistics, `sim` streams from the built-in
//! simulated calibrator.

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use stmp960::calibration::CalibPlan;
use stmp960::config::Settings;
use stmp960::error::AppResult;
use stmp960::monitor::MonitoringBuffer;
use stmp960::session::{DeviceSession, SessionConfig, SessionEvent};
use stmp960::sim::{self, SimOptions};

#[derive(Parser)]
#[command(name = "stmp960", about = "STMP-960 pressure calibrator toolkit")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a calibration setpoint plan.
    Plan {
        /// Lower bound of the calibrated span.
        low: f64,
        /// Upper bound of the calibrated span.
        high: f64,
        /// Number of forward setpoints.
        #[arg(long, default_value_t = 5)]
        points: usize,
        /// Walk back down after reaching the top.
        #[arg(long)]
        reverse: bool,
    },
    /// Stream live measurements until interrupted.
    Watch {
        /// Serial port override.
        #[arg(long)]
        port: Option<String>,
        /// Baud rate override.
        #[arg(long)]
        baud: Option<u32>,
    },
    /// Collect samples for a while and print min/max statistics.
    Monitor {
        /// Serial port override.
        #[arg(long)]
        port: Option<String>,
        /// Baud rate override.
        #[arg(long)]
        baud: Option<u32>,
        /// How long to collect, in seconds.
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Stream from the simulated calibrator (no hardware needed).
    Sim {
        /// Samples per second.
        #[arg(long, default_value_t = 5.0)]
        rate: f64,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Plan {
            low,
            high,
            points,
            reverse,
        } => {
            let plan = CalibPlan::build(low, high, points, reverse);
            if plan.is_empty() {
                eprintln!("plan is empty: need at least 2 points and distinct finite bounds");
            } else {
                for (i, target) in plan.targets().iter().enumerate() {
                    println!("{:3}  {:.6}", i + 1, target);
                }
            }
        }
        Command::Watch { port, baud } => {
            let config = session_config(&settings, port, baud);
            let mut session = DeviceSession::new();
            let mut events = session.start(config).await?;
            stream_events(&mut events).await;
            session.stop().await;
        }
        Command::Monitor {
            port,
            baud,
            seconds,
        } => {
            let config = session_config(&settings, port, baud);
            let mut session = DeviceSession::new();
            let mut events = session.start(config).await?;

            let mut buffer = MonitoringBuffer::with_capacity(settings.monitor_capacity);
            buffer.start();

            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => break,
                    maybe = events.recv() => match maybe {
                        Some(SessionEvent::Measurement(m)) => {
                            buffer.record(&m);
                        }
                        Some(SessionEvent::Fault(err)) => {
                            eprintln!("session fault: {err}");
                            break;
                        }
                        None => break,
                    },
                }
            }
            session.stop().await;

            match buffer.stats() {
                Some(stats) => println!(
                    "min {:.6}  max {:.6}  span {:.6}  samples {}",
                    stats.min, stats.max, stats.span, stats.count
                ),
                None => println!("no samples recorded"),
            }
        }
        Command::Sim { rate } => {
            let mut events = sim::spawn(SimOptions {
                sample_rate_hz: rate,
                channel_capacity: settings.channel_capacity,
                ..SimOptions::default()
            });
            stream_events(&mut events).await;
        }
    }
    Ok(())
}

fn session_config(settings: &Settings, port: Option<String>, baud: Option<u32>) -> SessionConfig {
    let mut config = SessionConfig::from(settings);
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(baud) = baud {
        config.baud = baud;
    }
    config
}

/// Prints events until ctrl-c, a fault, or the stream ends.
async fn stream_events(events: &mut tokio::sync::mpsc::Receiver<SessionEvent>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            maybe = events.recv() => match maybe {
                Some(SessionEvent::Measurement(m)) => {
                    match m.relay_state {
                        Some(closed) => println!(
                            "[{}] {:.6} {}  contact {}",
                            m.mode,
                            m.pressure,
                            m.pressure_unit,
                            if closed { "closed" } else { "open" }
                        ),
                        None => println!(
                            "[{}] {:.6} {}  {:.6} {}",
                            m.mode, m.pressure, m.pressure_unit, m.signal, m.signal_unit
                        ),
                    }
                }
                Some(SessionEvent::Fault(err)) => {
                    eprintln!("session fault: {err}");
                    break;
                }
                None => break,
            },
        }
    }
}
