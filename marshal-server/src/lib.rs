//! # Marshal Server
//!
//! Runs the traffic-marshal controller as a native process.
//!
//! This crate provides:
//! - Range-scan ingestion over UDP (JSON or packed `f32`) and file replay
//! - A REST API for emergency triggers and controller status
//! - Concrete output sinks: GPIO lamps, Pushbullet notes, UDP velocity
//!
//! ## Architecture
//!
//! The decision logic lives in [`marshal_core`]; this crate wires it to the
//! outside world with [`tokio`] providing the async runtime.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    marshal-server                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐ │
//! │  │ ScanSource   │  │ REST API     │  │ Replay file     │ │
//! │  │ (UDP)        │  │ (axum)       │  │ (JSON lines)    │ │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬────────┘ │
//! │         │   ControllerHandle (mpsc + abort)   │          │
//! │         ▼                 ▼                   ▼          │
//! │  ┌─────────────────────────────────────────────────────┐ │
//! │  │  Controller actor (one blocking thread)             │ │
//! │  │  - owns TrafficStateMachine                         │ │
//! │  │  - publishes ControllerStatus snapshots             │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! │         │              │                 │               │
//! │   LampIndicator   PushbulletNotifier  UdpMotionSink      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## REST API
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /v1/api/status` | Controller status snapshot |
//! | `POST /v1/api/trigger` | Emergency trigger, body `START` or `STOP` |
//! | `POST /v1/api/scan` | Inject a scan, body `{"ranges": [...]}` |
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-p, --port` - HTTP server port (default: 6580)
//! - `-s, --scan-port` - UDP port for range scans (default: 6581)
//! - `-v` - Increase verbosity (use multiple times)
//! - `--replay` - Feed scans from a JSON-lines file instead of UDP
//! - `--gpio` - Drive the lamps through the GPIO character device

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod controller;
pub mod gpio;
pub mod motion;
pub mod notify;
pub mod scan_source;
pub mod web;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] marshal_core::ConfigError),
    #[error("Cannot read configuration file '{0}'")]
    ConfigFile(PathBuf, #[source] std::io::Error),
    #[error("Cannot decode scan: {0}")]
    Decode(String),
    #[error("GPIO pin {pin}: {message}")]
    Gpio { pin: u8, message: String },
    #[error("Controller is not running")]
    ControllerGone,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Port for webserver
    #[arg(short, long, default_value_t = 6580)]
    pub port: u16,

    /// UDP port receiving range scans
    #[arg(short, long, default_value_t = 6581)]
    pub scan_port: u16,

    /// Controller configuration (JSON); defaults to config.json in the
    /// user configuration directory when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Replay scans from a JSON-lines file instead of listening on UDP
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Scan rate for replay mode
    #[arg(long, default_value_t = 10.0)]
    pub replay_rate_hz: f64,

    /// Send velocity commands as UDP datagrams to this address
    #[arg(short, long)]
    pub motion_address: Option<SocketAddr>,

    /// Drive the indicator lamps through GPIO
    #[arg(long, default_value_t = false)]
    pub gpio: bool,

    /// BCM pin of the red lamp
    #[arg(long, default_value_t = 17)]
    pub red_pin: u8,

    /// BCM pin of the yellow lamp
    #[arg(long, default_value_t = 27)]
    pub yellow_pin: u8,

    /// BCM pin of the green lamp
    #[arg(long, default_value_t = 22)]
    pub green_pin: u8,

    /// Pushbullet access token; notifications are disabled without it
    #[arg(long, env = "PUSHBULLET_API_KEY", hide_env_values = true)]
    pub pushbullet_token: Option<String>,

    /// Count objects straddling the start/end of the scan once
    #[arg(long, default_value_t = false)]
    pub wrap_around: bool,
}
