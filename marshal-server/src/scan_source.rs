//! Range scan sources.
//!
//! A scan arrives either as a UDP datagram or as one line of a replay file.
//! Datagrams come in one of two encodings:
//!
//! - JSON: `{"ranges": [0.5, 0.51, null, ...]}` where `null` is "no return"
//! - Binary: packed little-endian `f32`, one per beam
//!
//! Replay lines are text, so they are always JSON.
//!
//! Decoded scans go to the controller unchanged; sanitation happens there.

use log::{debug, info, warn};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::controller::ControllerHandle;
use crate::MarshalError;

const MAX_DATAGRAM: usize = 65_536;

#[derive(Deserialize)]
struct ScanMessage {
    ranges: Vec<Option<f32>>,
}

/// Decode a JSON scan message.
pub fn decode_json(payload: &[u8]) -> Result<Vec<f32>, MarshalError> {
    let message: ScanMessage =
        serde_json::from_slice(payload).map_err(|e| MarshalError::Decode(e.to_string()))?;
    Ok(message
        .ranges
        .into_iter()
        .map(|r| r.unwrap_or(f32::NAN))
        .collect())
}

/// Decode one datagram, JSON when it opens with `{`, packed `f32` otherwise.
pub fn decode_scan(payload: &[u8]) -> Result<Vec<f32>, MarshalError> {
    let first = payload.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'{') {
        return decode_json(payload);
    }

    if payload.is_empty() || payload.len() % 4 != 0 {
        return Err(MarshalError::Decode(format!(
            "{} bytes is not a whole number of f32 ranges",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// =============================================================================
// UDP
// =============================================================================

pub struct ScanReceiver {
    port: u16,
    controller: ControllerHandle,
}

impl ScanReceiver {
    pub fn new(port: u16, controller: ControllerHandle) -> Self {
        ScanReceiver { port, controller }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MarshalError> {
        let socket =
            UdpSocket::bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), self.port)).await?;
        info!("Listening for range scans on UDP port {}", self.port);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("ScanReceiver: Shutdown requested");
                    break;
                }
                r = socket.recv_from(&mut buf) => {
                    let (len, from) = r?;
                    match decode_scan(&buf[..len]) {
                        Ok(ranges) => self.controller.submit_scan(ranges)?,
                        Err(e) => debug!("Dropping datagram from {}: {}", from, e),
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Replay
// =============================================================================

/// Feeds scans from a JSON-lines file at a fixed rate.
pub struct ScanReplay {
    path: PathBuf,
    rate_hz: f64,
    controller: ControllerHandle,
}

impl ScanReplay {
    pub fn new(path: PathBuf, rate_hz: f64, controller: ControllerHandle) -> Self {
        ScanReplay {
            path,
            rate_hz,
            controller,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MarshalError> {
        let controller = self.controller.clone();
        tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                info!("ScanReplay: Shutdown requested");
                Ok(())
            }
            r = replay(&self.path, self.rate_hz, |ranges| controller.submit_scan(ranges)) => {
                let count = r?;
                info!("Replay of {} finished after {} scans", self.path.display(), count);
                Ok(())
            }
        }
    }
}

/// Read `path` line by line, handing each decoded scan to `submit` at
/// `rate_hz`. Undecodable lines are skipped. Returns the number of scans
/// submitted.
pub async fn replay<F>(path: &Path, rate_hz: f64, mut submit: F) -> Result<usize, MarshalError>
where
    F: FnMut(Vec<f32>) -> Result<(), MarshalError>,
{
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let rate_hz = if rate_hz > 0.0 { rate_hz } else { 10.0 };
    let mut ticker = interval(Duration::from_secs_f64(1.0 / rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Replaying scans from {} at {} Hz", path.display(), rate_hz);
    let mut count = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match decode_json(line.as_bytes()) {
            Ok(ranges) => {
                ticker.tick().await;
                submit(ranges)?;
                count += 1;
            }
            Err(e) => warn!("{}:{}: {}", path.display(), line_no, e),
        }
    }
    Ok(count)
}
