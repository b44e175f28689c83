use log::debug;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use marshal_core::{Clock, MotionSink, SinkError, Velocity};

/// Wall clock backed by [`Instant`]. `sleep_ms` blocks the calling thread,
/// so it must only be used from the controller's blocking thread.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[derive(Serialize)]
struct Vector3 {
    x: f64,
    y: f64,
    z: f64,
}

/// Wire form of a velocity command, shaped like a ROS `Twist`.
#[derive(Serialize)]
struct Twist {
    linear: Vector3,
    angular: Vector3,
}

impl From<Velocity> for Twist {
    fn from(v: Velocity) -> Self {
        Twist {
            linear: Vector3 {
                x: v.linear_x,
                y: 0.0,
                z: 0.0,
            },
            angular: Vector3 {
                x: 0.0,
                y: 0.0,
                z: v.angular_z,
            },
        }
    }
}

/// Sends each velocity command as one JSON datagram to a drive bridge.
#[derive(Debug)]
pub struct UdpMotionSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpMotionSink {
    pub fn new(target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0))?;
        debug!("Sending velocity commands to {}", target);
        Ok(UdpMotionSink { socket, target })
    }
}

impl MotionSink for UdpMotionSink {
    fn publish(&mut self, velocity: Velocity) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(&Twist::from(velocity))
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        self.socket
            .send_to(&payload, self.target)
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_sink_sends_twist_json() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut sink = UdpMotionSink::new(receiver.local_addr().unwrap()).unwrap();

        sink.publish(Velocity::new(-0.1, 0.3)).unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(value["linear"]["x"], -0.1);
        assert_eq!(value["angular"]["z"], 0.3);
        assert_eq!(value["linear"]["y"], 0.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        clock.sleep_ms(5);
        assert!(clock.now_ms() >= before + 5);
    }
}
