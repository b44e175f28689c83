//! Best-effort push notifications.
//!
//! Nothing in the control path depends on a notification being delivered.
//! When the push service failed to initialize the channel runs without a
//! sink and every send is a logged no-op.

use crate::error::NotifyError;

/// Transport for free-text notifications.
pub trait NotificationSink: Send {
    fn send(&mut self, text: &str) -> Result<(), NotifyError>;
}

/// Fire-and-forget wrapper around an optional [`NotificationSink`].
pub struct NotificationChannel {
    sink: Option<Box<dyn NotificationSink>>,
    sent: u64,
    failed: u64,
}

impl NotificationChannel {
    pub fn new(sink: Option<Box<dyn NotificationSink>>) -> Self {
        NotificationChannel {
            sink,
            sent: 0,
            failed: 0,
        }
    }

    /// A channel with no push service behind it.
    pub fn disconnected() -> Self {
        Self::new(None)
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Number of notifications delivered to the sink.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Number of notifications the sink rejected.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Send `text`. Returns whether the sink accepted it; never fails.
    pub fn send(&mut self, text: &str) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            log::debug!("Notifications not connected, dropping: {}", text);
            return false;
        };

        match sink.send(text) {
            Ok(()) => {
                log::debug!("Sent notification: {}", text);
                self.sent += 1;
                true
            }
            Err(e) => {
                log::error!("Failed to send notification '{}': {}", text, e);
                self.failed += 1;
                false
            }
        }
    }
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("connected", &self.is_connected())
            .field("sent", &self.sent)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Outbox {
        messages: Vec<String>,
        reject: bool,
    }

    impl NotificationSink for Outbox {
        fn send(&mut self, text: &str) -> Result<(), NotifyError> {
            if self.reject {
                return Err(NotifyError::Unreachable("no route to host".into()));
            }
            self.messages.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_disconnected_is_noop() {
        let mut channel = NotificationChannel::disconnected();
        assert!(!channel.is_connected());
        assert!(!channel.send("hello"));
        assert_eq!(channel.sent(), 0);
        assert_eq!(channel.failed(), 0);
    }

    #[test]
    fn test_delivery_counted() {
        let mut channel = NotificationChannel::new(Some(Box::new(Outbox {
            messages: Vec::new(),
            reject: false,
        })));
        assert!(channel.send("one"));
        assert!(channel.send("two"));
        assert_eq!(channel.sent(), 2);
    }

    #[test]
    fn test_failure_swallowed() {
        let mut channel = NotificationChannel::new(Some(Box::new(Outbox {
            messages: Vec::new(),
            reject: true,
        })));
        assert!(!channel.send("lost"));
        assert_eq!(channel.failed(), 1);
        assert!(channel.is_connected());
    }
}
