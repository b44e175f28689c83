//! Pushbullet notifications.
//!
//! Uses the blocking reqwest client: notes are sent from the controller
//! thread, which must not depend on the async runtime.

use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use marshal_core::{NotificationSink, NotifyError};

const API_BASE: &str = "https://api.pushbullet.com/v2";
const NOTE_TITLE: &str = "Traffic Bot";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct Note<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    body: &'a str,
}

pub struct PushbulletNotifier {
    client: Client,
    token: String,
    api_base: String,
}

impl PushbulletNotifier {
    /// Build a client and check the token against the account endpoint.
    pub fn connect(token: &str) -> Result<Self, NotifyError> {
        Self::connect_to(API_BASE, token)
    }

    fn connect_to(api_base: &str, token: &str) -> Result<Self, NotifyError> {
        if token.trim().is_empty() {
            return Err(NotifyError::Unauthorized);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;
        let notifier = PushbulletNotifier {
            client,
            token: token.trim().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        };

        let response = notifier
            .client
            .get(format!("{}/users/me", notifier.api_base))
            .header("Access-Token", &notifier.token)
            .send()
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;
        check_status(response.status(), || response_text(response))?;
        info!("Connected to Pushbullet");
        Ok(notifier)
    }

    /// Send the start-up note.
    pub fn announce_online(&mut self) -> Result<(), NotifyError> {
        self.push("System Online", "Traffic Bot Started.")
    }

    fn push(&mut self, title: &str, body: &str) -> Result<(), NotifyError> {
        let note = Note {
            kind: "note",
            title,
            body,
        };
        let response = self
            .client
            .post(format!("{}/pushes", self.api_base))
            .header("Access-Token", &self.token)
            .json(&note)
            .send()
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;
        check_status(response.status(), || response_text(response))?;
        debug!("Pushed note '{}'", body);
        Ok(())
    }
}

impl NotificationSink for PushbulletNotifier {
    fn send(&mut self, text: &str) -> Result<(), NotifyError> {
        self.push(NOTE_TITLE, text)
    }
}

impl std::fmt::Debug for PushbulletNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushbulletNotifier")
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn response_text(response: reqwest::blocking::Response) -> String {
    response.text().unwrap_or_default()
}

/// Map an HTTP status to the notification error it stands for.
fn check_status(
    status: StatusCode,
    body: impl FnOnce() -> String,
) -> Result<(), NotifyError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NotifyError::Unauthorized),
        _ => Err(NotifyError::Rejected {
            status: status.as_u16(),
            message: body(),
        }),
    }
}
