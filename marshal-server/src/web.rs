use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, info};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_graceful_shutdown::SubsystemHandle;

use marshal_core::TriggerOutcome;

use crate::controller::ControllerHandle;
use crate::MarshalError;

const STATUS_URI: &str = "/v1/api/status";
const TRIGGER_URI: &str = "/v1/api/trigger";
const SCAN_URI: &str = "/v1/api/scan";

#[derive(Clone)]
pub struct Web {
    port: u16,
    controller: ControllerHandle,
    shutdown_tx: broadcast::Sender<()>,
}

impl Web {
    pub fn new(port: u16, controller: ControllerHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Web {
            port,
            controller,
            shutdown_tx,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route(STATUS_URI, get(get_status))
            .route(TRIGGER_URI, post(post_trigger))
            .route(SCAN_URI, post(post_scan))
            .with_state(self.controller.clone())
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MarshalError> {
        let listener = TcpListener::bind(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.port,
        ))
        .await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        let app = self.router();

        info!("Starting HTTP web server on port {}", self.port);

        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                let _ = shutdown_tx.send(());
            },
            r = axum::serve(listener, app)
                    .with_graceful_shutdown(
                        async move {
                            _ = shutdown_rx.recv().await;
                        }
                    ) => {
                return r.map_err(MarshalError::Io);
            }
        }
        Ok(())
    }
}

impl IntoResponse for MarshalError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarshalError::Decode(_) => StatusCode::BAD_REQUEST,
            MarshalError::ControllerGone => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

async fn get_status(State(controller): State<ControllerHandle>) -> Response {
    Json(controller.status()).into_response()
}

async fn post_trigger(
    State(controller): State<ControllerHandle>,
    body: String,
) -> Result<Response, MarshalError> {
    match controller.trigger(&body).await? {
        TriggerOutcome::Applied(command) => {
            debug!("Trigger {} accepted", command);
            Ok((StatusCode::OK, command.to_string()).into_response())
        }
        TriggerOutcome::Ignored => Ok((StatusCode::ACCEPTED, "ignored").into_response()),
    }
}

#[derive(Deserialize)]
struct ScanBody {
    ranges: Vec<Option<f32>>,
}

async fn post_scan(
    State(controller): State<ControllerHandle>,
    Json(scan): Json<ScanBody>,
) -> Result<StatusCode, MarshalError> {
    let ranges = scan
        .ranges
        .into_iter()
        .map(|r| r.unwrap_or(f32::NAN))
        .collect();
    controller.submit_scan(ranges)?;
    Ok(StatusCode::ACCEPTED)
}
