// Robot-side HTTP server: command endpoints, status and the MJPEG camera stream
// Note: commands feed the watchdog in executor.rs; if the operator goes quiet
// the robot stops on its own.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::camera::{self, CameraFeed, FileCamera};
use crate::config::{DEFAULT_SPEED, MotorConfig, ServerArgs};
use crate::executor::CommandExecutor;
use crate::messages::{ErrorBody, PingReply, StatusReply, StopReply};
use crate::motor::{ActionMap, Actuator, SimulatedDrive};

/// Shared state for the axum routes
#[derive(Clone)]
pub struct AppState {
    executor: Arc<CommandExecutor>,
    camera: Option<CameraFeed>,
}

impl AppState {
    pub fn new(executor: Arc<CommandExecutor>, camera: Option<CameraFeed>) -> Self {
        Self { executor, camera }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/command", post(command))
        .route("/stop", get(emergency_stop))
        .route("/stato", get(status))
        .route("/status", get(status))
        .route("/stream", get(stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn ping(State(state): State<AppState>) -> Json<PingReply> {
    Json(PingReply {
        status: "ok".to_string(),
        simulated: state.executor.is_simulated(),
        camera_available: state.camera.as_ref().is_some_and(CameraFeed::is_active),
    })
}

async fn command(State(state): State<AppState>, body: Bytes) -> Response {
    match state.executor.execute(&body) {
        Ok(ack) => Json(ack).into_response(),
        Err(e) if e.is_client_error() => error_reply(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn emergency_stop(State(state): State<AppState>) -> Json<StopReply> {
    state.executor.emergency_stop();
    Json(StopReply {
        status: "stopped".to_string(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusReply> {
    Json(StatusReply {
        current_action: state.executor.current_action(),
        simulated: state.executor.is_simulated(),
    })
}

async fn stream(State(state): State<AppState>) -> Response {
    let Some(feed) = state.camera else {
        return error_reply(StatusCode::SERVICE_UNAVAILABLE, "camera not available");
    };

    let body = Body::from_stream(feed.stream());
    (
        [
            (header::CONTENT_TYPE, camera::content_type()),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        body,
    )
        .into_response()
}

pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let motor = match &args.motor_config {
        Some(path) => MotorConfig::load(path)?,
        None => {
            info!("No motor calibration given - trim 1.0 / 1.0");
            MotorConfig::default()
        }
    };
    let map = if args.nominal_wiring {
        ActionMap::nominal()
    } else {
        ActionMap::as_wired()
    };

    // No pin-level bridge driver is linked in; motors run simulated
    warn!("Motor bridge not available - simulation mode");
    let actuator = Actuator::new(Box::new(SimulatedDrive::new()), map, motor);
    let executor = Arc::new(CommandExecutor::new(
        actuator,
        args.watchdog_interval(),
        DEFAULT_SPEED,
    ));

    let token = CancellationToken::new();
    let camera = match (&args.frames_dir, args.no_cam) {
        (_, true) => {
            info!("Camera disabled");
            None
        }
        (None, false) => {
            warn!("No frame source configured (--frames-dir) - stream disabled");
            None
        }
        (Some(dir), false) => {
            let feed = CameraFeed::new();
            FileCamera::open(dir, args.fps)?.spawn(feed.clone(), token.clone());
            Some(feed)
        }
    };
    let has_camera = camera.is_some();
    let feed = camera.clone();

    let app = router(AppState::new(Arc::clone(&executor), camera));
    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;

    info!("AlphaBot server on {}:{}", args.host, args.port);
    if has_camera {
        info!("Camera stream: http://<robot>:{}/stream", args.port);
    }
    info!("Emergency stop: http://<robot>:{}/stop", args.port);
    info!("Waiting for commands...");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            // Open /stream responses never finish on their own
            if let Some(feed) = feed {
                feed.close();
            }
        })
        .await?;

    token.cancel();
    executor.watchdog().disarm();
    executor.emergency_stop();
    info!("Server shut down.");
    Ok(())
}
