use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use dog_delivery_server::app::{AppError, Application};
use dog_delivery_server::constants::DEFAULT_PORT;
use dog_delivery_server::geom::Direction;
use dog_delivery_server::json_loader;
use dog_delivery_server::loot::TimedLootGenerator;
use dog_delivery_server::persistence::{SavePoint, StateSnapshot};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

type SharedApp = Arc<Mutex<Application>>;

#[derive(Clone)]
struct AppState {
    app: SharedApp,
    manual_tick: bool,
}

#[derive(Debug, Parser)]
#[command(name = "dog-delivery-server", about = "Collect-and-deliver game server")]
struct Args {
    /// Game config (maps, roads, offices, loot types).
    #[arg(short, long, value_name = "FILE")]
    config_file: PathBuf,

    /// Advance the simulation automatically every this many
    /// milliseconds. Without it the tick endpoint drives the clock.
    #[arg(short, long, value_name = "MS")]
    tick_period: Option<u64>,

    /// Spawn dogs at random road points instead of the first road's
    /// start.
    #[arg(long)]
    randomize_spawn_points: bool,

    /// Persist the game state to this file.
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Autosave every this many milliseconds of simulated time. Needs
    /// --state-file; without it the state is saved only on shutdown.
    #[arg(long, value_name = "MS")]
    save_state_period: Option<u64>,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(rename = "mapId")]
    map_id: String,
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(rename = "move")]
    direction: String,
}

#[derive(Debug, Deserialize)]
struct TickRequest {
    #[serde(rename = "timeDelta")]
    time_delta: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(error) = run(args).await {
        log::error!("{error}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let (mut game, extra, loot_settings) = json_loader::load_config(&args.config_file, seed)?;
    if args.randomize_spawn_points {
        game.enable_random_spawn();
    }

    let save_point = args.state_file.as_ref().map(|path| {
        SavePoint::new(
            path.clone(),
            args.save_state_period.map(Duration::from_millis),
        )
    });

    let mut app = Application::new(
        game,
        extra,
        Box::new(TimedLootGenerator::new(
            loot_settings.period,
            loot_settings.probability,
        )),
        save_point,
    );

    if let Some(path) = &args.state_file {
        if let Some(snapshot) = StateSnapshot::load(path) {
            log::info!("restoring state from {}", path.display());
            app.restore(snapshot);
        }
    }

    let app = Arc::new(Mutex::new(app));
    let manual_tick = args.tick_period.is_none();
    if let Some(tick_ms) = args.tick_period {
        start_tick_loop(app.clone(), Duration::from_millis(tick_ms));
    }

    let state = AppState {
        app: app.clone(),
        manual_tick,
    };
    let router = Router::new()
        .route("/api/v1/maps", get(maps_handler))
        .route("/api/v1/maps/{id}", get(map_handler))
        .route("/api/v1/game/join", post(join_handler))
        .route("/api/v1/game/players", get(players_handler))
        .route("/api/v1/game/state", get(state_handler))
        .route("/api/v1/game/player/action", post(action_handler))
        .route("/api/v1/game/tick", post(tick_handler))
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("listening on :{}", args.port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("shutting down");
    app.lock().await.save_now();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for shutdown signal: {error}");
    }
}

fn start_tick_loop(app: SharedApp, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        let mut last = Instant::now();
        loop {
            interval.tick().await;
            let now = Instant::now();
            let delta_ms = now.duration_since(last).as_millis() as u64;
            last = now;
            if delta_ms == 0 {
                continue;
            }
            let mut guard = app.lock().await;
            if let Err(error) = guard.tick(delta_ms) {
                log::warn!("tick skipped: {error}");
            }
        }
    });
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn app_error_response(error: AppError) -> Response {
    match error {
        AppError::MapNotFound => {
            error_response(StatusCode::NOT_FOUND, "mapNotFound", &error.to_string())
        }
        AppError::UnknownToken => {
            error_response(StatusCode::UNAUTHORIZED, "unknownToken", &error.to_string())
        }
        AppError::InvalidName | AppError::InvalidTickDelta | AppError::NoSpawnPoint => {
            error_response(StatusCode::BAD_REQUEST, "invalidArgument", &error.to_string())
        }
    }
}

fn body_error(rejection: JsonRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "invalidArgument",
        &rejection.body_text(),
    )
}

/// Extracts the 32-hex-character token from `Authorization: Bearer`.
/// Malformed credentials are rejected before any lookup happens.
fn bearer_token(headers: &HeaderMap) -> Result<String, Response> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "invalidToken",
                "authorization header is required",
            )
        })?;
    let token = raw.strip_prefix("Bearer ").unwrap_or_default();
    if token.len() != 32
        || !token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalidToken",
            "token must be 32 lowercase hex characters",
        ));
    }
    Ok(token.to_string())
}

async fn maps_handler(State(state): State<AppState>) -> Response {
    let guard = state.app.lock().await;
    Json(guard.list_maps()).into_response()
}

async fn map_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let guard = state.app.lock().await;
    match guard.map_description(&id) {
        Ok(description) => Json(description).into_response(),
        Err(error) => app_error_response(error),
    }
}

async fn join_handler(
    State(state): State<AppState>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(rejection),
    };
    let mut guard = state.app.lock().await;
    match guard.join_game(&request.user_name, &request.map_id) {
        Ok(joined) => Json(joined).into_response(),
        Err(error) => app_error_response(error),
    }
}

async fn players_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let guard = state.app.lock().await;
    match guard.list_players(&token) {
        Ok(players) => Json(players).into_response(),
        Err(error) => app_error_response(error),
    }
}

async fn state_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let guard = state.app.lock().await;
    match guard.get_state(&token) {
        Ok(view) => Json(view).into_response(),
        Err(error) => app_error_response(error),
    }
}

async fn action_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(rejection),
    };
    // Empty string means stop.
    let direction = if request.direction.is_empty() {
        None
    } else {
        match Direction::parse_move(&request.direction) {
            Some(direction) => Some(direction),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalidArgument",
                    "move must be one of U, D, L, R or empty",
                )
            }
        }
    };
    let mut guard = state.app.lock().await;
    match guard.set_action(&token, direction) {
        Ok(()) => Json(json!({})).into_response(),
        Err(error) => app_error_response(error),
    }
}

async fn tick_handler(
    State(state): State<AppState>,
    body: Result<Json<TickRequest>, JsonRejection>,
) -> Response {
    if !state.manual_tick {
        return error_response(
            StatusCode::BAD_REQUEST,
            "badRequest",
            "the clock is driven automatically on this server",
        );
    }
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_error(rejection),
    };
    let mut guard = state.app.lock().await;
    match guard.tick(request.time_delta) {
        Ok(()) => Json(json!({})).into_response(),
        Err(error) => app_error_response(error),
    }
}
