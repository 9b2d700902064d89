//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the engine runs on the
//! render thread. Handlers never touch the board directly: mutations go
//! through the command queue, and reads come from [`SharedDisplay`].

use crate::command::{CommandSender, LifeCommand};
use crate::render::{LifeSettings, LifeStatus, SharedDisplay, lock};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Queue feeding the engine on the render thread
    pub commands: CommandSender,
    /// Settings, status, and latest frame shared with the render thread
    pub display: SharedDisplay,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        post_reset,
        post_noise,
        post_command,
        get_settings,
        put_settings,
        get_frame,
    ),
    components(schemas(
        LifeStatus,
        LifeSettings,
        LifeCommand,
        CommandRequest,
        CommandResponse,
        SettingsUpdate,
    )),
    tags(
        (name = "life", description = "Game of Life control endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Life Matrix API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for the Game of Life LED matrix screensaver"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CommandRequest {
    /// Command token. Known tokens: RESET, ADD_NOISE. Anything else is ignored.
    #[schema(example = "ADD_NOISE")]
    command: String,
}

#[derive(Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct CommandResponse {
    /// False when the token was not a known command and nothing was queued
    accepted: bool,
}

/// Partial settings update. Omitted fields keep their current value.
#[derive(Default, Deserialize, utoipa::ToSchema)]
pub struct SettingsUpdate {
    /// Seconds between generations. Clamped to 0-10.
    #[schema(example = 0.5, minimum = 0.0, maximum = 10.0)]
    seconds_per_tick: Option<f64>,
    /// Show or hide the generation counter overlay
    show_generation_counter: Option<bool>,
    /// Brightness level (0-100)
    #[schema(example = 75, minimum = 0, maximum = 100)]
    brightness: Option<u8>,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/life/reset", post(post_reset))
        .route("/api/v1/life/noise", post(post_noise))
        .route("/api/v1/life/command", post(post_command))
        .route("/api/v1/life/settings", get(get_settings).put(put_settings))
        .route("/api/v1/life/frame", get(get_frame))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn enqueue(state: &AppState, command: LifeCommand) -> Result<StatusCode, (StatusCode, String)> {
    state.commands.send(command).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })?;

    tracing::info!("Queued life command {}", command);
    Ok(StatusCode::ACCEPTED)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — generation, population, and active settings
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current simulation status", body = LifeStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<LifeStatus> {
    Json(state.display.status())
}

/// POST /api/v1/life/reset — reseed the board and restart the generation count
#[utoipa::path(
    post,
    path = "/api/v1/life/reset",
    tag = "life",
    responses(
        (status = 202, description = "Reset queued"),
        (status = 500, description = "Render thread gone")
    )
)]
async fn post_reset(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    enqueue(&state, LifeCommand::Reset)
}

/// POST /api/v1/life/noise — sprinkle random live cells over the board
#[utoipa::path(
    post,
    path = "/api/v1/life/noise",
    tag = "life",
    responses(
        (status = 202, description = "Noise queued"),
        (status = 500, description = "Render thread gone")
    )
)]
async fn post_noise(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    enqueue(&state, LifeCommand::AddNoise)
}

/// POST /api/v1/life/command — queue a command by its token
#[utoipa::path(
    post,
    path = "/api/v1/life/command",
    tag = "life",
    request_body = CommandRequest,
    responses(
        (status = 202, description = "Token handled; `accepted` tells whether it was queued", body = CommandResponse),
        (status = 500, description = "Render thread gone")
    )
)]
async fn post_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), (StatusCode, String)> {
    let accepted = state.commands.send_token(&req.command).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })?;

    Ok((StatusCode::ACCEPTED, Json(CommandResponse { accepted })))
}

/// GET /api/v1/life/settings — current tick interval, overlay flag, brightness
#[utoipa::path(
    get,
    path = "/api/v1/life/settings",
    tag = "life",
    responses(
        (status = 200, description = "Current settings", body = LifeSettings)
    )
)]
async fn get_settings(State(state): State<AppState>) -> Json<LifeSettings> {
    Json(state.display.settings())
}

/// PUT /api/v1/life/settings — update any subset of the settings
#[utoipa::path(
    put,
    path = "/api/v1/life/settings",
    tag = "life",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Settings after the update", body = LifeSettings)
    )
)]
async fn put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<LifeSettings> {
    let mut settings = lock(&state.display.settings);

    if let Some(value) = update.seconds_per_tick {
        settings.set_seconds_per_tick(value);
    }
    if let Some(show) = update.show_generation_counter {
        settings.show_generation_counter = show;
    }
    if let Some(value) = update.brightness {
        settings.set_brightness(value);
    }

    tracing::info!(
        "Life settings: {}s per tick, counter {}, brightness {}",
        settings.seconds_per_tick,
        if settings.show_generation_counter { "on" } else { "off" },
        settings.brightness
    );

    Json(settings.clone())
}

/// GET /api/v1/life/frame — latest panel frame as PNG
#[utoipa::path(
    get,
    path = "/api/v1/life/frame",
    tag = "life",
    responses(
        (status = 200, description = "Panel-sized image/png of the current board"),
        (status = 500, description = "Encoding failed")
    )
)]
async fn get_frame(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let frame = state.display.frame();

    let mut png = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| {
            tracing::error!("Failed to encode frame: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode frame: {e}"),
            )
        })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandReceiver, command_queue};
    use crate::{Color, PanelConfig};
    use pretty_assertions::assert_eq;

    const PANEL: PanelConfig = PanelConfig { rows: 4, cols: 6 };

    fn test_state() -> (AppState, CommandReceiver) {
        let (commands, rx) = command_queue();
        let display = SharedDisplay::new(LifeSettings::default(), PANEL.grid_geometry(1), PANEL);
        (AppState { commands, display }, rx)
    }

    #[tokio::test]
    async fn reset_and_noise_are_queued_in_order() {
        let (state, mut rx) = test_state();

        assert_eq!(post_reset(State(state.clone())).await, Ok(StatusCode::ACCEPTED));
        assert_eq!(post_noise(State(state.clone())).await, Ok(StatusCode::ACCEPTED));

        assert_eq!(rx.try_next(), Some(LifeCommand::Reset));
        assert_eq!(rx.try_next(), Some(LifeCommand::AddNoise));
        assert_eq!(rx.try_next(), None);
    }

    #[tokio::test]
    async fn command_token_is_parsed() {
        let (state, mut rx) = test_state();
        let req = CommandRequest {
            command: "ADD_NOISE".to_string(),
        };

        let (status, Json(body)) = post_command(State(state), Json(req)).await.unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, CommandResponse { accepted: true });
        assert_eq!(rx.try_next(), Some(LifeCommand::AddNoise));
    }

    #[tokio::test]
    async fn unknown_command_token_is_ignored() {
        let (state, mut rx) = test_state();
        let req = CommandRequest {
            command: "SELF_DESTRUCT".to_string(),
        };

        let (status, Json(body)) = post_command(State(state), Json(req)).await.unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, CommandResponse { accepted: false });
        assert_eq!(rx.try_next(), None);
    }

    #[tokio::test]
    async fn enqueue_fails_when_render_thread_is_gone() {
        let (state, rx) = test_state();
        drop(rx);

        let err = post_reset(State(state)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn settings_update_is_partial_and_clamped() {
        let (state, _rx) = test_state();
        let update = SettingsUpdate {
            seconds_per_tick: Some(42.0),
            brightness: Some(180),
            ..Default::default()
        };

        let Json(settings) = put_settings(State(state.clone()), Json(update)).await;

        assert_eq!(settings.seconds_per_tick, 10.0);
        assert_eq!(settings.brightness, 100);
        assert!(!settings.show_generation_counter);

        let update = SettingsUpdate {
            show_generation_counter: Some(true),
            ..Default::default()
        };
        let Json(settings) = put_settings(State(state.clone()), Json(update)).await;
        assert!(settings.show_generation_counter);
        assert_eq!(settings.seconds_per_tick, 10.0);

        let Json(read_back) = get_settings(State(state)).await;
        assert_eq!(read_back, settings);
    }

    #[tokio::test]
    async fn settings_update_parses_from_json() {
        let update: SettingsUpdate = serde_json::from_str(r#"{"seconds_per_tick":0.3}"#).unwrap();
        assert_eq!(update.seconds_per_tick, Some(0.3));
        assert!(update.show_generation_counter.is_none());
        assert!(update.brightness.is_none());
    }

    #[tokio::test]
    async fn status_reflects_shared_state() {
        let (state, _rx) = test_state();
        lock(&state.display.status).generation = 12;

        let Json(status) = get_status(State(state)).await;

        assert_eq!(status.generation, 12);
        assert_eq!(status.width, 14);
        assert_eq!(status.height, 6);
    }

    #[tokio::test]
    async fn frame_is_served_as_png() {
        let (state, _rx) = test_state();
        lock(&state.display.frame).put_pixel(1, 2, Color::WHITE.to_rgb());

        let response = get_frame(State(state)).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let decoded = image::load_from_memory_with_format(&body, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
        assert_eq!(*decoded.get_pixel(1, 2), Color::WHITE.to_rgb());
    }

    #[test]
    fn openapi_lists_life_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/status",
            "/api/v1/life/reset",
            "/api/v1/life/noise",
            "/api/v1/life/command",
            "/api/v1/life/settings",
            "/api/v1/life/frame",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
