//! Game of Life LED matrix server
//!
//! Runs the life engine on a render thread and exposes an HTTP API so any
//! device on the LAN can reset the board, add noise, change the tick rate,
//! and read back generation and population counts.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the engine, ticks at a fixed frame rate
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! ./target/release/life-matrix --port 8080 --seconds-per-tick 0.2
//! ```

use clap::Parser;
use life_matrix::life::{INIT_CUTOFF, NOISE_CUTOFF};
use life_matrix::render::{DEFAULT_FPS, LifeSettings, SharedDisplay, render_loop};
use life_matrix::server::{self, AppState};
use life_matrix::{
    GRID_MARGIN, LifeEngine, PanelConfig, command_queue, is_running, setup_signal_handler,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Game of Life LED Matrix Server
#[derive(Parser)]
#[command(name = "life-matrix")]
#[command(about = "Game of Life screensaver with an HTTP control API")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Number of rows on the LED panel
    #[arg(long, default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "64")]
    cols: u32,

    /// Hidden cells simulated around the visible panel area
    #[arg(long, default_value_t = GRID_MARGIN)]
    margin: u32,

    /// Display frames per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    /// Initial seconds between generations (0-10)
    #[arg(long, default_value = "0.0")]
    seconds_per_tick: f64,

    /// Seed for reproducible boards (defaults to OS entropy)
    #[arg(long)]
    seed: Option<u64>,

    /// Cells are seeded alive when a 0-99 draw exceeds this value
    #[arg(long, default_value_t = INIT_CUTOFF)]
    init_cutoff: u8,

    /// Cutoff used when adding noise (higher means sparser)
    #[arg(long, default_value_t = NOISE_CUTOFF)]
    noise_cutoff: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    let panel = PanelConfig::new(args.rows, args.cols);
    let geometry = panel.grid_geometry(args.margin);

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let engine = LifeEngine::with_rng(geometry.width, geometry.height, args.init_cutoff, rng)?
        .with_noise_cutoff(args.noise_cutoff);

    tracing::info!("Life Matrix Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Panel: {}x{}", panel.cols, panel.rows);
    tracing::info!(
        "Board: {}x{} (margin {})",
        geometry.width,
        geometry.height,
        geometry.margin
    );
    if let Some(seed) = args.seed {
        tracing::info!("Seed: {}", seed);
    }
    tracing::info!("Port: {}", args.port);

    let running = setup_signal_handler()?;

    let (tx, rx) = command_queue();
    let display = SharedDisplay::new(LifeSettings::new(args.seconds_per_tick), geometry, panel);

    let render_display = display.clone();
    let render_running = running.clone();
    let margin = geometry.margin;
    let fps = args.fps;
    let render_handle = std::thread::spawn(move || {
        render_loop(
            engine,
            rx,
            render_display,
            panel,
            margin,
            fps,
            render_running,
        );
    });

    let app = server::create_router(AppState {
        commands: tx,
        display,
    });

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl -X POST http://localhost:{}/api/v1/life/noise", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(running.clone()))
        .await?;

    running.store(false, Ordering::SeqCst);
    if render_handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }

    tracing::info!("Shut down cleanly.");
    Ok(())
}

/// Resolve once Ctrl+C has cleared the running flag.
async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while is_running(&running) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tracing::info!("Shutdown requested");
}
