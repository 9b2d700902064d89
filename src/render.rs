//! Render thread: drives the life engine at a fixed frame rate.
//!
//! The engine lives on this thread and nowhere else. The HTTP server talks
//! to it through the command queue and reads its results through
//! [`SharedDisplay`]: settings flow in, status and the latest frame flow out.
//!
//! Each frame runs in a fixed order:
//! 1. drain queued commands
//! 2. compose the panel frame from the current board
//! 3. publish generation and population
//! 4. advance one generation if the tick interval has elapsed

use crate::command::CommandReceiver;
use crate::life::{LifeEngine, LifePalette};
use crate::{GridGeometry, PanelConfig, is_running};
use image::RgbImage;
use image::imageops;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Display loop rate used when none is configured.
pub const DEFAULT_FPS: u32 = 20;

/// Upper bound for the user-adjustable tick interval, in seconds.
pub const MAX_SECONDS_PER_TICK: f64 = 10.0;

/// Lock a mutex, recovering the data if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Settings ─────────────────────────────────────────────────────────

/// User-adjustable knobs, written by the server and read every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LifeSettings {
    /// Minimum seconds between generations (0-10). 0 advances every frame.
    pub seconds_per_tick: f64,
    /// Whether the display layer should overlay the generation counter
    pub show_generation_counter: bool,
    /// Brightness applied to the palette (0-100)
    pub brightness: u8,
}

impl LifeSettings {
    pub fn new(seconds_per_tick: f64) -> Self {
        let mut settings = Self::default();
        settings.set_seconds_per_tick(seconds_per_tick);
        settings
    }

    /// Clamp into `0..=MAX_SECONDS_PER_TICK`. Non-finite values reset to 0.
    pub fn set_seconds_per_tick(&mut self, value: f64) {
        self.seconds_per_tick = if value.is_finite() {
            value.clamp(0.0, MAX_SECONDS_PER_TICK)
        } else {
            0.0
        };
    }

    pub fn set_brightness(&mut self, value: u8) {
        self.brightness = value.min(100);
    }

    pub fn palette(&self) -> LifePalette {
        LifePalette::default().apply_brightness(self.brightness)
    }
}

impl Default for LifeSettings {
    fn default() -> Self {
        Self {
            seconds_per_tick: 0.0,
            show_generation_counter: false,
            brightness: 100,
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Snapshot of the simulation published after every frame.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct LifeStatus {
    /// Generations since the last reset
    pub generation: u64,
    /// Live cells on the whole board, margin included
    pub population: usize,
    /// Board width in cells
    pub width: usize,
    /// Board height in cells
    pub height: usize,
    /// Tick interval in effect for the last frame
    pub seconds_per_tick: f64,
    /// Whether the generation counter overlay is requested
    pub show_generation_counter: bool,
    /// Frames rendered since startup
    pub frames_rendered: u64,
    /// Server version
    pub version: String,
}

impl LifeStatus {
    pub fn new(geometry: GridGeometry) -> Self {
        Self {
            generation: 0,
            population: 0,
            width: geometry.width,
            height: geometry.height,
            seconds_per_tick: 0.0,
            show_generation_counter: false,
            frames_rendered: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn record(&mut self, engine: &LifeEngine, settings: &LifeSettings) {
        self.generation = engine.generation();
        self.population = engine.population();
        self.seconds_per_tick = settings.seconds_per_tick;
        self.show_generation_counter = settings.show_generation_counter;
        self.frames_rendered += 1;
    }
}

// ── Shared state ─────────────────────────────────────────────────────

/// Everything the render thread shares with the server.
#[derive(Clone)]
pub struct SharedDisplay {
    pub settings: Arc<Mutex<LifeSettings>>,
    pub status: Arc<Mutex<LifeStatus>>,
    /// Latest composed panel frame
    pub frame: Arc<Mutex<RgbImage>>,
}

impl SharedDisplay {
    pub fn new(settings: LifeSettings, geometry: GridGeometry, panel: PanelConfig) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
            status: Arc::new(Mutex::new(LifeStatus::new(geometry))),
            frame: Arc::new(Mutex::new(RgbImage::new(panel.cols, panel.rows))),
        }
    }

    pub fn settings(&self) -> LifeSettings {
        lock(&self.settings).clone()
    }

    pub fn status(&self) -> LifeStatus {
        lock(&self.status).clone()
    }

    pub fn frame(&self) -> RgbImage {
        lock(&self.frame).clone()
    }
}

// ── Frame composition ────────────────────────────────────────────────

/// Cut the visible panel window out of the rendered board.
///
/// Panel pixel `(x, y)` shows board cell `(x + margin, y + margin)`.
/// Any part of the window that falls outside the board stays black.
pub fn compose_panel_frame(board: &RgbImage, panel: PanelConfig, margin: u32) -> RgbImage {
    let mut frame = RgbImage::new(panel.cols, panel.rows);
    let window = imageops::crop_imm(board, margin, margin, panel.cols, panel.rows).to_image();
    imageops::replace(&mut frame, &window, 0, 0);
    frame
}

/// Run one display frame against the engine. See the module docs for the order.
pub fn render_frame(
    engine: &mut LifeEngine,
    commands: &mut CommandReceiver,
    display: &SharedDisplay,
    panel: PanelConfig,
    margin: u32,
    now: Instant,
) {
    let applied = engine.drain_commands(commands);
    if applied > 0 {
        tracing::debug!("Applied {} queued life command(s)", applied);
    }

    let settings = display.settings();

    let board = engine.render(settings.palette());
    *lock(&display.frame) = compose_panel_frame(&board, panel, margin);

    lock(&display.status).record(engine, &settings);

    engine.maybe_tick_at(now, settings.seconds_per_tick);
}

// ── Render loop ──────────────────────────────────────────────────────

/// Main render loop. Runs on a dedicated thread and owns the engine.
///
/// Returns when `running` is cleared or when every command sender has
/// been dropped and the queue is empty.
pub fn render_loop(
    mut engine: LifeEngine,
    mut commands: CommandReceiver,
    display: SharedDisplay,
    panel: PanelConfig,
    margin: u32,
    fps: u32,
    running: Arc<AtomicBool>,
) {
    let frame_duration = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut slow_frame_count = 0u64;

    tracing::info!(
        "Render thread started: {}x{} board, {} cells alive, {} fps",
        engine.grid().width(),
        engine.grid().height(),
        engine.population(),
        fps.max(1)
    );

    while is_running(&running) {
        let frame_start = Instant::now();

        render_frame(
            &mut engine,
            &mut commands,
            &display,
            panel,
            margin,
            frame_start,
        );

        if commands.is_closed() {
            tracing::info!("Render thread: command queue closed, shutting down.");
            break;
        }

        let frame_time = frame_start.elapsed();
        if frame_time > frame_duration {
            slow_frame_count += 1;
            if slow_frame_count <= 5 {
                tracing::warn!(
                    "Generation {} took {}ms (target: {}ms)",
                    engine.generation(),
                    frame_time.as_millis(),
                    frame_duration.as_millis()
                );
            }
        } else {
            thread::sleep(frame_duration - frame_time);
        }
    }

    if slow_frame_count > 0 {
        tracing::warn!("Render thread saw {} slow frames", slow_frame_count);
    }
    tracing::info!(
        "Render thread stopped at generation {}",
        engine.generation()
    );
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{LifeCommand, command_queue};
    use crate::life::{Cell, Grid};
    use crate::{Color, GRID_MARGIN};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    const SMALL_PANEL: PanelConfig = PanelConfig { rows: 4, cols: 4 };

    fn small_display() -> SharedDisplay {
        SharedDisplay::new(
            LifeSettings::default(),
            SMALL_PANEL.grid_geometry(2),
            SMALL_PANEL,
        )
    }

    fn block_engine() -> LifeEngine {
        let geometry = SMALL_PANEL.grid_geometry(2);
        let mut grid = Grid::new(geometry.width, geometry.height);
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            grid.set(x, y, Cell::Alive);
        }
        LifeEngine::from_grid(grid, StdRng::seed_from_u64(1)).unwrap()
    }

    // ── Settings tests ─────────────────────────────────────────────

    #[rstest]
    #[case(0.5, 0.5)]
    #[case(-1.0, 0.0)]
    #[case(25.0, MAX_SECONDS_PER_TICK)]
    #[case(f64::NAN, 0.0)]
    #[case(f64::INFINITY, 0.0)]
    fn test_seconds_per_tick_clamp(#[case] value: f64, #[case] expected: f64) {
        assert_eq!(LifeSettings::new(value).seconds_per_tick, expected);
    }

    #[test]
    fn brightness_is_capped_at_100() {
        let mut settings = LifeSettings::default();
        settings.set_brightness(250);
        assert_eq!(settings.brightness, 100);
        assert_eq!(settings.palette(), LifePalette::default());
    }

    #[test]
    fn settings_deserialize_from_json() {
        let settings: LifeSettings = serde_json::from_str(
            r#"{"seconds_per_tick":1.5,"show_generation_counter":true,"brightness":40}"#,
        )
        .unwrap();
        assert_eq!(settings.seconds_per_tick, 1.5);
        assert!(settings.show_generation_counter);
        assert_eq!(settings.brightness, 40);
    }

    // ── Composition tests ──────────────────────────────────────────

    #[test]
    fn panel_frame_is_offset_by_margin() {
        let mut board = RgbImage::new(10, 8);
        board.put_pixel(2, 2, Color::WHITE.to_rgb());
        board.put_pixel(1, 1, Color::new(9, 9, 9).to_rgb());

        let frame = compose_panel_frame(&board, SMALL_PANEL, 2);

        assert_eq!(frame.dimensions(), (4, 4));
        assert_eq!(*frame.get_pixel(0, 0), Color::WHITE.to_rgb());
        assert!(frame.pixels().filter(|p| p.0 == [9, 9, 9]).count() == 0);
    }

    #[test]
    fn panel_frame_outside_board_is_black() {
        let board = RgbImage::from_pixel(5, 5, Color::WHITE.to_rgb());
        let frame = compose_panel_frame(&board, SMALL_PANEL, 3);

        assert_eq!(*frame.get_pixel(0, 0), Color::WHITE.to_rgb());
        assert_eq!(*frame.get_pixel(1, 1), Color::WHITE.to_rgb());
        assert_eq!(*frame.get_pixel(2, 2), Color::BLACK.to_rgb());
        assert_eq!(*frame.get_pixel(3, 0), Color::BLACK.to_rgb());
    }

    #[test]
    fn default_geometry_frame_matches_panel() {
        let panel = PanelConfig::default();
        let geometry = panel.grid_geometry(GRID_MARGIN);
        let board = RgbImage::new(geometry.width as u32, geometry.height as u32);
        assert_eq!(
            compose_panel_frame(&board, panel, GRID_MARGIN).dimensions(),
            (64, 64)
        );
    }

    // ── Frame tests ────────────────────────────────────────────────

    #[test]
    fn render_frame_publishes_status_and_frame() {
        let mut engine = block_engine();
        let (_tx, mut rx) = command_queue();
        let display = small_display();
        let now = engine.last_tick();

        render_frame(&mut engine, &mut rx, &display, SMALL_PANEL, 2, now);

        let status = display.status();
        assert_eq!(status.population, 4);
        assert_eq!(status.generation, 0);
        assert_eq!(status.frames_rendered, 1);

        let frame = display.frame();
        assert_eq!(*frame.get_pixel(0, 0), Color::WHITE.to_rgb());
        assert_eq!(*frame.get_pixel(1, 1), Color::WHITE.to_rgb());
        assert_eq!(*frame.get_pixel(2, 2), Color::BLACK.to_rgb());

        // Zero interval: the tick happens after publishing.
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn render_frame_applies_commands_before_ticking() {
        let mut engine = block_engine();
        engine.advance_generation();
        let (tx, mut rx) = command_queue();
        let display = small_display();
        lock(&display.settings).set_seconds_per_tick(5.0);

        tx.send(LifeCommand::Reset).unwrap();
        let now = engine.last_tick() + Duration::from_millis(50);
        render_frame(&mut engine, &mut rx, &display, SMALL_PANEL, 2, now);

        assert_eq!(display.status().generation, 0);
        assert_eq!(display.status().seconds_per_tick, 5.0);
        assert_eq!(engine.generation(), 0);
    }

    #[test]
    fn render_frame_respects_brightness() {
        let mut engine = block_engine();
        let (_tx, mut rx) = command_queue();
        let display = small_display();
        lock(&display.settings).set_brightness(50);

        render_frame(&mut engine, &mut rx, &display, SMALL_PANEL, 2, Instant::now());

        assert_eq!(
            *display.frame().get_pixel(0, 0),
            Color::new(127, 127, 127).to_rgb()
        );
    }

    #[test]
    fn render_loop_exits_when_queue_closes() {
        let engine = block_engine();
        let (tx, rx) = command_queue();
        let display = small_display();
        let running = Arc::new(AtomicBool::new(true));

        tx.send(LifeCommand::AddNoise).unwrap();
        drop(tx);

        render_loop(engine, rx, display.clone(), SMALL_PANEL, 2, 1000, running);

        assert!(display.status().frames_rendered >= 1);
    }

    #[test]
    fn render_loop_does_nothing_when_stopped() {
        let engine = block_engine();
        let (_tx, rx) = command_queue();
        let display = small_display();
        let running = Arc::new(AtomicBool::new(false));

        render_loop(engine, rx, display.clone(), SMALL_PANEL, 2, 20, running);

        assert_eq!(display.status().frames_rendered, 0);
    }
}
