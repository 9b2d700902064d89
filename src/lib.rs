//! Game of Life screensaver for an RGB LED matrix panel.
//!
//! This crate provides:
//! - Panel and simulation grid geometry
//! - A color type with brightness scaling
//! - Signal handling for clean shutdown
//!
//! It also re-exports the life engine, command queue, render loop, and
//! HTTP server modules used by the main binary.

pub mod command;
pub mod life;
pub mod render;
pub mod server;

pub use command::{CommandReceiver, CommandSender, LifeCommand, command_queue};
pub use life::{Cell, Grid, LifeEngine, random_grid};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Panel configuration ────────────────────────────────────────────

/// Cells kept hidden around the visible area so patterns can drift
/// off-panel and come back instead of dying at the panel edge.
pub const GRID_MARGIN: u32 = 10;

/// Configuration for the LED panel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of pixels on the panel.
    pub fn pixel_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Simulation grid that backs this panel with `margin` hidden cells on every side.
    pub fn grid_geometry(&self, margin: u32) -> GridGeometry {
        GridGeometry {
            width: (self.cols * 2 + margin * 2) as usize,
            height: (self.rows + margin * 2) as usize,
            margin,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 64, cols: 64 }
    }
}

/// Size of the simulation grid and where the panel window sits inside it.
///
/// The grid is twice the panel width so the screensaver has room to
/// evolve beyond what is shown; only the top-left window at
/// `(margin, margin)` is ever composited onto the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
    pub margin: u32,
}

impl GridGeometry {
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

// ── Color ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Apply brightness scaling (0-100) to this color.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }

    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// Both the render thread and the HTTP server watch the returned flag,
/// so a single signal stops the whole process cleanly.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
