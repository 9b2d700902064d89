//! Game of Life engine: the cell grid, Conway's B3/S23 rule, and the
//! command handling that lets other tasks reset or perturb the board.
//!
//! The grid is bounded. Cells past the edge count as dead, so a pattern
//! that reaches the border does not reappear on the opposite side.
//!
//! The engine performs no I/O and never blocks. A display loop drives it
//! once per frame: drain the command queue, render, then `maybe_tick`.

use crate::Color;
use crate::command::{CommandReceiver, LifeCommand};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Each cell draws a value in `0..RNG_RANGE` and is alive if it beats the cutoff.
pub const RNG_RANGE: u8 = 100;

/// Cutoff used for the initial board and for resets (~49% alive).
pub const INIT_CUTOFF: u8 = 50;

/// Cutoff used when sprinkling noise onto a running board (~4% alive).
pub const NOISE_CUTOFF: u8 = 95;

// ── Cell ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cell {
    #[default]
    Dead,
    Alive,
}

impl Cell {
    pub const fn is_alive(self) -> bool {
        matches!(self, Cell::Alive)
    }

    /// Next state under Conway's rules:
    /// 1. Live cell with 2-3 neighbors survives
    /// 2. Dead cell with exactly 3 neighbors becomes alive
    /// 3. All other cases result in death
    pub const fn evolve(self, neighbors: u8) -> Self {
        match (self, neighbors) {
            (Cell::Alive, 2 | 3) => Cell::Alive,
            (Cell::Dead, 3) => Cell::Alive,
            _ => Cell::Dead,
        }
    }
}

// ── Grid ─────────────────────────────────────────────────────────────

/// Fixed-size 2D board of cells, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid with every cell dead.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::Dead; width * height],
        }
    }

    pub const fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    const fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        (x < self.width && y < self.height).then(|| self.cells[self.index(x, y)])
    }

    /// Set a cell. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.cells[idx] = cell;
        }
    }

    /// Number of live cells.
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    /// Count live cells in the Moore neighborhood. Positions outside the
    /// grid contribute nothing.
    pub fn live_neighbors(&self, x: usize, y: usize) -> u8 {
        let x_range = x.saturating_sub(1)..=(x + 1).min(self.width - 1);
        let y_range = y.saturating_sub(1)..=(y + 1).min(self.height - 1);

        y_range
            .flat_map(|ny| x_range.clone().map(move |nx| (nx, ny)))
            .filter(|&(nx, ny)| (nx, ny) != (x, y))
            .filter(|&(nx, ny)| self.cells[self.index(nx, ny)].is_alive())
            .count() as u8
    }

    /// Compute the next generation from this one. Every cell reads the
    /// current board, so the update is fully synchronous.
    pub fn next_generation(&self) -> Self {
        let cells = self
            .iter_cells()
            .map(|(x, y, cell)| cell.evolve(self.live_neighbors(x, y)))
            .collect();

        Self {
            width: self.width,
            height: self.height,
            cells,
        }
    }

    /// Bring to life every cell that is alive in `other`. Cells already
    /// alive here are never cleared. Both grids must share dimensions.
    pub fn merge_alive(&mut self, other: &Grid) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        self.cells
            .iter_mut()
            .zip(&other.cells)
            .filter(|(_, theirs)| theirs.is_alive())
            .for_each(|(ours, _)| *ours = Cell::Alive);
    }

    /// Iterate over all cells with their positions, row by row.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &cell)| (i % self.width, i / self.width, cell))
    }
}

/// Build a grid where each cell is alive when a uniform draw from
/// `0..RNG_RANGE` is strictly greater than `cutoff`.
///
/// A cutoff of 50 gives roughly half the board alive; 95 gives a sparse
/// sprinkle. Cutoffs at or above `RNG_RANGE - 1` produce an empty grid.
pub fn random_grid<R: Rng>(width: usize, height: usize, cutoff: u8, rng: &mut R) -> Grid {
    let cells = (0..width * height)
        .map(|_| {
            if rng.random_range(0..RNG_RANGE) > cutoff {
                Cell::Alive
            } else {
                Cell::Dead
            }
        })
        .collect();

    Grid {
        width,
        height,
        cells,
    }
}

// ── Palette ──────────────────────────────────────────────────────────

/// Colors used when turning the grid into pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifePalette {
    pub alive: Color,
    pub dead: Color,
}

impl LifePalette {
    pub fn apply_brightness(self, brightness: u8) -> Self {
        Self {
            alive: self.alive.apply_brightness(brightness),
            dead: self.dead.apply_brightness(brightness),
        }
    }
}

impl Default for LifePalette {
    fn default() -> Self {
        Self {
            alive: Color::WHITE,
            dead: Color::BLACK,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Owns the board, the generation counter, and the tick clock.
///
/// The engine is the only writer of its grid. Other tasks influence it
/// exclusively through [`LifeCommand`]s sent over the command queue.
pub struct LifeEngine {
    grid: Grid,
    generation: u64,
    last_tick: Instant,
    init_cutoff: u8,
    noise_cutoff: u8,
    rng: StdRng,
}

impl LifeEngine {
    /// Create an engine with a randomly seeded board, using OS entropy.
    pub fn new(
        width: usize,
        height: usize,
        init_cutoff: u8,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_rng(width, height, init_cutoff, StdRng::from_os_rng())
    }

    /// Create an engine driven by the given generator. Seeding the
    /// generator makes every board and noise injection reproducible.
    pub fn with_rng(
        width: usize,
        height: usize,
        init_cutoff: u8,
        mut rng: StdRng,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if width == 0 || height == 0 {
            return Err(format!("Grid dimensions must be positive, got {width}x{height}").into());
        }

        let init_cutoff = init_cutoff.min(RNG_RANGE);
        let grid = random_grid(width, height, init_cutoff, &mut rng);

        Ok(Self {
            grid,
            generation: 0,
            last_tick: Instant::now(),
            init_cutoff,
            noise_cutoff: NOISE_CUTOFF,
            rng,
        })
    }

    /// Start from an explicit board instead of a random one.
    pub fn from_grid(grid: Grid, rng: StdRng) -> Result<Self, Box<dyn std::error::Error>> {
        let (width, height) = grid.dimensions();
        if width == 0 || height == 0 {
            return Err(format!("Grid dimensions must be positive, got {width}x{height}").into());
        }

        Ok(Self {
            grid,
            generation: 0,
            last_tick: Instant::now(),
            init_cutoff: INIT_CUTOFF,
            noise_cutoff: NOISE_CUTOFF,
            rng,
        })
    }

    pub fn with_noise_cutoff(mut self, cutoff: u8) -> Self {
        self.noise_cutoff = cutoff.min(RNG_RANGE);
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_tick(&self) -> Instant {
        self.last_tick
    }

    /// Live cell count, recomputed from the board on every call.
    pub fn population(&self) -> usize {
        self.grid.population()
    }

    /// Advance one generation now.
    pub fn advance_generation(&mut self) {
        self.advance_at(Instant::now());
    }

    fn advance_at(&mut self, now: Instant) {
        self.grid = self.grid.next_generation();
        self.generation += 1;
        self.last_tick = now;
    }

    pub fn handle_command(&mut self, command: LifeCommand) {
        let (width, height) = self.grid.dimensions();
        match command {
            LifeCommand::Reset => {
                self.grid = random_grid(width, height, self.init_cutoff, &mut self.rng);
                self.generation = 0;
                tracing::info!("Game of Life reset ({} cells alive)", self.population());
            }
            LifeCommand::AddNoise => {
                let noise = random_grid(width, height, self.noise_cutoff, &mut self.rng);
                self.grid.merge_alive(&noise);
                tracing::info!("Game of Life noise added ({} cells alive)", self.population());
            }
        }
    }

    /// Apply every queued command in arrival order. Returns how many were applied.
    pub fn drain_commands(&mut self, commands: &mut CommandReceiver) -> usize {
        let mut applied = 0;
        while let Some(command) = commands.try_next() {
            self.handle_command(command);
            applied += 1;
        }
        applied
    }

    /// Advance one generation if at least `seconds_per_tick` has passed
    /// since the last advance. Never advances more than once per call.
    pub fn maybe_tick(&mut self, seconds_per_tick: f64) -> bool {
        self.maybe_tick_at(Instant::now(), seconds_per_tick)
    }

    /// Same as [`maybe_tick`](Self::maybe_tick) with an explicit clock reading.
    pub fn maybe_tick_at(&mut self, now: Instant, seconds_per_tick: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_tick).as_secs_f64();
        // NaN compares false, so a NaN interval stalls the board.
        if elapsed >= seconds_per_tick {
            self.advance_at(now);
            true
        } else {
            false
        }
    }

    /// Turn the board into an image of the same dimensions. Does not mutate the engine.
    pub fn render(&self, palette: LifePalette) -> RgbImage {
        let (width, height) = self.grid.dimensions();
        let alive = palette.alive.to_rgb();
        let dead = palette.dead.to_rgb();

        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            match self.grid.get(x as usize, y as usize) {
                Some(Cell::Alive) => alive,
                _ => dead,
            }
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
