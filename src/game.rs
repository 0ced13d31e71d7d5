// Game Module - Bouncing square on the pad grid; hit it to level up
use rand::Rng;
use std::f64::consts::TAU;

use crate::state::{State, FLASH_SECONDS, GAME_LEVELS};
use crate::types::{Mode, GRID_SIZE, PALETTE};

const GRID: f64 = GRID_SIZE as f64;

/// What a game tick did, so the caller knows whether the pad grid needs redrawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Reset,
    Moved,
}

/// Start a new game at level 0
pub fn reset<R: Rng>(state: &mut State, rng: &mut R) {
    state.game.active = true;
    state.game.level = 0;
    apply_level(state, rng);
}

/// Stop advancing physics; the last position stays for rendering
pub fn deactivate(state: &mut State) {
    state.game.active = false;
}

/// Load the current level's size and speed with a fresh random position and heading
pub fn apply_level<R: Rng>(state: &mut State, rng: &mut R) {
    let cfg = state.game.level_config();
    let room = GRID - cfg.size as f64;
    state.game.size = cfg.size;
    state.game.pos = (rng.gen_range(0.0..=room), rng.gen_range(0.0..=room));

    let angle = rng.gen_range(0.0..TAU);
    state.game.vel = (angle.cos() * cfg.speed, angle.sin() * cfg.speed);
}

/// Advance the game by `dt` seconds
pub fn tick<R: Rng>(state: &mut State, dt: f64, rng: &mut R) -> TickOutcome {
    if state.mode != Mode::Game {
        deactivate(state);
        return TickOutcome::Idle;
    }
    if !state.game.active {
        reset(state, rng);
        return TickOutcome::Reset;
    }

    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    let size = state.game.level_config().size as f64;
    let game = &mut state.game;

    let (x, vx) = bounce(game.pos.0 + game.vel.0 * dt, game.vel.0, size);
    let (y, vy) = bounce(game.pos.1 + game.vel.1 * dt, game.vel.1, size);
    game.pos = (x, y);
    game.vel = (vx, vy);

    game.flash_timer = (game.flash_timer - dt).max(0.0);
    TickOutcome::Moved
}

// Reflect one axis off the grid walls
fn bounce(mut coord: f64, mut vel: f64, size: f64) -> (f64, f64) {
    if coord < 0.0 {
        coord = -coord;
        vel = vel.abs();
    }
    if coord + size > GRID {
        coord = GRID - size;
        vel = -vel.abs();
    }
    (coord.clamp(0.0, GRID - size), vel)
}

/// Half-open containment of pad (row, col) in the floating square
pub fn is_hit(state: &State, row: usize, col: usize) -> bool {
    let size = state.game.size as f64;
    let (px, py) = state.game.pos;
    let (row, col) = (row as f64, col as f64);
    px <= col && col < px + size && py <= row && row < py + size
}

/// Score a hit: cycle colors, level up and flash
pub fn handle_hit<R: Rng>(state: &mut State, rng: &mut R) {
    state.base_color = (state.base_color + 1) % PALETTE.len();
    state.accent_color = (state.accent_color + 2) % PALETTE.len();

    if state.game.level < GAME_LEVELS.len() - 1 {
        state.game.level += 1;
        apply_level(state, rng);
    }
    state.game.flash_timer = FLASH_SECONDS;
    tracing::info!(level = state.game.level, size = state.game.size, "Game hit");
}
