// Input Module - Fader and pad events mapped onto engine state
use rand::Rng;
use std::f64::consts::TAU;

use crate::game;
use crate::state::State;
use crate::types::{Mode, GRID_CELLS, GRID_SIZE, PALETTE};

/// First scene-launch button; the following six select the remaining modes
pub const SCENE_BASE: u8 = 0x70;

/// Logical controller events, already resolved from the wire format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerEvent {
    /// Fader `control` (1-9) moved to `value` (0.0-1.0)
    Continuous { control: u8, value: f64 },
    /// Pad or button `cell` pressed or released
    Discrete { cell: u8, pressed: bool, velocity: u8 },
}

impl ControllerEvent {
    /// True for a pad or button going down; releases and zero-velocity notes are not presses
    pub fn is_press(&self) -> bool {
        matches!(*self, ControllerEvent::Discrete { pressed: true, velocity, .. } if velocity > 0)
    }
}

/// How an event affected the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Unhandled,
    Parameter,
    /// A press was consumed; the feedback grid must be redrawn
    Press,
}

pub fn apply_event<R: Rng>(state: &mut State, event: ControllerEvent, rng: &mut R) -> Applied {
    match event {
        ControllerEvent::Continuous { control, value } => {
            if apply_continuous(state, control, value) {
                Applied::Parameter
            } else {
                Applied::Unhandled
            }
        }
        ControllerEvent::Discrete { cell, .. } => {
            if event.is_press() && apply_press(state, cell, rng) {
                Applied::Press
            } else {
                Applied::Unhandled
            }
        }
    }
}

// Palette slot nearest to a fader position
fn fader_color(value: f64) -> usize {
    (value * (PALETTE.len() - 1) as f64).round() as usize
}

/// Apply a fader move; returns false for controls this engine does not map
pub fn apply_continuous(state: &mut State, control: u8, value: f64) -> bool {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let spectrum = state.mode == Mode::Spectrum;

    match control {
        1 => {
            state.base_color = fader_color(value);
            if spectrum {
                state.spectrum.primary_hue = value;
                state.spectrum.primary_cell = Some(fader_color(value) as u8);
            }
        }
        2 => {
            state.accent_color = fader_color(value);
            if spectrum {
                state.spectrum.secondary_hue = value;
                // secondary band starts at row 4
                state.spectrum.secondary_cell = Some((4 * GRID_SIZE + fader_color(value)) as u8);
            }
        }
        3 => state.brightness = 0.1 + 0.9 * value,
        4 => state.speed = value,
        5 if spectrum => state.spectrum.spread = 0.05 + 1.2 * value,
        5 => state.twinkle_density = value,
        6 if spectrum => state.spectrum.value = 0.35 + 0.65 * value,
        6 => state.chase_length = 0.05 + 0.9 * value,
        7 if spectrum => state.spectrum.saturation = 0.4 + 0.6 * value,
        7 => state.sparkle_chance = value,
        8 => state.swirl_phase = value * TAU,
        9 => {
            state.brightness = 0.05 + value;
            if spectrum {
                state.spectrum.contrast = 0.35 + 0.65 * value;
            }
        }
        _ => return false,
    }
    true
}

/// Apply a pad or scene-button press; returns false if nothing changed
pub fn apply_press<R: Rng>(state: &mut State, cell: u8, rng: &mut R) -> bool {
    if (SCENE_BASE..SCENE_BASE + Mode::ALL.len() as u8).contains(&cell) {
        select_mode(state, Mode::from_ordinal((cell - SCENE_BASE) as usize), rng);
        return true;
    }

    let index = cell as usize;
    if index >= GRID_CELLS {
        return false;
    }
    let (row, col) = (index / GRID_SIZE, index % GRID_SIZE);

    match state.mode {
        Mode::Game => {
            // misses are swallowed so stray presses never repaint the tree
            if game::is_hit(state, row, col) {
                game::handle_hit(state, rng);
            }
            true
        }
        Mode::Spectrum => {
            let hue = col as f64 / GRID_SIZE as f64;
            if row < GRID_SIZE / 2 {
                state.spectrum.primary_hue = hue;
                state.spectrum.primary_cell = Some(cell);
            } else {
                state.spectrum.secondary_hue = hue;
                state.spectrum.secondary_cell = Some(cell);
            }
            true
        }
        _ => match row {
            0 => {
                state.base_color = col;
                true
            }
            1 => {
                state.accent_color = col;
                true
            }
            _ => false,
        },
    }
}

/// Switch modes, resetting the game when entering it and parking it when leaving
pub fn select_mode<R: Rng>(state: &mut State, mode: Mode, rng: &mut R) {
    let previous = state.mode;
    state.mode = mode;
    if mode == Mode::Game {
        game::reset(state, rng);
    } else {
        game::deactivate(state);
    }
    if previous != mode {
        tracing::info!(from = previous.name(), to = mode.name(), "Mode changed");
    }
}
