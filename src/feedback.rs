// Feedback Module - Mirrors engine state onto the controller's pads and scene buttons
use crate::input::SCENE_BASE;
use crate::state::State;
use crate::types::{hsv_to_rgb, table_color, Mode, Rgb, GRID_CELLS, GRID_SIZE};

/// Number of scene-launch indicators down the right edge of the grid
pub const SCENE_BUTTONS: u8 = 8;

/// Highlight offset added to the color index of the last-picked spectrum pads
const HIGHLIGHT_BOOST: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Off,
    On,
    Blink,
}

impl IndicatorState {
    /// Note velocity the APC expects for single-color LEDs
    pub fn velocity(self) -> u8 {
        match self {
            IndicatorState::Off => 0,
            IndicatorState::On => 1,
            IndicatorState::Blink => 2,
        }
    }
}

/// One outbound LED command for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCommand {
    /// Pad `cell` (0-63) to controller color-table entry `color` (0-127)
    SetGridColor { cell: u8, color: u8 },
    /// Single-color indicator `id` to `state`
    SetIndicator { id: u8, state: IndicatorState },
}

/// Quantize a color to the APC's table by packing two bits per channel
pub fn apc_color_index(rgb: Rgb) -> u8 {
    let quantize = |c: u8| (c / 64).min(3);
    let index = 1 + quantize(rgb.r) + quantize(rgb.g) * 4 + quantize(rgb.b) * 16;
    index.clamp(1, 127)
}

/// Full set of commands describing the current state
pub fn render_feedback(state: &State) -> Vec<GridCommand> {
    let mut commands = mode_indicators(state.mode);
    commands.extend(render_grid(state));
    commands
}

/// Scene strip with exactly the active mode lit
pub fn mode_indicators(mode: Mode) -> Vec<GridCommand> {
    (0..SCENE_BUTTONS)
        .map(|i| GridCommand::SetIndicator {
            id: SCENE_BASE + i,
            state: if i as usize == mode.ordinal() {
                IndicatorState::On
            } else {
                IndicatorState::Off
            },
        })
        .collect()
}

/// Pad grid contents for the active mode
pub fn render_grid(state: &State) -> Vec<GridCommand> {
    match state.mode {
        Mode::Game => game_grid(state),
        Mode::Spectrum => spectrum_grid(state),
        _ => palette_grid(),
    }
}

fn cell_of(row: usize, col: usize) -> u8 {
    (row * GRID_SIZE + col) as u8
}

// Every row repeats the eight-color picker
fn palette_grid() -> Vec<GridCommand> {
    let mut commands = Vec::with_capacity(GRID_CELLS);
    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            commands.push(GridCommand::SetGridColor {
                cell: cell_of(row, col),
                color: table_color(col),
            });
        }
    }
    commands
}

/// Pads covered by the square once rounded to the grid, as (row, col) ranges
pub fn game_footprint(state: &State) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let size = state.game.size as usize;
    let top = round_to_grid(state.game.pos.1);
    let left = round_to_grid(state.game.pos.0);
    (
        top..(top + size).min(GRID_SIZE),
        left..(left + size).min(GRID_SIZE),
    )
}

fn round_to_grid(coord: f64) -> usize {
    if coord.is_nan() {
        return 0;
    }
    coord.round().clamp(0.0, GRID_SIZE as f64) as usize
}

// Blank grid with the square painted in the accent color
fn game_grid(state: &State) -> Vec<GridCommand> {
    let mut commands: Vec<GridCommand> = (0..GRID_CELLS)
        .map(|cell| GridCommand::SetGridColor { cell: cell as u8, color: 0 })
        .collect();

    let color = table_color(state.accent_color);
    let (rows, cols) = game_footprint(state);
    for row in rows {
        for col in cols.clone() {
            commands.push(GridCommand::SetGridColor { cell: cell_of(row, col), color });
        }
    }
    commands
}

// Hue across columns; each four-row band fades saturation and value downwards
fn spectrum_grid(state: &State) -> Vec<GridCommand> {
    let band = GRID_SIZE / 2;
    let highlighted = [state.spectrum.primary_cell, state.spectrum.secondary_cell];
    let mut commands = Vec::with_capacity(GRID_CELLS);

    for row in 0..GRID_SIZE {
        let falloff = 1.0 - (row % band) as f64 / (band - 1) as f64;
        let sat = 0.55 + 0.45 * falloff;
        let val = 0.65 + 0.35 * falloff;

        for col in 0..GRID_SIZE {
            let cell = cell_of(row, col);
            let hue = col as f64 / GRID_SIZE as f64;
            let mut color = apc_color_index(hsv_to_rgb(hue, sat, val));
            if highlighted.contains(&Some(cell)) {
                color = color.saturating_add(HIGHLIGHT_BOOST).min(127);
            }
            commands.push(GridCommand::SetGridColor { cell, color });
        }
    }
    commands
}

/// Everything off, sent before the process lets go of the controller
pub fn blank_commands() -> Vec<GridCommand> {
    let mut commands: Vec<GridCommand> = (0..GRID_CELLS)
        .map(|cell| GridCommand::SetGridColor { cell: cell as u8, color: 0 })
        .collect();
    commands.extend((0..SCENE_BUTTONS).map(|i| GridCommand::SetIndicator {
        id: SCENE_BASE + i,
        state: IndicatorState::Off,
    }));
    commands
}
