// State Module - The single mutable record shared by the render loop and input mapper
use crate::types::{Mode, PixelBuffer, Rgb, LED_COUNT};

/// Size and speed for one game level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameLevel {
    pub size: u8,
    pub speed: f64,
}

pub const GAME_LEVELS: [GameLevel; 5] = [
    GameLevel { size: 4, speed: 2.0 },
    GameLevel { size: 3, speed: 2.5 },
    GameLevel { size: 3, speed: 3.0 },
    GameLevel { size: 2, speed: 3.5 },
    GameLevel { size: 1, speed: 4.0 },
];

/// Seconds of boosted brightness after a hit
pub const FLASH_SECONDS: f64 = 1.5;

// Bouncing-square mini-game state, in grid units (0.0-8.0 on both axes)
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub active: bool,
    pub level: usize,
    pub pos: (f64, f64),
    pub vel: (f64, f64),
    pub size: u8,
    pub flash_timer: f64,
}

impl Default for GameState {
    fn default() -> Self {
        GameState {
            active: false,
            level: 0,
            pos: (2.0, 2.0),
            vel: (1.0, 0.8),
            size: GAME_LEVELS[0].size,
            flash_timer: 0.0,
        }
    }
}

impl GameState {
    pub fn level_config(&self) -> GameLevel {
        GAME_LEVELS[self.level.min(GAME_LEVELS.len() - 1)]
    }
}

/// Last twinkle frame and when it should be regenerated
#[derive(Debug, Clone, PartialEq)]
pub struct TwinkleCache {
    pub next_refresh: f64,
    pub frame: PixelBuffer,
}

impl Default for TwinkleCache {
    fn default() -> Self {
        TwinkleCache {
            next_refresh: 0.0,
            frame: vec![Rgb::BLACK; LED_COUNT],
        }
    }
}

impl TwinkleCache {
    /// True once `t` has reached the refresh deadline
    pub fn is_stale(&self, t: f64) -> bool {
        t >= self.next_refresh
    }

    pub fn store(&mut self, t: f64, period: f64, frame: PixelBuffer) {
        self.next_refresh = t + period;
        self.frame = frame;
    }
}

// Two-hue wash parameters plus the pads last used to pick each hue
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumParams {
    pub primary_hue: f64,
    pub secondary_hue: f64,
    pub saturation: f64,
    pub value: f64,
    pub spread: f64,
    pub contrast: f64,
    pub primary_cell: Option<u8>,
    pub secondary_cell: Option<u8>,
}

impl Default for SpectrumParams {
    fn default() -> Self {
        SpectrumParams {
            primary_hue: 0.0,
            secondary_hue: 0.6,
            saturation: 1.0,
            value: 1.0,
            spread: 0.5,
            contrast: 1.0,
            primary_cell: None,
            secondary_cell: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub mode: Mode,
    pub base_color: usize,
    pub accent_color: usize,
    pub brightness: f64,
    pub speed: f64,
    pub twinkle_density: f64,
    pub chase_length: f64,
    pub swirl_phase: f64,
    pub sparkle_chance: f64,
    pub spectrum: SpectrumParams,
    pub twinkle: TwinkleCache,
    pub game: GameState,
}

impl Default for State {
    fn default() -> Self {
        State {
            mode: Mode::Solid,
            base_color: 1,
            accent_color: 2,
            brightness: 1.0,
            speed: 0.5,
            twinkle_density: 0.2,
            chase_length: 0.2,
            swirl_phase: 0.0,
            sparkle_chance: 0.1,
            spectrum: SpectrumParams::default(),
            twinkle: TwinkleCache::default(),
            game: GameState::default(),
        }
    }
}
