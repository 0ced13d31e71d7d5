// Shared types module - Colors, modes and fixed tables used across the engine

/// Number of pixels on the tree
pub const LED_COUNT: usize = 512;

/// Side length of the controller's pad grid
pub const GRID_SIZE: usize = 8;

/// Number of pads on the controller's grid
pub const GRID_CELLS: usize = GRID_SIZE * GRID_SIZE;

// RGB color representation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Multiply every channel by `factor * brightness`, rounding and clamping to 0-255
    pub fn scale(self, factor: f64, brightness: f64) -> Rgb {
        let k = factor * brightness;
        Rgb {
            r: scale_channel(self.r, k),
            g: scale_channel(self.g, k),
            b: scale_channel(self.b, k),
        }
    }

    /// Channel-wise addition clamped at 255
    pub fn saturating_add(self, other: Rgb) -> Rgb {
        Rgb {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
        }
    }

    /// Build a color from floating point channels in 0.0-1.0
    pub fn from_unit(r: f64, g: f64, b: f64) -> Rgb {
        Rgb {
            r: scale_channel(255, r),
            g: scale_channel(255, g),
            b: scale_channel(255, b),
        }
    }
}

fn scale_channel(channel: u8, k: f64) -> u8 {
    let v = channel as f64 * k;
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// One rendered frame for the tree, always `LED_COUNT` long
pub type PixelBuffer = Vec<Rgb>;

/// The eight colors selectable from the pads and faders
pub const PALETTE: [Rgb; 8] = [
    Rgb::new(0, 0, 0),       // 0 off
    Rgb::new(255, 0, 0),     // 1 red
    Rgb::new(0, 255, 0),     // 2 green
    Rgb::new(0, 0, 255),     // 3 blue
    Rgb::new(255, 255, 0),   // 4 yellow
    Rgb::new(255, 0, 255),   // 5 magenta
    Rgb::new(0, 255, 255),   // 6 cyan
    Rgb::new(255, 255, 255), // 7 white
];

/// APC Mini Mk2 velocity-table entries matching `PALETTE` slot for slot
pub const LED_COLOR_TABLE: [u8; 8] = [
    0,  // off
    5,  // red (#FF0000)
    21, // green (#00FF00)
    45, // blue (#0000FF)
    13, // yellow (#FFFF00)
    53, // magenta (#FF00FF)
    90, // cyan-ish (#38FFCC)
    3,  // white (#FFFFFF)
];

/// Palette lookup that never panics on a stale or out-of-range index
pub fn palette_color(index: usize) -> Rgb {
    PALETTE[index.min(PALETTE.len() - 1)]
}

/// Controller color-table entry for a palette index
pub fn table_color(index: usize) -> u8 {
    LED_COLOR_TABLE[index % LED_COLOR_TABLE.len()]
}

// Animation mode - ordinals match the scene-select buttons top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Solid,
    Twinkle,
    Swirl,
    Chase,
    Sparkle,
    Game,
    Spectrum,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Solid,
        Mode::Twinkle,
        Mode::Swirl,
        Mode::Chase,
        Mode::Sparkle,
        Mode::Game,
        Mode::Spectrum,
    ];

    /// Mode for a scene-button ordinal, clamped to the last mode
    pub fn from_ordinal(ordinal: usize) -> Mode {
        Mode::ALL[ordinal.min(Mode::ALL.len() - 1)]
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Solid => "solid",
            Mode::Twinkle => "twinkle",
            Mode::Swirl => "swirl",
            Mode::Chase => "chase",
            Mode::Sparkle => "sparkle",
            Mode::Game => "game",
            Mode::Spectrum => "spectrum",
        }
    }
}

/// Standard HSV to RGB conversion; all inputs in 0.0-1.0, hue wraps
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let h = if h.is_finite() { h.rem_euclid(1.0) } else { 0.0 };
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);

    if s == 0.0 {
        return Rgb::from_unit(v, v, v);
    }

    let sector = h * 6.0;
    let i = sector.floor();
    let f = sector - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match i as u8 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb::from_unit(r, g, b)
}

/// Linear interpolation from `a` to `b`
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
