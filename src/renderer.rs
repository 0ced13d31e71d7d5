// Renderer Module - Per-mode animation algorithms producing one tree frame
use rand::Rng;
use std::f64::consts::TAU;

use crate::state::State;
use crate::types::{hsv_to_rgb, lerp, palette_color, Mode, PixelBuffer, Rgb, LED_COUNT};

// Parameters clamped into their documented ranges before any math runs
struct Levels {
    base: Rgb,
    accent: Rgb,
    brightness: f64,
    speed: f64,
}

impl Levels {
    fn from_state(state: &State) -> Self {
        Levels {
            base: palette_color(state.base_color),
            accent: palette_color(state.accent_color),
            brightness: unit(state.brightness),
            speed: unit(state.speed),
        }
    }

    /// Speed floored so animations never freeze completely
    fn min_speed(&self) -> f64 {
        self.speed.max(0.05)
    }
}

fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Render one frame of the active mode at `t` seconds since engine start
pub fn render<R: Rng>(state: &mut State, t: f64, rng: &mut R) -> PixelBuffer {
    let t = if t.is_finite() { t.max(0.0) } else { 0.0 };
    let levels = Levels::from_state(state);

    let frame = match state.mode {
        Mode::Solid => render_solid(&levels),
        Mode::Twinkle => render_twinkle(state, &levels, t, rng),
        Mode::Swirl => render_swirl(state, &levels, t),
        Mode::Chase => render_chase(state, &levels, t),
        Mode::Sparkle => render_sparkle(state, &levels, rng),
        Mode::Game => render_game(state, &levels, t),
        Mode::Spectrum => render_spectrum(state, &levels, t),
    };
    debug_assert_eq!(frame.len(), LED_COUNT);
    frame
}

fn render_solid(levels: &Levels) -> PixelBuffer {
    vec![levels.base.scale(1.0, levels.brightness); LED_COUNT]
}

// Twinkle regenerates on its own slower clock and replays the cached frame in between
fn render_twinkle<R: Rng>(state: &mut State, levels: &Levels, t: f64, rng: &mut R) -> PixelBuffer {
    if state.twinkle.is_stale(t) || state.twinkle.frame.len() != LED_COUNT {
        let period = 0.1 + 0.5 * (1.0 - levels.speed);
        let density = unit(state.twinkle_density);
        let dim_base = levels.base.scale(0.4, levels.brightness);

        let frame = (0..LED_COUNT)
            .map(|_| {
                if rng.gen::<f64>() >= density {
                    dim_base
                } else {
                    levels.accent.scale(rng.gen::<f64>(), levels.brightness)
                }
            })
            .collect();
        state.twinkle.store(t, period, frame);
    }
    state.twinkle.frame.clone()
}

// Sine wave of accent riding on a dim base floor
fn render_swirl(state: &State, levels: &Levels, t: f64) -> PixelBuffer {
    let swirl_phase = if state.swirl_phase.is_finite() { state.swirl_phase } else { 0.0 };
    let phase = t * levels.min_speed() + swirl_phase;
    let base_component = levels.base.scale(0.2, levels.brightness);

    (0..LED_COUNT)
        .map(|i| {
            let v = wave(i, phase);
            let accent_mix = 0.2 + 0.8 * v;
            base_component.saturating_add(levels.accent.scale(accent_mix, levels.brightness))
        })
        .collect()
}

/// Brightness of a chase pixel `dist` pixels behind the head of a window `length` long
pub fn chase_falloff(dist: usize, length: usize) -> f64 {
    (1.0 - dist as f64 / length.max(1) as f64).max(0.0)
}

fn render_chase(state: &State, levels: &Levels, t: f64) -> PixelBuffer {
    let n = LED_COUNT;
    let head = (t * levels.min_speed() * n as f64).floor() as u64 % n as u64;
    let length = ((unit(state.chase_length) * n as f64) as usize).max(1);

    (0..n)
        .map(|i| {
            let dist = (i + n - head as usize) % n;
            levels.accent.scale(chase_falloff(dist, length), levels.brightness)
        })
        .collect()
}

fn render_sparkle<R: Rng>(state: &State, levels: &Levels, rng: &mut R) -> PixelBuffer {
    let chance = unit(state.sparkle_chance);
    let dim_base = levels.base.scale(0.3, levels.brightness);
    let spark = levels.accent.scale(1.0, levels.brightness);

    (0..LED_COUNT)
        .map(|_| if rng.gen::<f64>() < chance { spark } else { dim_base })
        .collect()
}

// Base glow with accent pulse, boosted while the hit flash decays
fn render_game(state: &State, levels: &Levels, t: f64) -> PixelBuffer {
    let flash = if state.game.flash_timer.is_finite() { state.game.flash_timer } else { 0.0 };
    let flash_boost = 1.0 + 0.8 * flash.max(0.0);
    let level = state.game.level.min(crate::state::GAME_LEVELS.len() - 1) as f64;
    let phase = t * (1.0 + level * 0.5);
    let base_component = levels.base.scale(0.2, levels.brightness);

    (0..LED_COUNT)
        .map(|i| {
            let v = wave(i, phase);
            let accent_mix = 0.2 + 0.6 * v;
            base_component.saturating_add(levels.accent.scale(accent_mix * flash_boost, levels.brightness))
        })
        .collect()
}

// Scrolling wash between two hues; low contrast pulls the blend toward the midpoint
fn render_spectrum(state: &State, levels: &Levels, t: f64) -> PixelBuffer {
    let params = &state.spectrum;
    let spread = if params.spread.is_finite() { params.spread.max(0.05) } else { 1.0 };
    let scroll = t * (0.5 + 2.5 * levels.speed) / spread;
    let contrast = unit(params.contrast);
    let primary = unit(params.primary_hue);
    let secondary = unit(params.secondary_hue);
    let saturation = unit(params.saturation);
    let value = unit(params.value);

    (0..LED_COUNT)
        .map(|i| {
            let pos = i as f64 / LED_COUNT as f64 + scroll;
            let wave = ((TAU * pos).sin() + 1.0) / 2.0;
            let blended = lerp(0.5, wave, contrast);
            let hue = lerp(primary, secondary, blended).rem_euclid(1.0);
            hsv_to_rgb(hue, saturation, value).scale(1.0, levels.brightness)
        })
        .collect()
}

// Position of pixel `i` on a sine wave around the tree, 0.0-1.0
fn wave(i: usize, phase: f64) -> f64 {
    (((i as f64 / LED_COUNT as f64) * TAU + phase).sin() + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn state_in(mode: Mode) -> State {
        State { mode, ..State::default() }
    }

    #[rstest]
    #[case(Mode::Solid)]
    #[case(Mode::Twinkle)]
    #[case(Mode::Swirl)]
    #[case(Mode::Chase)]
    #[case(Mode::Sparkle)]
    #[case(Mode::Game)]
    #[case(Mode::Spectrum)]
    fn test_every_mode_fills_the_tree(#[case] mode: Mode) {
        let mut rng = StdRng::seed_from_u64(11);
        let mut state = state_in(mode);
        state.game.flash_timer = 1.5;
        for t in [0.0, 0.02, 1.0, 17.3, 86_400.0] {
            assert_eq!(render(&mut state, t, &mut rng).len(), LED_COUNT);
        }
    }

    #[rstest]
    #[case(Mode::Twinkle)]
    #[case(Mode::Swirl)]
    #[case(Mode::Chase)]
    #[case(Mode::Sparkle)]
    #[case(Mode::Game)]
    #[case(Mode::Spectrum)]
    fn test_out_of_range_parameters_are_survivable(#[case] mode: Mode) {
        let mut rng = StdRng::seed_from_u64(12);
        let mut state = state_in(mode);
        state.base_color = 40;
        state.accent_color = usize::MAX;
        state.brightness = 7.0;
        state.speed = -3.0;
        state.twinkle_density = 2.0;
        state.chase_length = f64::NAN;
        state.sparkle_chance = -1.0;
        state.spectrum.spread = 0.0;
        state.spectrum.contrast = 9.0;
        state.game.level = 99;
        state.game.flash_timer = -4.0;
        assert_eq!(render(&mut state, 3.0, &mut rng).len(), LED_COUNT);
    }

    #[test]
    fn test_solid_is_constant() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut state = state_in(Mode::Solid);
        let expected = vec![Rgb::new(255, 0, 0); LED_COUNT];
        assert_eq!(render(&mut state, 0.0, &mut rng), expected);
        assert_eq!(render(&mut state, 123.4, &mut rng), expected);

        state.brightness = 0.55;
        assert_eq!(render(&mut state, 5.0, &mut rng), vec![Rgb::new(140, 0, 0); LED_COUNT]);
    }

    #[test]
    fn test_chase_falloff_shape() {
        let length = (0.2 * LED_COUNT as f64) as usize;
        let mut prev = f64::INFINITY;
        for dist in 0..LED_COUNT {
            let f = chase_falloff(dist, length);
            assert!(f <= prev);
            if dist as f64 >= 0.2 * LED_COUNT as f64 {
                assert_eq!(f, 0.0);
            }
            prev = f;
        }
        assert_eq!(chase_falloff(0, length), 1.0);
    }

    #[test]
    fn test_chase_head_is_full_accent() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut state = state_in(Mode::Chase);
        let frame = render(&mut state, 0.0, &mut rng);
        assert_eq!(frame[0], Rgb::new(0, 255, 0));
        assert_eq!(frame[LED_COUNT - 1], Rgb::BLACK);
    }

    #[test]
    fn test_twinkle_reuses_frame_until_refresh() {
        let mut rng = StdRng::seed_from_u64(15);
        let mut state = state_in(Mode::Twinkle);
        state.twinkle_density = 0.5;
        let first = render(&mut state, 1.0, &mut rng);
        let deadline = state.twinkle.next_refresh;
        assert!((deadline - 1.35).abs() < 1e-9);

        assert_eq!(render(&mut state, 1.0, &mut rng), first);
        assert_eq!(render(&mut state, deadline - 0.01, &mut rng), first);

        let refreshed = render(&mut state, deadline, &mut rng);
        assert_ne!(refreshed, first);
        assert!(state.twinkle.next_refresh > deadline);
    }

    #[test]
    fn test_twinkle_zero_density_is_dim_base() {
        let mut rng = StdRng::seed_from_u64(16);
        let mut state = state_in(Mode::Twinkle);
        state.twinkle_density = 0.0;
        let frame = render(&mut state, 0.0, &mut rng);
        assert!(frame.iter().all(|p| *p == Rgb::new(102, 0, 0)));
    }

    #[test]
    fn test_sparkle_extremes() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut state = state_in(Mode::Sparkle);
        state.sparkle_chance = 0.0;
        assert!(render(&mut state, 0.0, &mut rng).iter().all(|p| *p == Rgb::new(77, 0, 0)));
        state.sparkle_chance = 1.0;
        assert!(render(&mut state, 0.0, &mut rng).iter().all(|p| *p == Rgb::new(0, 255, 0)));
    }

    #[test]
    fn test_swirl_keeps_base_floor() {
        let mut rng = StdRng::seed_from_u64(18);
        let mut state = state_in(Mode::Swirl);
        let frame = render(&mut state, 2.0, &mut rng);
        assert!(frame.iter().all(|p| p.r == 51));
        assert!(frame.iter().all(|p| p.g >= 51));
    }

    #[test]
    fn test_game_flash_saturates() {
        let mut rng = StdRng::seed_from_u64(19);
        let mut state = state_in(Mode::Game);
        state.base_color = 7;
        state.accent_color = 7;
        state.game.flash_timer = 1.5;
        let frame = render(&mut state, 0.0, &mut rng);
        assert!(frame.iter().any(|p| *p == Rgb::new(255, 255, 255)));
    }

    #[test]
    fn test_spectrum_scroll_follows_speed_and_spread() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut state = state_in(Mode::Spectrum);
        state.spectrum.primary_hue = 0.0;
        state.spectrum.secondary_hue = 1.0 / 3.0;
        let t = 1.0 / 14.0;

        // speed 0.5 and spread 0.5 scroll a quarter turn: pixel 0 on the crest, pixel 256 in the trough
        let frame = render(&mut state, t, &mut rng);
        assert_eq!(frame[0], Rgb::new(0, 255, 0));
        assert_eq!(frame[256], Rgb::new(255, 0, 0));

        // doubling the spread halves the scroll, landing between the two hues
        state.spectrum.spread = 1.0;
        let frame = render(&mut state, t, &mut rng);
        assert_eq!(frame[0], Rgb::new(75, 255, 0));
        assert_eq!(frame[256], Rgb::new(255, 75, 0));
    }

    #[test]
    fn test_game_pulse_speeds_up_with_level() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut state = state_in(Mode::Game);
        state.base_color = 0;
        state.accent_color = 2;
        let t = std::f64::consts::FRAC_PI_4;

        // level 0 phase is pi/4, level 2 doubles it to pi/2 and puts pixel 0 on the crest
        assert_eq!(render(&mut state, t, &mut rng)[0], Rgb::new(0, 182, 0));
        state.game.level = 2;
        assert_eq!(render(&mut state, t, &mut rng)[0], Rgb::new(0, 204, 0));
    }

    #[test]
    fn test_spectrum_single_hue_without_contrast() {
        let mut rng = StdRng::seed_from_u64(20);
        let mut state = state_in(Mode::Spectrum);
        state.spectrum.primary_hue = 0.0;
        state.spectrum.secondary_hue = 0.0;
        let frame = render(&mut state, 4.2, &mut rng);
        assert!(frame.iter().all(|p| *p == Rgb::new(255, 0, 0)));

        state.spectrum.secondary_hue = 2.0 / 3.0;
        state.spectrum.contrast = 0.0;
        let frame = render(&mut state, 9.9, &mut rng);
        let first = frame[0];
        assert!(frame.iter().all(|p| *p == first));
    }
}
