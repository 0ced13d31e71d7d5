// Engine Module - Shared state ownership and the fixed-rate render thread
use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::feedback::{self, GridCommand};
use crate::game::{self, TickOutcome};
use crate::input::{self, Applied, ControllerEvent};
use crate::midi::ControllerOutput;
use crate::renderer;
use crate::sink::PixelSink;
use crate::state::State;
use crate::types::{Mode, PixelBuffer};

// Everything a tick or an event mutates, guarded by one lock
struct Core {
    state: State,
    rng: StdRng,
    // Last game footprint pushed to the pads, so ticks only redraw on change
    drawn_square: Option<(usize, usize, usize, usize)>,
}

/// Handle to the engine state; clones share the same state
#[derive(Clone)]
pub struct Engine {
    core: Arc<Mutex<Core>>,
    started: Instant,
}

impl Engine {
    pub fn new(state: State) -> Self {
        Self::with_rng(state, StdRng::from_entropy())
    }

    pub fn with_rng(state: State, rng: StdRng) -> Self {
        Engine {
            core: Arc::new(Mutex::new(Core { state, rng, drawn_square: None })),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        // A panic mid-update cannot leave State structurally invalid, so keep going
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seconds since the engine was created
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn snapshot(&self) -> State {
        self.lock().state.clone()
    }

    /// Apply one controller event; every press returns the full feedback to send
    pub fn apply_event(&self, event: ControllerEvent) -> (Applied, Option<Vec<GridCommand>>) {
        let mut core = self.lock();
        let Core { state, rng, drawn_square } = &mut *core;

        let applied = input::apply_event(state, event, rng);
        match applied {
            Applied::Press => {}
            Applied::Parameter => tracing::debug!(?event, "Parameter updated"),
            Applied::Unhandled => tracing::debug!(?event, "Unhandled controller event"),
        }

        // Any press relights the controller, even one that changed nothing
        if event.is_press() {
            *drawn_square = square_key(state);
            return (applied, Some(feedback::render_feedback(state)));
        }
        (applied, None)
    }

    /// Current feedback for the whole controller
    pub fn feedback(&self) -> Vec<GridCommand> {
        let mut core = self.lock();
        core.drawn_square = square_key(&core.state);
        feedback::render_feedback(&core.state)
    }

    /// Advance the game by `dt` and render the frame for `t`
    /// Also returns pad commands when the game square moved to different pads
    pub fn tick(&self, dt: f64, t: f64) -> (PixelBuffer, Option<Vec<GridCommand>>) {
        let mut core = self.lock();
        let Core { state, rng, drawn_square } = &mut *core;

        let outcome = game::tick(state, dt, rng);
        let grid = match outcome {
            TickOutcome::Reset => Some(feedback::render_feedback(state)),
            TickOutcome::Moved if square_key(state) != *drawn_square => Some(feedback::render_grid(state)),
            _ => None,
        };
        if grid.is_some() {
            *drawn_square = square_key(state);
        }

        (renderer::render(state, t, rng), grid)
    }
}

// Output is always locked before state and held until the commands are on the wire,
// so the controller receives feedback in the order the state produced it.
impl Engine {
    /// Apply an event and send its feedback
    pub fn handle_event(&self, event: ControllerEvent, output: &SharedOutput) -> Result<Applied> {
        let mut out = lock_output(output);
        let (applied, commands) = self.apply_event(event);
        if let Some(commands) = commands {
            out.send_all(&commands)?;
        }
        Ok(applied)
    }

    /// Tick and send any pad redraw; returns the frame for the tree
    pub fn tick_and_sync(&self, dt: f64, t: f64, output: &SharedOutput) -> Result<PixelBuffer> {
        let mut out = lock_output(output);
        let (frame, grid) = self.tick(dt, t);
        if let Some(commands) = grid {
            out.send_all(&commands)?;
        }
        Ok(frame)
    }

    /// Send the complete feedback for the current state
    pub fn sync_feedback(&self, output: &SharedOutput) -> Result<()> {
        let mut out = lock_output(output);
        let commands = self.feedback();
        out.send_all(&commands)
    }
}

fn square_key(state: &State) -> Option<(usize, usize, usize, usize)> {
    if state.mode != Mode::Game {
        return None;
    }
    let (rows, cols) = feedback::game_footprint(state);
    Some((rows.start, cols.start, state.game.size as usize, state.accent_color))
}

/// Controller output shared by the render thread and the input task
pub type SharedOutput = Arc<Mutex<Box<dyn ControllerOutput>>>;

fn lock_output(output: &SharedOutput) -> MutexGuard<'_, Box<dyn ControllerOutput>> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn send_commands(output: &SharedOutput, commands: &[GridCommand]) -> Result<()> {
    lock_output(output).send_all(commands)
}

// Dedicated renderer that runs in its own thread at the configured FPS
pub struct Renderer {
    engine: Engine,
    sink: Box<dyn PixelSink>,
    output: SharedOutput,
    shutdown: Arc<AtomicBool>,
    frame_duration: Duration,
}

impl Renderer {
    pub fn new(
        engine: Engine,
        sink: Box<dyn PixelSink>,
        output: SharedOutput,
        shutdown: Arc<AtomicBool>,
        fps: f64,
    ) -> Self {
        Renderer {
            engine,
            sink,
            output,
            shutdown,
            frame_duration: Duration::from_secs_f64(1.0 / fps.max(1.0)),
        }
    }

    /// Start rendering on a new thread; the handle yields the sink back for the blank frame
    pub fn spawn(self) -> Result<thread::JoinHandle<(Box<dyn PixelSink>, Result<()>)>> {
        let handle = thread::Builder::new()
            .name("apctree-render".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Render until shutdown is requested or a transport write fails
    pub fn run(mut self) -> (Box<dyn PixelSink>, Result<()>) {
        let result = self.render_loop();
        if let Err(ref e) = result {
            tracing::warn!("Render loop stopped: {:#}", e);
            // wake whoever waits on the session
            self.shutdown.store(true, Ordering::SeqCst);
        }
        (self.sink, result)
    }

    fn render_loop(&mut self) -> Result<()> {
        let mut last = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            let frame_start = Instant::now();
            let dt = frame_start.duration_since(last).as_secs_f64();
            last = frame_start;

            let frame = self.engine.tick_and_sync(dt, self.engine.elapsed(), &self.output)?;
            self.sink.write_frame(&frame)?;

            // Frame rate limiting; an overrun just sends the next frame late
            let elapsed = frame_start.elapsed();
            if elapsed < self.frame_duration {
                thread::sleep(self.frame_duration - elapsed);
            } else {
                tracing::trace!(?elapsed, "Frame overran its budget");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SCENE_BASE;
    use crate::sink::prepare_frame;
    use crate::types::{Rgb, LED_COUNT};
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::mpsc;

    fn engine() -> Engine {
        Engine::with_rng(State::default(), StdRng::seed_from_u64(42))
    }

    fn press(cell: u8) -> ControllerEvent {
        ControllerEvent::Discrete { cell, pressed: true, velocity: 100 }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_after: Option<usize>,
    }

    impl PixelSink for RecordingSink {
        fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
            let mut frames = self.frames.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if frames.len() >= limit {
                    return Err(anyhow!("sink went away"));
                }
            }
            frames.push(data.to_vec());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingOutput {
        commands: Arc<Mutex<Vec<GridCommand>>>,
    }

    impl ControllerOutput for RecordingOutput {
        fn send(&mut self, command: &GridCommand) -> Result<()> {
            self.commands.lock().unwrap().push(*command);
            Ok(())
        }
    }

    #[test]
    fn test_solid_red_then_brightness_fader() {
        let engine = engine();
        let (frame, grid) = engine.tick(0.02, 0.5);
        assert_eq!(frame, vec![Rgb::new(255, 0, 0); LED_COUNT]);
        assert!(grid.is_none());

        let (applied, feedback) = engine.apply_event(ControllerEvent::Continuous { control: 3, value: 0.5 });
        assert_eq!(applied, Applied::Parameter);
        assert!(feedback.is_none());
        assert!((engine.snapshot().brightness - 0.55).abs() < 1e-9);

        let (frame, _) = engine.tick(0.02, 9.0);
        assert_eq!(frame, vec![Rgb::new(140, 0, 0); LED_COUNT]);
    }

    #[test]
    fn test_scene_press_into_game_then_hit() {
        let engine = engine();
        let (applied, feedback) = engine.apply_event(press(SCENE_BASE + 5));
        assert_eq!(applied, Applied::Press);
        assert!(feedback.is_some());

        let state = engine.snapshot();
        assert_eq!(state.mode, Mode::Game);
        assert_eq!(state.game.level, 0);
        assert_eq!(state.game.size, 4);
        let (x, y) = state.game.pos;
        assert!((0.0..=4.0).contains(&x) && (0.0..=4.0).contains(&y));

        // ceil() of the origin is always inside a size-4 square
        let row = y.ceil() as u8;
        let col = x.ceil() as u8;
        engine.apply_event(press(row * 8 + col));
        let state = engine.snapshot();
        assert_eq!(state.game.level, 1);
        assert_eq!(state.game.flash_timer, 1.5);
    }

    #[test]
    fn test_game_ticks_redraw_only_when_square_moves() {
        let engine = engine();
        engine.apply_event(press(SCENE_BASE + 5));
        let mut redraws = 0;
        for _ in 0..200 {
            let (_, grid) = engine.tick(0.02, engine.elapsed());
            if grid.is_some() {
                redraws += 1;
            }
        }
        // square moves at 2 pads/s for 4 s: a handful of redraws, never one per tick
        assert!(redraws > 0);
        assert!(redraws < 100);
    }

    #[test]
    fn test_release_sends_no_feedback() {
        let engine = engine();
        let release = ControllerEvent::Discrete { cell: 3, pressed: false, velocity: 0 };
        assert_eq!(engine.apply_event(release), (Applied::Unhandled, None));
    }

    #[test]
    fn test_unmapped_press_still_relights_controller() {
        let engine = engine();
        let expected = feedback::render_feedback(&engine.snapshot());

        // pad 40 in Solid and the eighth scene button change nothing
        for cell in [40, SCENE_BASE + 7] {
            let (applied, feedback) = engine.apply_event(press(cell));
            assert_eq!(applied, Applied::Unhandled);
            assert_eq!(feedback, Some(expected.clone()));
        }
    }

    // Holds the first send until the test releases it, like a slow MIDI wire
    struct GatedOutput {
        commands: Arc<Mutex<Vec<GridCommand>>>,
        gate: Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>,
    }

    impl ControllerOutput for GatedOutput {
        fn send(&mut self, command: &GridCommand) -> Result<()> {
            if let Some((entered, release)) = self.gate.take() {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.commands.lock().unwrap().push(*command);
            Ok(())
        }
    }

    // Final lit state of every pad and indicator after replaying commands in order
    fn replay(commands: &[GridCommand]) -> HashMap<(bool, u8), u8> {
        let mut lit = HashMap::new();
        for command in commands {
            match *command {
                GridCommand::SetGridColor { cell, color } => lit.insert((true, cell), color),
                GridCommand::SetIndicator { id, state } => lit.insert((false, id), state.velocity()),
            };
        }
        lit
    }

    #[test]
    fn test_mode_switch_during_game_redraw_wins() {
        // inactive game: the first tick resets it and redraws the controller
        let engine = Engine::with_rng(State { mode: Mode::Game, ..State::default() }, StdRng::seed_from_u64(5));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let output: SharedOutput = Arc::new(Mutex::new(Box::new(GatedOutput {
            commands: commands.clone(),
            gate: Some((entered_tx, release_rx)),
        })));

        let render = {
            let (engine, output) = (engine.clone(), output.clone());
            thread::spawn(move || engine.tick_and_sync(0.02, 0.0, &output).map(|_| ()))
        };
        entered_rx.recv().unwrap();

        // switch back to Solid while the game grid is still going out
        let input = {
            let (engine, output) = (engine.clone(), output.clone());
            thread::spawn(move || engine.handle_event(press(SCENE_BASE), &output))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        render.join().unwrap().unwrap();
        assert_eq!(input.join().unwrap().unwrap(), Applied::Press);

        let state = engine.snapshot();
        assert_eq!(state.mode, Mode::Solid);
        assert_eq!(
            replay(&commands.lock().unwrap()),
            replay(&feedback::render_feedback(&state))
        );
    }

    #[test]
    fn test_sync_feedback_sends_full_controller_state() {
        let engine = engine();
        let recorder = RecordingOutput::default();
        let commands = recorder.commands.clone();
        let output: SharedOutput = Arc::new(Mutex::new(Box::new(recorder)));

        engine.sync_feedback(&output).unwrap();
        assert_eq!(*commands.lock().unwrap(), feedback::render_feedback(&engine.snapshot()));
    }

    #[test]
    fn test_renderer_streams_until_shutdown() {
        let sink = RecordingSink::default();
        let frames = sink.frames.clone();
        let output: SharedOutput = Arc::new(Mutex::new(Box::new(RecordingOutput::default())));
        let shutdown = Arc::new(AtomicBool::new(false));

        let renderer = Renderer::new(engine(), Box::new(sink), output, shutdown.clone(), 200.0);
        let handle = renderer.spawn().unwrap();
        thread::sleep(Duration::from_millis(60));
        shutdown.store(true, Ordering::SeqCst);
        let (_sink, result) = handle.join().unwrap();

        assert!(result.is_ok());
        let frames = frames.lock().unwrap();
        assert!(!frames.is_empty());
        assert_eq!(frames[0], prepare_frame(&vec![Rgb::new(255, 0, 0); LED_COUNT]));
    }

    #[test]
    fn test_renderer_reports_sink_failure() {
        let sink = RecordingSink { fail_after: Some(3), ..RecordingSink::default() };
        let output: SharedOutput = Arc::new(Mutex::new(Box::new(RecordingOutput::default())));
        let shutdown = Arc::new(AtomicBool::new(false));

        let renderer = Renderer::new(engine(), Box::new(sink), output, shutdown.clone(), 200.0);
        let (_sink, result) = renderer.run();
        assert!(result.is_err());
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn test_renderer_pushes_game_grid_to_controller() {
        let engine = engine();
        engine.apply_event(press(SCENE_BASE + 5));
        let recorder = RecordingOutput::default();
        let commands = recorder.commands.clone();
        let output: SharedOutput = Arc::new(Mutex::new(Box::new(recorder)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let renderer = Renderer::new(engine, Box::new(RecordingSink::default()), output, shutdown.clone(), 200.0);
        let handle = renderer.spawn().unwrap();
        thread::sleep(Duration::from_millis(1500));
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap().1.unwrap();

        assert!(!commands.lock().unwrap().is_empty());
    }
}
