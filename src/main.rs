// apctree - Drive an addressable LED tree from an Akai APC Mini Mk2

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod feedback;
mod game;
mod input;
mod midi;
mod renderer;
mod sink;
mod state;
mod types;

use config::{AppConfig, Args};
use engine::{Engine, Renderer, SharedOutput};
use input::ControllerEvent;
use state::State;
use types::LED_COUNT;

// How often the input task checks whether the render thread gave up
const RENDER_WATCH_INTERVAL: Duration = Duration::from_millis(100);

fn load_config(args: &Args) -> Result<AppConfig> {
    let cfg_arg = args.cfg.as_deref();
    let config_path = AppConfig::config_path(cfg_arg)?;
    let config_file_exists = config_path.exists();

    let mut config = if config_file_exists {
        // Config file exists - load it or fail with error message
        match AppConfig::load_with_path(cfg_arg) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", config_path.display(), e);
                eprintln!("Please fix the config file or delete it to regenerate with defaults.");
                return Err(e);
            }
        }
    } else {
        // No config file - use defaults (will be saved below)
        let mut default_config = AppConfig::default();
        default_config.config_path = Some(config_path.clone());
        default_config
    };

    let args_provided = config.merge_with_args(args);

    // Save config only on first run or when command-line args changed something
    if !config_file_exists || args_provided {
        config.save()?;
    }

    Ok(config)
}

fn init_logging(config: &AppConfig, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn print_midi_ports() -> Result<()> {
    let (inputs, outputs) = midi::list_midi_ports()?;
    println!("MIDI inputs:");
    for name in &inputs {
        println!("  {}", name);
    }
    println!("MIDI outputs:");
    for name in &outputs {
        println!("  {}", name);
    }
    Ok(())
}

/// Resolves once Ctrl+C has been pressed
async fn wait_for_quit(quit: &mut watch::Receiver<bool>) {
    if quit.wait_for(|q| *q).await.is_err() {
        // signal handler never installed; nothing will ever quit us
        std::future::pending::<()>().await;
    }
}

fn spawn_quit_watcher() -> watch::Receiver<bool> {
    let (quit_tx, quit_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = quit_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                // keep the sender alive so receivers just wait
                std::future::pending::<()>().await;
            }
        }
    });
    quit_rx
}

/// Connect everything, run until quit or a transport failure, then blank the outputs
/// `Ok` means the user quit; any error asks for a reconnect
async fn run_session(config: &AppConfig, engine: &Engine, quit: &mut watch::Receiver<bool>) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (in_name, _input_connection) = midi::connect_input(&config.midi_input, move |event| {
        let _ = event_tx.send(event);
    })?;
    let (out_name, apc_output) = midi::connect_output(&config.midi_output)?;
    tracing::info!("Using MIDI ports: {} / {}", in_name, out_name);

    let pixel_sink = sink::connect(config)?;
    let address = match config.sink {
        config::SinkKind::Opc => &config.opc_address,
        config::SinkKind::Ddp => &config.ddp_address,
    };
    tracing::info!(
        "Sending {} to {} for {} LEDs at {:.0} FPS",
        config.sink.name(),
        address,
        LED_COUNT,
        config.fps
    );

    let output: SharedOutput = Arc::new(Mutex::new(Box::new(apc_output)));
    tracing::info!("Starting in {} mode", engine.snapshot().mode.name());
    engine.sync_feedback(&output)?;

    let stop = Arc::new(AtomicBool::new(false));
    let render_handle = Renderer::new(engine.clone(), pixel_sink, output.clone(), stop.clone(), config.fps).spawn()?;

    let session = input_loop(engine, &output, &mut event_rx, quit, &stop).await;

    // Teardown: stop rendering, then one all-off frame and a dark controller
    stop.store(true, Ordering::SeqCst);
    let joined = tokio::task::spawn_blocking(move || render_handle.join()).await?;
    let render_result = match joined {
        Ok((mut pixel_sink, render_result)) => {
            if let Err(e) = pixel_sink.blank() {
                tracing::warn!("Failed to blank the tree: {:#}", e);
            }
            render_result
        }
        Err(_) => Err(anyhow!("Render thread panicked")),
    };
    if let Err(e) = engine::send_commands(&output, &feedback::blank_commands()) {
        tracing::warn!("Failed to blank the controller: {:#}", e);
    }

    session_outcome(session, render_result)
}

// Quitting wins; otherwise a render failure is the root cause of the input loop stopping
fn session_outcome(session: Result<()>, render: Result<()>) -> Result<()> {
    match (session, render) {
        (Ok(()), _) => Ok(()),
        (Err(_), Err(render_error)) => Err(render_error),
        (Err(session_error), Ok(())) => Err(session_error),
    }
}

/// Apply controller events until quit; errors end the session
async fn input_loop(
    engine: &Engine,
    output: &SharedOutput,
    event_rx: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    quit: &mut watch::Receiver<bool>,
    render_stopped: &AtomicBool,
) -> Result<()> {
    let mut render_watch = tokio::time::interval(RENDER_WATCH_INTERVAL);

    loop {
        tokio::select! {
            _ = wait_for_quit(quit) => return Ok(()),
            event = event_rx.recv() => {
                let Some(event) = event else {
                    bail!("MIDI input closed");
                };
                engine.handle_event(event, output)?;
            }
            _ = render_watch.tick() => {
                if render_stopped.load(Ordering::SeqCst) {
                    bail!("Render loop stopped");
                }
            }
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    // Created once so state survives reconnects
    let engine = Engine::new(State::default());
    let mut quit = spawn_quit_watcher();
    let backoff = Duration::from_secs_f64(config.retry_backoff_secs);

    loop {
        match run_session(&config, &engine, &mut quit).await {
            Ok(()) => {
                tracing::info!("Exiting on user request.");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Transport error: {:#}. Retrying in {:.1}s...", e, backoff.as_secs_f64());
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = wait_for_quit(&mut quit) => {
                        tracing::info!("Exiting on user request.");
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_ports {
        return print_midi_ports();
    }

    let config = load_config(&args)?;
    init_logging(&config, args.quiet);
    if let Some(path) = &config.config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}
