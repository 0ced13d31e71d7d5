// Config Module - Configuration management and command-line argument parsing
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Drive an addressable LED tree from an Akai APC Mini Mk2",
    long_about = "Renders animated patterns for a 512-pixel LED tree and streams them to a\n\
                  FadeCandy/OPC server or a WLED device over DDP. Faders and pads on the APC Mini\n\
                  pick colors, modes and parameters; the pad grid mirrors the current state."
)]
pub struct Args {
    /// MIDI input port (case-insensitive substring)
    #[arg(long)]
    pub midi_in: Option<String>,

    /// MIDI output port for pad feedback (case-insensitive substring)
    #[arg(long)]
    pub midi_out: Option<String>,

    /// Pixel sink: opc or ddp
    #[arg(long)]
    pub sink: Option<SinkKind>,

    /// Sink address (host:port for OPC, host or host:port for DDP)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Target framerate (frames per second)
    #[arg(long)]
    pub fps: Option<f64>,

    /// Seconds to wait before reconnecting after a transport failure
    #[arg(long)]
    pub retry: Option<f64>,

    /// List MIDI ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Config file path or name (e.g., --cfg /full/path or --cfg myconf for ~/.config/apctree/myconf.conf)
    #[arg(long)]
    pub cfg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Opc,
    Ddp,
}

impl SinkKind {
    pub fn name(self) -> &'static str {
        match self {
            SinkKind::Opc => "opc",
            SinkKind::Ddp => "ddp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>, // Stores the config file path (not serialized)

    pub midi_input: String,
    pub midi_output: String,
    pub sink: SinkKind,
    pub opc_address: String,
    pub ddp_address: String,
    pub fps: f64,
    pub retry_backoff_secs: f64,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            config_path: None,
            midi_input: "APC MINI".to_string(),
            midi_output: "APC MINI".to_string(),
            sink: SinkKind::Opc,
            opc_address: "treeled.local:7890".to_string(),
            ddp_address: "led.local".to_string(),
            fps: 50.0,
            retry_backoff_secs: 2.0,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        // Track if any args were actually provided
        let mut args_provided = false;

        if let Some(ref midi_in) = args.midi_in {
            self.midi_input = midi_in.clone();
            args_provided = true;
        }

        if let Some(ref midi_out) = args.midi_out {
            self.midi_output = midi_out.clone();
            args_provided = true;
        }

        if let Some(sink) = args.sink {
            self.sink = sink;
            args_provided = true;
        }

        // Address applies to whichever sink ends up selected
        if let Some(ref address) = args.address {
            match self.sink {
                SinkKind::Opc => self.opc_address = address.clone(),
                SinkKind::Ddp => self.ddp_address = address.clone(),
            }
            args_provided = true;
        }

        if let Some(fps) = args.fps {
            self.fps = fps;
            args_provided = true;
        }

        if let Some(retry) = args.retry {
            self.retry_backoff_secs = retry;
            args_provided = true;
        }

        if args_provided {
            self.sanitize();
        }
        args_provided
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            // Check if it's an absolute path
            let path = PathBuf::from(cfg);
            if path.is_absolute() {
                return Ok(path);
            }

            // Check if it contains path separators (relative path)
            if cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as config name in config directory
            let config_dir = Self::config_dir()?;

            // Add .conf extension if not present
            let filename = if cfg.ends_with(".conf") {
                cfg.to_string()
            } else {
                format!("{}.conf", cfg)
            };

            Ok(config_dir.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.conf"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")?;
        let config_dir = PathBuf::from(home).join(".config").join("apctree");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        let contents = std::fs::read_to_string(&path)?;
        let mut parsed = Self::from_toml(&contents)?;
        parsed.config_path = Some(path);
        Ok(parsed)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut parsed: Self = toml::from_str(contents)?;
        parsed.sanitize();
        Ok(parsed)
    }

    /// Sanitize config values to handle common formatting issues
    pub fn sanitize(&mut self) {
        // Sanitize string values (trim whitespace)
        self.midi_input = self.midi_input.trim().to_string();
        self.midi_output = self.midi_output.trim().to_string();
        self.opc_address = self.opc_address.trim().to_string();
        self.ddp_address = self.ddp_address.trim().to_string();
        self.log_level = self.log_level.trim().to_lowercase();

        // Clamp numeric values to reasonable ranges
        if !self.fps.is_finite() {
            self.fps = 50.0;
        }
        self.fps = self.fps.clamp(1.0, 240.0);
        if !self.retry_backoff_secs.is_finite() {
            self.retry_backoff_secs = 2.0;
        }
        self.retry_backoff_secs = self.retry_backoff_secs.clamp(0.1, 60.0);
    }

    pub fn to_toml(&self) -> String {
        // Build TOML with comments manually for better documentation
        format!(
            r#"# apctree Configuration File
# Command-line flags override these values and are written back here

# MIDI input port for faders and pads (case-insensitive substring of the port name)
midi_input = {}

# MIDI output port for pad and scene-button LEDs
midi_output = {}

# Where frames go
# Options: "opc" (FadeCandy / fcserver over TCP), "ddp" (WLED over UDP)
sink = {}

# OPC server address (host:port)
opc_address = {}

# DDP device address (host, or host:port; default port 4048)
ddp_address = {}

# Target framerate (frames per second, 1-240)
fps = {:.1}

# Seconds to wait before reconnecting after a MIDI or sink failure (0.1-60)
retry_backoff_secs = {:.1}

# Log level when RUST_LOG is not set
# Options: "error", "warn", "info", "debug", "trace"
log_level = {}
"#,
            toml_string(&self.midi_input),
            toml_string(&self.midi_output),
            toml_string(self.sink.name()),
            toml_string(&self.opc_address),
            toml_string(&self.ddp_address),
            self.fps,
            self.retry_backoff_secs,
            toml_string(&self.log_level),
        )
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };

        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();
        std::fs::write(&path, sanitized.to_toml())?;
        Ok(())
    }
}

// Quoted and escaped TOML string, so port names with quotes or backslashes survive a save
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
