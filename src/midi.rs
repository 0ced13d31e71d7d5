// MIDI Module - APC Mini Mk2 wire format, port discovery and connections
use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::feedback::GridCommand;
use crate::input::ControllerEvent;

const CLIENT_NAME: &str = "apctree";

/// Control-change number of the first fader (fader 1)
pub const FIRST_FADER_CC: u8 = 48;

/// Number of faders on the APC Mini Mk2 (eight channel faders plus master)
pub const FADER_COUNT: u8 = 9;

/// Note-on channel for pad colors: 6 is solid at 100% brightness
pub const PAD_FEEDBACK_CHANNEL: u8 = 6;

/// Parse MIDI message bytes into a controller event
pub fn parse_midi_message(message: &[u8]) -> Option<ControllerEvent> {
    if message.len() < 3 {
        return None;
    }

    let status = message[0];
    let data1 = message[1];
    let data2 = message[2];

    match status & 0xF0 {
        // Note On: 0x90-0x9F, velocity 0 is a release
        0x90 => Some(ControllerEvent::Discrete {
            cell: data1,
            pressed: data2 > 0,
            velocity: data2,
        }),
        // Note Off: 0x80-0x8F
        0x80 => Some(ControllerEvent::Discrete {
            cell: data1,
            pressed: false,
            velocity: 0,
        }),
        // Control Change: 0xB0-0xBF
        0xB0 if (FIRST_FADER_CC..FIRST_FADER_CC + FADER_COUNT).contains(&data1) => {
            Some(ControllerEvent::Continuous {
                control: data1 - FIRST_FADER_CC + 1,
                value: data2.min(127) as f64 / 127.0,
            })
        }
        _ => None,
    }
}

/// Encode an LED command as the Note On message the APC listens for
pub fn encode_command(command: &GridCommand) -> [u8; 3] {
    match *command {
        GridCommand::SetGridColor { cell, color } => {
            [0x90 | PAD_FEEDBACK_CHANNEL, cell & 0x7F, color.min(127)]
        }
        // Single-color LEDs: channel 0, velocity 0=off 1=on 2=blink
        GridCommand::SetIndicator { id, state } => [0x90, id & 0x7F, state.velocity()],
    }
}

/// Destination for controller LED commands
pub trait ControllerOutput: Send {
    fn send(&mut self, command: &GridCommand) -> Result<()>;

    fn send_all(&mut self, commands: &[GridCommand]) -> Result<()> {
        for command in commands {
            self.send(command)?;
        }
        Ok(())
    }
}

/// Output connection to the physical controller
pub struct ApcOutput {
    connection: MidiOutputConnection,
}

impl ControllerOutput for ApcOutput {
    fn send(&mut self, command: &GridCommand) -> Result<()> {
        self.connection
            .send(&encode_command(command))
            .map_err(|e| anyhow!("Failed to send to MIDI output: {}", e))
    }
}

/// List all available MIDI input and output ports
/// Returns (inputs, outputs)
pub fn list_midi_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new(CLIENT_NAME)?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect();

    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok((inputs, outputs))
}

/// Find a port by name (case-insensitive substring match)
pub fn find_port(names: &[String], wanted: &str) -> Result<usize> {
    let wanted = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&wanted))
        .ok_or_else(|| anyhow!("Port containing '{}' not found. Available: {:?}", wanted, names))
}

/// Connect to the controller's input port; `callback` runs on midir's thread
pub fn connect_input<F>(port_name: &str, mut callback: F) -> Result<(String, MidiInputConnection<()>)>
where
    F: FnMut(ControllerEvent) + Send + 'static,
{
    let midi_in = MidiInput::new(CLIENT_NAME)?;
    let ports = midi_in.ports();
    let names: Vec<String> = ports
        .iter()
        .map(|port| midi_in.port_name(port).unwrap_or_default())
        .collect();
    let index = find_port(&names, port_name)?;

    let connection = midi_in
        .connect(
            &ports[index],
            "apctree_input",
            move |_timestamp, message, _| {
                if let Some(event) = parse_midi_message(message) {
                    callback(event);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("Failed to connect to MIDI input: {}", e))?;

    Ok((names[index].clone(), connection))
}

/// Connect to the controller's output port for LED feedback
pub fn connect_output(port_name: &str) -> Result<(String, ApcOutput)> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    let ports = midi_out.ports();
    let names: Vec<String> = ports
        .iter()
        .map(|port| midi_out.port_name(port).unwrap_or_default())
        .collect();
    let index = find_port(&names, port_name)?;

    let connection = midi_out
        .connect(&ports[index], "apctree_output")
        .map_err(|e| anyhow!("Failed to connect to MIDI output: {}", e))?;

    Ok((names[index].clone(), ApcOutput { connection }))
}
