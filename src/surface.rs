//! Akai MIDImix surface driver
//!
//! Handles MIDI communication with the control surface: incoming knob and
//! button messages, and the button LEDs used as indicators.

use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::MidiConfig;
use crate::midi::{convert, format_hex, MidiMessage};

/// Capacity of the incoming MIDI queue
const EVENT_QUEUE_SIZE: usize = 1000;

/// Raw MIDI event from the surface
#[derive(Debug, Clone)]
pub struct MidiEvent {
    pub message: MidiMessage,
    pub raw_data: Vec<u8>,
}

/// Input event from the surface, independent of the wire encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    /// A knob or fader moved; value normalized to [0.0, 1.0]
    ContinuousControl { id: u8, value: f64 },
    /// A button was released
    DiscreteTrigger { id: u8 },
}

impl SurfaceEvent {
    /// Translate a MIDI message received on the configured channel
    ///
    /// `channel` is 1-based as in the config file. Messages on other channels,
    /// button presses and anything else return None.
    pub fn from_midi(message: &MidiMessage, channel: u8, max_input_value: u8) -> Option<Self> {
        if message.channel() != channel.saturating_sub(1) {
            return None;
        }

        match *message {
            MidiMessage::ControlChange { cc, value, .. } => Some(SurfaceEvent::ContinuousControl {
                id: cc,
                value: convert::normalize(value, max_input_value),
            }),
            MidiMessage::NoteOff { note, .. } => Some(SurfaceEvent::DiscreteTrigger { id: note }),
            _ => None,
        }
    }
}

/// Something that can switch indicators on and off
///
/// Calls set absolute state and are safe to repeat.
pub trait IndicatorSink: Send + Sync {
    fn set_indicator(&self, id: u8, on: bool) -> Result<()>;
}

/// MIDImix driver for hardware communication
pub struct MidimixDriver {
    /// MIDI input connection
    input_conn: Option<MidiInputConnection<()>>,

    /// MIDI output connection
    output_conn: Option<Arc<Mutex<MidiOutputConnection>>>,

    /// Event sender for incoming MIDI
    event_tx: mpsc::Sender<MidiEvent>,

    /// Event receiver
    event_rx: Option<mpsc::Receiver<MidiEvent>>,

    /// Configured channel (0-15)
    channel: u8,

    /// Input port name pattern
    input_port_name: String,

    /// Output port name pattern
    output_port_name: String,
}

impl MidimixDriver {
    /// Create a new driver (not yet connected)
    pub fn new(config: &MidiConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        Self {
            input_conn: None,
            output_conn: None,
            event_tx,
            event_rx: Some(event_rx),
            channel: config.channel.saturating_sub(1) & 0x0F,
            input_port_name: config.input_port.clone(),
            output_port_name: config.output_port.clone(),
        }
    }

    /// Case-insensitive substring match on port names
    fn matches(name: &str, pattern: &str) -> bool {
        name.to_lowercase().contains(&pattern.to_lowercase())
    }

    /// Find an input port by substring match
    fn find_input_port(
        midi_in: &MidiInput,
        pattern: &str,
    ) -> Option<(midir::MidiInputPort, String)> {
        midi_in.ports().into_iter().find_map(|port| {
            let name = midi_in.port_name(&port).ok()?;
            Self::matches(&name, pattern).then(|| {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                (port, name)
            })
        })
    }

    /// Find an output port by substring match
    fn find_output_port(
        midi_out: &MidiOutput,
        pattern: &str,
    ) -> Option<(midir::MidiOutputPort, String)> {
        midi_out.ports().into_iter().find_map(|port| {
            let name = midi_out.port_name(&port).ok()?;
            Self::matches(&name, pattern).then(|| {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                (port, name)
            })
        })
    }

    /// Connect to the surface's MIDI ports
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();

        info!(
            "Connecting to MIDImix - Input: '{}', Output: '{}'",
            self.input_port_name, self.output_port_name
        );

        let midi_in = MidiInput::new("Midimix-GW-Input").context("Failed to create MIDI input")?;
        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (in_port, port_name) = Self::find_input_port(&midi_in, &self.input_port_name)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", self.input_port_name))?;

        info!("Connecting to input port: {}", port_name);

        let event_tx = self.event_tx.clone();
        let input_conn = midi_in
            .connect(
                &in_port,
                "Midimix-GW",
                move |_timestamp, data, _| {
                    if let Some(message) = MidiMessage::parse(data) {
                        let event = MidiEvent {
                            message,
                            raw_data: data.to_vec(),
                        };
                        // Never block the MIDI callback thread
                        let _ = event_tx.try_send(event);
                    } else {
                        trace!("Ignoring MIDI: {}", format_hex(data));
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to input port: {}", e))?;

        self.input_conn = Some(input_conn);

        let midi_out =
            MidiOutput::new("Midimix-GW-Output").context("Failed to create MIDI output")?;
        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (out_port, port_name) = Self::find_output_port(&midi_out, &self.output_port_name)
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", self.output_port_name))?;

        info!("Connecting to output port: {}", port_name);

        let output_conn = midi_out
            .connect(&out_port, "Midimix-GW")
            .map_err(|e| anyhow::anyhow!("Failed to connect to output port: {}", e))?;

        self.output_conn = Some(Arc::new(Mutex::new(output_conn)));

        info!("MIDImix connected");
        Ok(())
    }

    /// Disconnect from MIDI ports
    pub fn disconnect(&mut self) {
        let was_connected = self.input_conn.is_some() || self.output_conn.is_some();
        self.input_conn = None;
        self.output_conn = None;
        if was_connected {
            info!("MIDImix disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.input_conn.is_some() && self.output_conn.is_some()
    }

    /// Take the event receiver (consumed by the main loop)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<MidiEvent>> {
        self.event_rx.take()
    }

    /// LED handle sharing the output connection; None until connected
    pub fn indicators(&self) -> Option<Indicators> {
        self.output_conn.as_ref().map(|output| Indicators {
            output: Arc::clone(output),
            channel: self.channel,
        })
    }
}

/// Drives the surface's button LEDs
///
/// Cheap to clone; every clone writes through the same output connection.
#[derive(Clone)]
pub struct Indicators {
    output: Arc<Mutex<MidiOutputConnection>>,
    /// Channel used for LED output (0-15)
    channel: u8,
}

impl Indicators {
    /// Send a MIDI message to the surface
    pub fn send(&self, message: &MidiMessage) -> Result<()> {
        let data = message.encode();
        self.output
            .lock()
            .send(&data)
            .context("Failed to send MIDI message")?;

        trace!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }
}

impl IndicatorSink for Indicators {
    fn set_indicator(&self, id: u8, on: bool) -> Result<()> {
        self.send(&led_message(self.channel, id, on))
    }
}

/// Message lighting or clearing a button LED
pub fn led_message(channel: u8, note: u8, on: bool) -> MidiMessage {
    if on {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity: 127,
        }
    } else {
        MidiMessage::NoteOff {
            channel,
            note,
            velocity: 0,
        }
    }
}

/// Port discovery utilities
pub mod discovery {
    use super::*;
    use colored::*;

    /// Names of all MIDI input ports
    pub fn input_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new("Midimix-GW-Discovery")?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// Names of all MIDI output ports
    pub fn output_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new("Midimix-GW-Discovery")?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect())
    }

    /// Print discovered ports, highlighting the ones the config would pick
    pub fn print_ports(config: Option<&MidiConfig>) -> Result<()> {
        let print = |title: &str, ports: Vec<String>, pattern: Option<&str>| {
            println!("\n{}", title.bold().cyan());
            if ports.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for (i, name) in ports.iter().enumerate() {
                let selected = pattern.is_some_and(|p| MidimixDriver::matches(name, p));
                if selected {
                    println!("  {}: {} {}", i, name.green(), "<- configured".yellow());
                } else {
                    println!("  {}: {}", i, name);
                }
            }
        };

        print(
            "=== MIDI Input Ports ===",
            input_ports()?,
            config.map(|c| c.input_port.as_str()),
        );
        print(
            "=== MIDI Output Ports ===",
            output_ports()?,
            config.map(|c| c.output_port.as_str()),
        );
        println!();
        Ok(())
    }
}
