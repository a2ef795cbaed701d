//! Audio server gateway
//!
//! Vocabulary shared by the synchronization engine and the audio server
//! backends: object kinds, notification events, the live object model and
//! the `AudioServer` trait the engine talks to.

pub mod pactl;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

pub use pactl::PactlGateway;

/// Raw volume corresponding to 100% on the server (PA_VOLUME_NORM)
pub const VOLUME_NORM: u32 = 0x10000;

/// Property holding the human-readable name of a stream
pub const STREAM_NAME_PROPERTY: &str = "application.name";

/// Property holding the human-readable name of a device
pub const DEVICE_NAME_PROPERTY: &str = "device.description";

/// The four categories of live objects on the audio server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[serde(alias = "sink")]
    OutputDevice,
    #[serde(alias = "source")]
    InputDevice,
    #[serde(alias = "sink_input")]
    PlaybackStream,
    #[serde(alias = "source_output")]
    RecordStream,
}

impl ObjectKind {
    /// All kinds, in bootstrap order
    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::PlaybackStream,
            ObjectKind::RecordStream,
            ObjectKind::OutputDevice,
            ObjectKind::InputDevice,
        ]
    }

    /// Devices can be selected as the server default, streams cannot
    pub fn is_device(self) -> bool {
        matches!(self, ObjectKind::OutputDevice | ObjectKind::InputDevice)
    }

    /// Property used to resolve the display name of objects of this kind
    pub fn name_property(self) -> &'static str {
        if self.is_device() {
            DEVICE_NAME_PROPERTY
        } else {
            STREAM_NAME_PROPERTY
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::OutputDevice => "output device",
            ObjectKind::InputDevice => "input device",
            ObjectKind::PlaybackStream => "playback stream",
            ObjectKind::RecordStream => "record stream",
        };
        f.write_str(s)
    }
}

/// Facility tag carried by server notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    /// Server-wide state, e.g. the default sink/source
    Server,
}

impl Facility {
    /// Parse the facility names used by `pactl subscribe`
    ///
    /// Returns None for facilities the engine does not track (client, card, module...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sink" => Some(Facility::Sink),
            "source" => Some(Facility::Source),
            "sink-input" => Some(Facility::SinkInput),
            "source-output" => Some(Facility::SourceOutput),
            "server" => Some(Facility::Server),
            _ => None,
        }
    }

    /// Object kind addressed by this facility (None for `Server`)
    pub fn object_kind(self) -> Option<ObjectKind> {
        match self {
            Facility::Sink => Some(ObjectKind::OutputDevice),
            Facility::Source => Some(ObjectKind::InputDevice),
            Facility::SinkInput => Some(ObjectKind::PlaybackStream),
            Facility::SourceOutput => Some(ObjectKind::RecordStream),
            Facility::Server => None,
        }
    }
}

impl From<ObjectKind> for Facility {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::OutputDevice => Facility::Sink,
            ObjectKind::InputDevice => Facility::Source,
            ObjectKind::PlaybackStream => Facility::SinkInput,
            ObjectKind::RecordStream => Facility::SourceOutput,
        }
    }
}

/// Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    New,
    Change,
    Remove,
}

/// One entry of the server notification stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerEvent {
    pub facility: Facility,
    pub event_type: EventType,
    pub index: u32,
}

impl ServerEvent {
    pub fn new(facility: Facility, event_type: EventType, index: u32) -> Self {
        Self {
            facility,
            event_type,
            index,
        }
    }
}

/// State shared by every live object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectState {
    /// Server-assigned numeric index
    pub index: u32,
    /// Server-assigned name (device name, or `media.name` for streams)
    pub name: String,
    /// Free-form property list
    pub properties: HashMap<String, String>,
    pub mute: bool,
    /// Raw per-channel volumes
    pub volumes: Vec<u32>,
}

/// A live object on the audio server
#[derive(Debug, Clone, PartialEq)]
pub enum AudioObject {
    /// Sink or source
    Device { kind: ObjectKind, state: ObjectState },
    /// Sink input or source output
    Stream { kind: ObjectKind, state: ObjectState },
}

impl AudioObject {
    pub fn new(kind: ObjectKind, state: ObjectState) -> Self {
        if kind.is_device() {
            AudioObject::Device { kind, state }
        } else {
            AudioObject::Stream { kind, state }
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            AudioObject::Device { kind, .. } | AudioObject::Stream { kind, .. } => *kind,
        }
    }

    pub fn state(&self) -> &ObjectState {
        match self {
            AudioObject::Device { state, .. } | AudioObject::Stream { state, .. } => state,
        }
    }

    pub fn state_mut(&mut self) -> &mut ObjectState {
        match self {
            AudioObject::Device { state, .. } | AudioObject::Stream { state, .. } => state,
        }
    }

    pub fn index(&self) -> u32 {
        self.state().index
    }

    pub fn name(&self) -> &str {
        &self.state().name
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.state().properties.get(key).map(String::as_str)
    }

    /// Human-readable name used to match targets
    ///
    /// Application name for streams, device description for devices, falling
    /// back to the server-assigned name when the property is missing.
    pub fn display_name(&self) -> &str {
        self.property(self.kind().name_property())
            .unwrap_or_else(|| self.name())
    }

    pub fn mute(&self) -> bool {
        self.state().mute
    }

    pub fn channel_count(&self) -> u8 {
        self.state().volumes.len().min(u8::MAX as usize) as u8
    }

    /// Mean channel volume, normalized (1.0 = 100%)
    pub fn volume(&self) -> f64 {
        let volumes = &self.state().volumes;
        if volumes.is_empty() {
            return 0.0;
        }
        let sum: u64 = volumes.iter().map(|v| *v as u64).sum();
        from_native(sum / volumes.len() as u64)
    }
}

/// Convert a normalized volume into the server's raw range
pub fn to_native(normalized: f64) -> u32 {
    (normalized.clamp(0.0, 1.0) * VOLUME_NORM as f64).round() as u32
}

/// Convert a raw server volume into a normalized value
pub fn from_native(raw: u64) -> f64 {
    raw as f64 / VOLUME_NORM as f64
}

/// Names of the current default devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDefaults {
    pub output: String,
    pub input: String,
}

impl ServerDefaults {
    /// Default device name for a device kind (None for streams)
    pub fn for_kind(&self, kind: ObjectKind) -> Option<&str> {
        match kind {
            ObjectKind::OutputDevice => Some(&self.output),
            ObjectKind::InputDevice => Some(&self.input),
            _ => None,
        }
    }
}

/// Ordered stream of server notifications
pub type EventStream = Pin<Box<dyn Stream<Item = ServerEvent> + Send>>;

/// Errors raised at the gateway boundary
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to run pactl: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("pactl {command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to decode pactl output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{kind} cannot be made the default")]
    NotADevice { kind: ObjectKind },

    #[error("notification stream unavailable: {0}")]
    Subscribe(String),
}

/// Audio server connection as seen by the synchronization engine
///
/// Every call is an independent request/response and may block on I/O.
#[async_trait]
pub trait AudioServer: Send + Sync {
    /// List every live object of a kind
    async fn enumerate(&self, kind: ObjectKind) -> Result<Vec<AudioObject>, GatewayError>;

    /// Look up a single object; Ok(None) if it no longer exists
    async fn query(&self, kind: ObjectKind, index: u32)
        -> Result<Option<AudioObject>, GatewayError>;

    /// Set every channel of an object to the same normalized volume
    ///
    /// The object's own channel layout is kept, whatever its channel count.
    async fn set_volume(
        &self,
        kind: ObjectKind,
        index: u32,
        volume: f64,
    ) -> Result<(), GatewayError>;

    async fn set_mute(&self, kind: ObjectKind, index: u32, mute: bool)
        -> Result<(), GatewayError>;

    /// Make the named device the default of its kind
    async fn set_default(&self, kind: ObjectKind, name: &str) -> Result<(), GatewayError>;

    async fn server_defaults(&self) -> Result<ServerDefaults, GatewayError>;

    /// Open the notification stream; it ends when the connection closes
    async fn subscribe(&self) -> Result<EventStream, GatewayError>;
}
