//! In-memory test doubles for the sync engine

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::audio::{
    to_native, AudioObject, AudioServer, EventStream, EventType, GatewayError, ObjectKind,
    ObjectState, ServerDefaults, ServerEvent, DEVICE_NAME_PROPERTY, STREAM_NAME_PROPERTY,
    VOLUME_NORM,
};
use crate::surface::IndicatorSink;

/// Gateway call recorded by the fake
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetVolume {
        kind: ObjectKind,
        index: u32,
        volume: f64,
    },
    SetMute {
        kind: ObjectKind,
        index: u32,
        mute: bool,
    },
    SetDefault {
        kind: ObjectKind,
        name: String,
    },
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<(u8, u32), AudioObject>,
    defaults: ServerDefaults,
    calls: Vec<Call>,
    fail_mutations: bool,
    fail_enumerate: Vec<ObjectKind>,
    subscriber: Option<mpsc::UnboundedSender<ServerEvent>>,
}

fn key(kind: ObjectKind, index: u32) -> (u8, u32) {
    (kind as u8, index)
}

/// Audio server backed by a map of objects
///
/// Mutations are recorded and, unless failing, applied to the stored objects
/// without emitting notifications; tests emit those explicitly.
#[derive(Default, Clone)]
pub struct FakeAudioServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAudioServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object
    pub fn put(&self, object: AudioObject) {
        let mut state = self.state.lock();
        state.objects.insert(key(object.kind(), object.index()), object);
    }

    pub fn remove(&self, kind: ObjectKind, index: u32) {
        self.state.lock().objects.remove(&key(kind, index));
    }

    /// Change one stored object in place
    pub fn update(&self, kind: ObjectKind, index: u32, f: impl FnOnce(&mut ObjectState)) {
        if let Some(object) = self.state.lock().objects.get_mut(&key(kind, index)) {
            f(object.state_mut());
        }
    }

    pub fn set_defaults(&self, output: &str, input: &str) {
        self.state.lock().defaults = ServerDefaults {
            output: output.to_string(),
            input: input.to_string(),
        };
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.state.lock().fail_mutations = fail;
    }

    pub fn fail_enumerate(&self, kind: ObjectKind) {
        self.state.lock().fail_enumerate.push(kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Push a notification to the open subscription, if any
    pub fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &self.state.lock().subscriber {
            let _ = tx.send(event);
        }
    }

    /// Close the subscription stream
    pub fn close_stream(&self) {
        self.state.lock().subscriber = None;
    }

    fn record(&self, call: Call) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        if state.fail_mutations {
            return Err(GatewayError::Command {
                command: format!("{:?}", call),
                status: "exit status: 1".to_string(),
                stderr: "Failure: No such entity".to_string(),
            });
        }

        match call {
            Call::SetVolume {
                kind,
                index,
                volume,
            } => {
                // Like pactl with a single value: every channel, layout kept
                if let Some(object) = state.objects.get_mut(&key(kind, index)) {
                    for channel in object.state_mut().volumes.iter_mut() {
                        *channel = to_native(volume);
                    }
                }
            }
            Call::SetMute { kind, index, mute } => {
                if let Some(object) = state.objects.get_mut(&key(kind, index)) {
                    object.state_mut().mute = mute;
                }
            }
            Call::SetDefault { kind, name } => match kind {
                ObjectKind::OutputDevice => state.defaults.output = name,
                ObjectKind::InputDevice => state.defaults.input = name,
                _ => return Err(GatewayError::NotADevice { kind }),
            },
        }
        Ok(())
    }
}

#[async_trait]
impl AudioServer for FakeAudioServer {
    async fn enumerate(&self, kind: ObjectKind) -> Result<Vec<AudioObject>, GatewayError> {
        let state = self.state.lock();
        if state.fail_enumerate.contains(&kind) {
            return Err(GatewayError::Subscribe("connection refused".to_string()));
        }
        Ok(state
            .objects
            .values()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect())
    }

    async fn query(
        &self,
        kind: ObjectKind,
        index: u32,
    ) -> Result<Option<AudioObject>, GatewayError> {
        Ok(self.state.lock().objects.get(&key(kind, index)).cloned())
    }

    async fn set_volume(
        &self,
        kind: ObjectKind,
        index: u32,
        volume: f64,
    ) -> Result<(), GatewayError> {
        self.record(Call::SetVolume {
            kind,
            index,
            volume,
        })
    }

    async fn set_mute(&self, kind: ObjectKind, index: u32, mute: bool) -> Result<(), GatewayError> {
        self.record(Call::SetMute { kind, index, mute })
    }

    async fn set_default(&self, kind: ObjectKind, name: &str) -> Result<(), GatewayError> {
        self.record(Call::SetDefault {
            kind,
            name: name.to_string(),
        })
    }

    async fn server_defaults(&self) -> Result<ServerDefaults, GatewayError> {
        Ok(self.state.lock().defaults.clone())
    }

    async fn subscribe(&self) -> Result<EventStream, GatewayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscriber = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Indicator sink remembering the last state of every indicator
#[derive(Default)]
pub struct RecordingSink {
    states: Mutex<HashMap<u8, bool>>,
    log: Mutex<Vec<(u8, bool)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Last state sent to an indicator; None if never set
    pub fn state(&self, id: u8) -> Option<bool> {
        self.states.lock().get(&id).copied()
    }

    /// True if the indicator was last set on
    pub fn is_on(&self, id: u8) -> bool {
        self.state(id) == Some(true)
    }

    pub fn log(&self) -> Vec<(u8, bool)> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

impl IndicatorSink for RecordingSink {
    fn set_indicator(&self, id: u8, on: bool) -> Result<()> {
        self.states.lock().insert(id, on);
        self.log.lock().push((id, on));
        Ok(())
    }
}

/// Object named the way the engine matches its kind
pub fn object(kind: ObjectKind, index: u32, display: &str, server_name: &str) -> AudioObject {
    let property = if kind.is_device() {
        DEVICE_NAME_PROPERTY
    } else {
        STREAM_NAME_PROPERTY
    };
    AudioObject::new(
        kind,
        ObjectState {
            index,
            name: server_name.to_string(),
            properties: HashMap::from([(property.to_string(), display.to_string())]),
            mute: false,
            volumes: vec![VOLUME_NORM; 2],
        },
    )
}

pub fn event(kind: ObjectKind, event_type: EventType, index: u32) -> ServerEvent {
    ServerEvent::new(kind.into(), event_type, index)
}
