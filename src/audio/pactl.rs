//! `pactl` backend for the audio server gateway
//!
//! Works against PulseAudio and pipewire-pulse alike. Queries use the JSON
//! output format (`pactl --format=json`), notifications come from a
//! long-running `pactl subscribe` child process.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, trace, warn};

use super::{
    to_native, AudioObject, AudioServer, EventStream, EventType, Facility, GatewayError,
    ObjectKind, ObjectState, ServerDefaults, ServerEvent,
};

/// Property used as the server-assigned name of a stream
const STREAM_MEDIA_NAME: &str = "media.name";

/// Gateway shelling out to `pactl`
#[derive(Debug, Clone)]
pub struct PactlGateway {
    program: String,
    cache: Arc<ListingCache>,
}

/// Listings reused until the next notification or mutation
///
/// A listing is tagged with the generation current when it was requested.
/// Every forwarded notification bumps the generation, so a listing only
/// answers queries for events that were already received when it was taken.
#[derive(Debug, Default)]
struct ListingCache {
    generation: AtomicU64,
    listings: Mutex<HashMap<ObjectKind, (u64, Vec<AudioObject>)>>,
}

impl ListingCache {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn store(&self, kind: ObjectKind, generation: u64, objects: Vec<AudioObject>) {
        self.listings.lock().insert(kind, (generation, objects));
    }

    /// None on a miss, Some(None) if a fresh listing lacks the index
    fn find(&self, kind: ObjectKind, index: u32) -> Option<Option<AudioObject>> {
        let current = self.generation();
        let listings = self.listings.lock();
        let (generation, objects) = listings.get(&kind)?;
        (*generation == current).then(|| objects.iter().find(|obj| obj.index() == index).cloned())
    }
}

impl PactlGateway {
    /// Use a specific `pactl` executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cache: Arc::default(),
        }
    }

    /// Check that the audio server is reachable
    pub async fn connect(program: impl Into<String>) -> Result<Self, GatewayError> {
        let gateway = Self::with_program(program);
        let info = gateway.server_info().await?;
        info!(
            "🔊 Connected to {} {}",
            info.server_name.as_deref().unwrap_or("audio server"),
            info.server_version.as_deref().unwrap_or("")
        );
        Ok(gateway)
    }

    /// Run pactl and return stdout
    async fn run(&self, args: &[String]) -> Result<Vec<u8>, GatewayError> {
        trace!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(GatewayError::Command {
                command: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn server_info(&self) -> Result<ServerInfo, GatewayError> {
        let stdout = self.run(&json_args(&["info"])).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

#[async_trait]
impl AudioServer for PactlGateway {
    async fn enumerate(&self, kind: ObjectKind) -> Result<Vec<AudioObject>, GatewayError> {
        let generation = self.cache.generation();
        let stdout = self.run(&json_args(&["list", list_noun(kind)])).await?;
        let objects = decode_objects(kind, &stdout)?;
        self.cache.store(kind, generation, objects.clone());
        Ok(objects)
    }

    async fn query(
        &self,
        kind: ObjectKind,
        index: u32,
    ) -> Result<Option<AudioObject>, GatewayError> {
        if let Some(found) = self.cache.find(kind, index) {
            trace!("{} #{} answered from cached listing", kind, index);
            return Ok(found);
        }

        // pactl has no point query; filter the listing
        Ok(self
            .enumerate(kind)
            .await?
            .into_iter()
            .find(|obj| obj.index() == index))
    }

    async fn set_volume(
        &self,
        kind: ObjectKind,
        index: u32,
        volume: f64,
    ) -> Result<(), GatewayError> {
        // A single value applies to every channel of the object
        let args = vec![
            format!("set-{}-volume", command_noun(kind)),
            index.to_string(),
            to_native(volume).to_string(),
        ];
        self.run(&args).await?;
        self.cache.invalidate();
        Ok(())
    }

    async fn set_mute(
        &self,
        kind: ObjectKind,
        index: u32,
        mute: bool,
    ) -> Result<(), GatewayError> {
        let args = vec![
            format!("set-{}-mute", command_noun(kind)),
            index.to_string(),
            if mute { "1" } else { "0" }.to_string(),
        ];
        self.run(&args).await?;
        self.cache.invalidate();
        Ok(())
    }

    async fn set_default(&self, kind: ObjectKind, name: &str) -> Result<(), GatewayError> {
        if !kind.is_device() {
            return Err(GatewayError::NotADevice { kind });
        }
        let args = vec![
            format!("set-default-{}", command_noun(kind)),
            name.to_string(),
        ];
        self.run(&args).await?;
        Ok(())
    }

    async fn server_defaults(&self) -> Result<ServerDefaults, GatewayError> {
        let info = self.server_info().await?;
        Ok(ServerDefaults {
            output: info.default_sink_name.unwrap_or_default(),
            input: info.default_source_name.unwrap_or_default(),
        })
    }

    async fn subscribe(&self) -> Result<EventStream, GatewayError> {
        let mut child = Command::new(&self.program)
            .arg("subscribe")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Subscribe("no stdout from pactl subscribe".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cache = self.cache.clone();

        // The task owns the child and kills it once the stream is dropped
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    _ = tx.closed() => {
                        debug!("Notification stream dropped");
                        break;
                    }
                };

                match line {
                    Ok(Some(line)) => match parse_event_line(&line) {
                        Ok(Some(event)) => {
                            cache.invalidate();
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => trace!("Ignoring notification: {}", line),
                        Err(e) => warn!("{}", e),
                    },
                    Ok(None) => {
                        info!("pactl subscribe closed its output");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read pactl subscribe output: {}", e);
                        break;
                    }
                }
            }
            if let Err(e) = child.kill().await {
                debug!("pactl subscribe already exited: {}", e);
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

fn json_args(args: &[&str]) -> Vec<String> {
    std::iter::once("--format=json")
        .chain(args.iter().copied())
        .map(String::from)
        .collect()
}

/// Noun used by `pactl list`
fn list_noun(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::OutputDevice => "sinks",
        ObjectKind::InputDevice => "sources",
        ObjectKind::PlaybackStream => "sink-inputs",
        ObjectKind::RecordStream => "source-outputs",
    }
}

/// Noun used by the `set-*` commands
fn command_noun(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::OutputDevice => "sink",
        ObjectKind::InputDevice => "source",
        ObjectKind::PlaybackStream => "sink-input",
        ObjectKind::RecordStream => "source-output",
    }
}

/// Subset of `pactl --format=json info`
#[derive(Debug, Deserialize)]
struct ServerInfo {
    server_name: Option<String>,
    server_version: Option<String>,
    default_sink_name: Option<String>,
    default_source_name: Option<String>,
}

/// One channel of a JSON volume map
#[derive(Debug, Deserialize)]
struct ChannelVolume {
    value: u32,
}

/// Fields shared by the four `pactl list` JSON shapes
#[derive(Debug, Deserialize)]
struct RawObject {
    index: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    volume: BTreeMap<String, ChannelVolume>,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

/// Decode a `pactl --format=json list <noun>` document
pub(crate) fn decode_objects(
    kind: ObjectKind,
    json: &[u8],
) -> Result<Vec<AudioObject>, GatewayError> {
    let raw: Vec<RawObject> = serde_json::from_slice(json)?;
    Ok(raw.into_iter().map(|obj| into_object(kind, obj)).collect())
}

fn into_object(kind: ObjectKind, raw: RawObject) -> AudioObject {
    let properties: HashMap<String, String> = raw
        .properties
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect();

    // Streams have no server-assigned name
    let name = raw
        .name
        .or_else(|| properties.get(STREAM_MEDIA_NAME).cloned())
        .unwrap_or_else(|| raw.index.to_string());

    let state = ObjectState {
        index: raw.index,
        name,
        properties,
        mute: raw.mute,
        volumes: raw.volume.values().map(|c| c.value).collect(),
    };

    match kind {
        ObjectKind::OutputDevice | ObjectKind::InputDevice => AudioObject::Device { kind, state },
        ObjectKind::PlaybackStream | ObjectKind::RecordStream => {
            AudioObject::Stream { kind, state }
        }
    }
}

/// Parse one `pactl subscribe` line: `Event 'change' on sink-input #42`
///
/// Returns Ok(None) for facilities the engine does not track.
pub(crate) fn parse_event_line(line: &str) -> Result<Option<ServerEvent>, GatewayError> {
    let malformed = || GatewayError::Subscribe(format!("malformed notification: {:?}", line));

    let rest = line.trim().strip_prefix("Event '").ok_or_else(malformed)?;
    let (event_type, rest) = rest.split_once("' on ").ok_or_else(malformed)?;
    let (facility, index) = rest.rsplit_once(" #").ok_or_else(malformed)?;

    let event_type = match event_type {
        "new" => EventType::New,
        "change" => EventType::Change,
        "remove" => EventType::Remove,
        _ => return Err(malformed()),
    };

    let facility = match Facility::parse(facility) {
        Some(f) => f,
        None => return Ok(None),
    };

    // The server facility reports an invalid index
    let index = match facility {
        Facility::Server => u32::MAX,
        _ => index.trim().parse().map_err(|_| malformed())?,
    };

    Ok(Some(ServerEvent::new(facility, event_type, index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINKS: &str = r#"[
        {
            "index": 5,
            "state": "RUNNING",
            "name": "speakers-id",
            "description": "Speakers",
            "mute": true,
            "volume": {
                "front-left": {"value": 65536, "value_percent": "100%", "db": "0.00 dB"},
                "front-right": {"value": 32768, "value_percent": "50%", "db": "-18.06 dB"}
            },
            "properties": {"device.description": "Speakers", "alsa.card": "1"}
        }
    ]"#;

    const SINK_INPUTS: &str = r#"[
        {
            "index": 42,
            "sink": 5,
            "mute": false,
            "volume": {"mono": {"value": 65536, "value_percent": "100%", "db": "0.00 dB"}},
            "properties": {"application.name": "Firefox", "media.name": "Playback", "application.process.id": 1234}
        },
        {
            "index": 43,
            "sink": 5,
            "mute": false,
            "volume": {},
            "properties": {}
        }
    ]"#;

    #[test]
    fn test_decode_sinks() {
        let objects = decode_objects(ObjectKind::OutputDevice, SINKS.as_bytes()).unwrap();
        assert_eq!(objects.len(), 1);

        let sink = &objects[0];
        assert!(matches!(sink, AudioObject::Device { .. }));
        assert_eq!(sink.index(), 5);
        assert_eq!(sink.name(), "speakers-id");
        assert_eq!(sink.display_name(), "Speakers");
        assert!(sink.mute());
        assert_eq!(sink.channel_count(), 2);
    }

    #[test]
    fn test_decode_sink_inputs() {
        let objects = decode_objects(ObjectKind::PlaybackStream, SINK_INPUTS.as_bytes()).unwrap();
        assert_eq!(objects.len(), 2);

        match &objects[0] {
            AudioObject::Stream { state, .. } => {
                assert_eq!(state.name, "Playback");
                assert_eq!(state.properties["application.process.id"], "1234");
            }
            other => panic!("expected stream, got {:?}", other),
        }
        assert_eq!(objects[0].display_name(), "Firefox");

        // No media.name and no application.name: index is the only name left
        assert_eq!(objects[1].name(), "43");
        assert_eq!(objects[1].display_name(), "43");
        assert_eq!(objects[1].channel_count(), 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_objects(ObjectKind::OutputDevice, b"Failure: Connection refused"),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_event_lines() {
        assert_eq!(
            parse_event_line("Event 'change' on sink #5").unwrap(),
            Some(ServerEvent::new(Facility::Sink, EventType::Change, 5))
        );
        assert_eq!(
            parse_event_line("Event 'new' on sink-input #42").unwrap(),
            Some(ServerEvent::new(Facility::SinkInput, EventType::New, 42))
        );
        assert_eq!(
            parse_event_line("Event 'remove' on source-output #7\n").unwrap(),
            Some(ServerEvent::new(Facility::SourceOutput, EventType::Remove, 7))
        );
        assert_eq!(
            parse_event_line("Event 'change' on server #-1").unwrap(),
            Some(ServerEvent::new(Facility::Server, EventType::Change, u32::MAX))
        );
    }

    #[test]
    fn test_parse_event_ignores_untracked_facilities() {
        assert_eq!(parse_event_line("Event 'new' on client #88").unwrap(), None);
        assert_eq!(parse_event_line("Event 'change' on card #1").unwrap(), None);
    }

    #[test]
    fn test_parse_event_rejects_malformed() {
        assert!(parse_event_line("hello").is_err());
        assert!(parse_event_line("Event 'explode' on sink #1").is_err());
        assert!(parse_event_line("Event 'new' on sink #abc").is_err());
    }

    #[test]
    fn test_command_nouns() {
        assert_eq!(list_noun(ObjectKind::RecordStream), "source-outputs");
        assert_eq!(command_noun(ObjectKind::PlaybackStream), "sink-input");
        assert_eq!(json_args(&["list", "sinks"]), vec!["--format=json", "list", "sinks"]);
    }

    #[test]
    fn test_listing_cache_follows_generation() {
        let cache = ListingCache::default();
        assert_eq!(cache.find(ObjectKind::OutputDevice, 5), None);

        let sinks = decode_objects(ObjectKind::OutputDevice, SINKS.as_bytes()).unwrap();
        cache.store(ObjectKind::OutputDevice, cache.generation(), sinks);
        assert_eq!(
            cache.find(ObjectKind::OutputDevice, 5).flatten().map(|o| o.index()),
            Some(5)
        );
        // Fresh listing without the index
        assert_eq!(cache.find(ObjectKind::OutputDevice, 9), Some(None));
        // Listings are per kind
        assert_eq!(cache.find(ObjectKind::InputDevice, 5), None);

        cache.invalidate();
        assert_eq!(cache.find(ObjectKind::OutputDevice, 5), None);
    }

    #[test]
    fn test_listing_requested_before_a_notification_is_stale() {
        let cache = ListingCache::default();
        let requested_at = cache.generation();
        // Notification received while the listing was in flight
        cache.invalidate();
        let sinks = decode_objects(ObjectKind::OutputDevice, SINKS.as_bytes()).unwrap();
        cache.store(ObjectKind::OutputDevice, requested_at, sinks);
        assert_eq!(cache.find(ObjectKind::OutputDevice, 5), None);
    }

    #[tokio::test]
    async fn test_query_reuses_listing_until_invalidated() {
        let gateway = PactlGateway::with_program("/nonexistent/pactl-for-tests");
        let sinks = decode_objects(ObjectKind::OutputDevice, SINKS.as_bytes()).unwrap();
        gateway.cache.store(ObjectKind::OutputDevice, gateway.cache.generation(), sinks);

        // Answered without running pactl
        let found = gateway.query(ObjectKind::OutputDevice, 5).await.unwrap();
        assert_eq!(found.map(|o| o.display_name().to_string()), Some("Speakers".into()));

        gateway.cache.invalidate();
        let err = gateway.query(ObjectKind::OutputDevice, 5).await.unwrap_err();
        assert!(matches!(err, GatewayError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let gateway = PactlGateway::with_program("/nonexistent/pactl-for-tests");
        let err = gateway.enumerate(ObjectKind::OutputDevice).await.unwrap_err();
        assert!(matches!(err, GatewayError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_set_default_rejects_streams() {
        let gateway = PactlGateway::with_program("/nonexistent/pactl-for-tests");
        let err = gateway
            .set_default(ObjectKind::PlaybackStream, "Firefox")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotADevice { .. }));
    }
}
