//! Target type definitions
//!
//! A target binds a selection rule (object kind + display name) to the
//! surface controls and indicators configured for it, and caches the state of
//! whatever live objects currently match.

use crate::audio::{AudioObject, ObjectKind};
use crate::config::TargetConfig;

/// One live object bound to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveId {
    /// Server-assigned numeric index
    pub index: u32,
    /// Server-assigned name
    pub name: String,
}

/// Indicator (LED) numbers driven for a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorAssignments {
    pub presence: Option<u8>,
    pub mute: Option<u8>,
    pub default: Option<u8>,
}

impl IndicatorAssignments {
    /// Every assigned indicator
    pub fn all(&self) -> impl Iterator<Item = u8> {
        [self.presence, self.mute, self.default].into_iter().flatten()
    }
}

/// Control numbers that act on a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlAssignments {
    pub volume: Option<u8>,
    pub mute: Option<u8>,
    pub default: Option<u8>,
}

/// A configured binding and its last known state
///
/// `mute`, `volume` and `channel_count` are representative of the bound
/// objects: with several objects bound, the last processed event wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    kind: ObjectKind,
    match_name: String,
    indicators: IndicatorAssignments,
    controls: ControlAssignments,
    live_ids: Vec<LiveId>,
    pub mute: bool,
    /// Normalized volume (1.0 = 100%)
    pub volume: f64,
    pub channel_count: u8,
    pub is_default: bool,
}

impl Target {
    pub fn new(
        kind: ObjectKind,
        match_name: impl Into<String>,
        indicators: IndicatorAssignments,
        controls: ControlAssignments,
    ) -> Self {
        Self {
            kind,
            match_name: match_name.into(),
            indicators,
            controls,
            live_ids: Vec::new(),
            mute: false,
            volume: 0.0,
            channel_count: 0,
            is_default: false,
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(
            config.kind,
            config.name.clone(),
            IndicatorAssignments {
                presence: config.presence_indicator,
                mute: config.mute_indicator,
                default: config.default_indicator,
            },
            ControlAssignments {
                volume: config.volume_control,
                mute: config.mute_control,
                default: config.default_control,
            },
        )
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn match_name(&self) -> &str {
        &self.match_name
    }

    pub fn indicators(&self) -> &IndicatorAssignments {
        &self.indicators
    }

    pub fn controls(&self) -> &ControlAssignments {
        &self.controls
    }

    pub fn live_ids(&self) -> &[LiveId] {
        &self.live_ids
    }

    /// At least one matching object exists on the server
    pub fn is_present(&self) -> bool {
        !self.live_ids.is_empty()
    }

    pub fn owns(&self, index: u32) -> bool {
        self.live_ids.iter().any(|id| id.index == index)
    }

    /// Server name of the first bound object
    pub fn first_name(&self) -> Option<&str> {
        self.live_ids.first().map(|id| id.name.as_str())
    }

    /// Whether any bound object carries the given server name
    pub fn has_name(&self, name: &str) -> bool {
        self.live_ids.iter().any(|id| id.name == name)
    }

    /// Add a live object; an index already present only has its name refreshed
    ///
    /// Returns true if the index was new.
    pub(super) fn insert_live(&mut self, index: u32, name: &str) -> bool {
        if let Some(existing) = self.live_ids.iter_mut().find(|id| id.index == index) {
            if existing.name != name {
                existing.name = name.to_string();
            }
            return false;
        }
        self.live_ids.push(LiveId {
            index,
            name: name.to_string(),
        });
        true
    }

    /// Returns true if the index was bound
    pub(super) fn remove_live(&mut self, index: u32) -> bool {
        let before = self.live_ids.len();
        self.live_ids.retain(|id| id.index != index);
        self.live_ids.len() != before
    }

    /// Overwrite cached state from a fresh server object
    pub(super) fn absorb(&mut self, object: &AudioObject) {
        self.mute = object.mute();
        self.channel_count = object.channel_count();
        self.volume = object.volume();
    }
}
