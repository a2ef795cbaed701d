//! SyncEngine - keeps targets consistent with the audio server
//!
//! Drives registry updates from a full bootstrap scan and from the server's
//! notification stream, and re-projects indicators after every change.
//! The engine is not synchronized itself: it is owned by the `SyncActor`,
//! which feeds it one command at a time.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::projector;
use super::registry::{TargetId, TargetRegistry};
use crate::audio::{
    AudioObject, AudioServer, EventType, Facility, ObjectKind, ServerDefaults, ServerEvent,
};
use crate::surface::IndicatorSink;

pub struct SyncEngine {
    pub(super) registry: TargetRegistry,
    pub(super) server: Arc<dyn AudioServer>,
    pub(super) indicators: Arc<dyn IndicatorSink>,
    /// Last known default device names
    pub(super) defaults: ServerDefaults,
}

impl SyncEngine {
    pub fn new(
        registry: TargetRegistry,
        server: Arc<dyn AudioServer>,
        indicators: Arc<dyn IndicatorSink>,
    ) -> Self {
        Self {
            registry,
            server,
            indicators,
            defaults: ServerDefaults::default(),
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Full scan of the server
    ///
    /// Merges every matching object into its target, then refreshes the
    /// default devices and re-projects all indicators. A kind that fails to
    /// enumerate is skipped and its targets keep their previous state.
    pub async fn bootstrap(&mut self) {
        info!("Bootstrapping {} targets", self.registry.len());

        for &kind in ObjectKind::all() {
            let objects = match self.server.enumerate(kind).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!("Failed to list {}s: {}", kind, e);
                    continue;
                }
            };

            for object in objects {
                let Some(id) = self.registry.find_by_name(kind, object.display_name()) else {
                    trace!("No target for {} '{}'", kind, object.display_name());
                    continue;
                };
                debug!(
                    "Matched target {} ('{}') to {} #{} ({})",
                    id.0,
                    object.display_name(),
                    kind,
                    object.index(),
                    object.name()
                );
                // Every target is re-rendered below
                self.registry.bind(id, &object);
            }
        }

        self.refresh_defaults().await;

        for id in self.registry.ids() {
            self.render(id);
        }
    }

    /// Query the default devices and recompute `is_default` for device targets
    pub async fn refresh_defaults(&mut self) {
        match self.server.server_defaults().await {
            Ok(defaults) => {
                debug!(
                    "Default output '{}', input '{}'",
                    defaults.output, defaults.input
                );
                self.defaults = defaults;
            }
            Err(e) => {
                warn!("Failed to query server defaults: {}", e);
                return;
            }
        }

        for id in self.registry.ids() {
            self.recompute_default(id);
        }
    }

    /// Derive `is_default` from the cached default names
    fn recompute_default(&mut self, id: TargetId) {
        let target = &self.registry[id];
        let Some(default_name) = self.defaults.for_kind(target.kind()) else {
            return;
        };
        let is_default = target.has_name(default_name);
        self.registry[id].is_default = is_default;
    }

    /// Apply one server notification
    pub async fn handle_event(&mut self, event: ServerEvent) {
        trace!(?event, "Server event");

        let Some(kind) = event.facility.object_kind() else {
            if event.facility == Facility::Server && event.event_type == EventType::Change {
                self.refresh_defaults().await;
                for id in self.registry.ids() {
                    if self.registry[id].kind().is_device() {
                        self.render(id);
                    }
                }
            }
            return;
        };

        match event.event_type {
            EventType::New => self.on_new(kind, event.index).await,
            EventType::Change => self.on_change(kind, event.index).await,
            EventType::Remove => self.on_remove(kind, event.index),
        }
    }

    async fn on_new(&mut self, kind: ObjectKind, index: u32) {
        let object = match self.server.query(kind, index).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                debug!("{} #{} vanished before it could be queried", kind, index);
                return;
            }
            Err(e) => {
                warn!("Failed to query new {} #{}: {}", kind, index, e);
                return;
            }
        };

        let Some(id) = self.registry.find_by_name(kind, object.display_name()) else {
            trace!("No target for new {} '{}'", kind, object.display_name());
            return;
        };

        info!(
            "Target {} ('{}') gained {} #{}",
            id.0,
            self.registry[id].match_name(),
            kind,
            index
        );
        self.bind(id, &object);
    }

    async fn on_change(&mut self, kind: ObjectKind, index: u32) {
        let Some(id) = self.registry.find_by_index(kind, index) else {
            return;
        };

        match self.server.query(kind, index).await {
            Ok(Some(object)) => self.bind(id, &object),
            Ok(None) => debug!("Changed {} #{} no longer exists", kind, index),
            Err(e) => warn!("Failed to query changed {} #{}: {}", kind, index, e),
        }
    }

    fn on_remove(&mut self, kind: ObjectKind, index: u32) {
        let Some(id) = self.registry.unbind(kind, index) else {
            return;
        };

        info!(
            "Target {} ('{}') lost {} #{}",
            id.0,
            self.registry[id].match_name(),
            kind,
            index
        );
        self.recompute_default(id);
        self.render(id);
    }

    /// Merge an object into a target and re-render everything it touched
    fn bind(&mut self, id: TargetId, object: &AudioObject) {
        let released = self.registry.bind(id, object);
        for other in released {
            debug!("{} #{} moved away from target {}", object.kind(), object.index(), other.0);
            self.recompute_default(other);
            self.render(other);
        }
        self.recompute_default(id);
        self.render(id);
    }

    /// Re-project one target's indicators
    pub fn render(&self, id: TargetId) {
        projector::render(&self.registry[id], self.indicators.as_ref());
    }

    /// Force every indicator off
    pub fn shutdown(&self) {
        info!("Clearing all indicators");
        for target in self.registry.targets() {
            projector::clear(target, self.indicators.as_ref());
        }
    }
}
