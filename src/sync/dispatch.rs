//! Surface input dispatch
//!
//! Applies knob and button input to every live object bound to the addressed
//! targets. Cached state is updated before the server is told, so indicators
//! follow the user immediately; a later Change notification overwrites it.

use tracing::{debug, info, trace, warn};

use super::engine::SyncEngine;
use super::projector;
use super::registry::TargetId;
use super::target::Target;
use crate::audio::ObjectKind;
use crate::surface::SurfaceEvent;

impl SyncEngine {
    /// Apply one control-surface event
    pub async fn handle_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::ContinuousControl { id, value } => self.apply_volume(id, value).await,
            SurfaceEvent::DiscreteTrigger { id } => {
                self.toggle_mute(id).await;
                self.select_default(id).await;
            }
        }
    }

    fn targets_with(&self, pick: impl Fn(&Target) -> bool) -> Vec<TargetId> {
        self.registry
            .iter()
            .filter(|(_, t)| pick(t))
            .map(|(id, _)| id)
            .collect()
    }

    async fn apply_volume(&mut self, control: u8, value: f64) {
        let value = value.clamp(0.0, 1.0);
        let addressed = self.targets_with(|t| t.controls().volume == Some(control));
        if addressed.is_empty() {
            trace!("Control {} is not bound to a volume", control);
            return;
        }

        for id in addressed {
            let target = &mut self.registry[id];
            target.volume = value;
            let kind = target.kind();
            let indices: Vec<u32> = target.live_ids().iter().map(|l| l.index).collect();

            trace!("Volume of '{}' -> {:.3}", target.match_name(), value);
            for index in indices {
                if let Err(e) = self.server.set_volume(kind, index, value).await {
                    warn!("Failed to set volume of {} #{}: {}", kind, index, e);
                }
            }
        }
    }

    async fn toggle_mute(&mut self, control: u8) {
        for id in self.targets_with(|t| t.controls().mute == Some(control)) {
            let target = &mut self.registry[id];
            target.mute = !target.mute;
            let mute = target.mute;
            let kind = target.kind();
            let indicator = target.indicators().mute;
            let indices: Vec<u32> = target.live_ids().iter().map(|l| l.index).collect();

            debug!(
                "{} '{}' ({} bound)",
                if mute { "Muting" } else { "Unmuting" },
                target.match_name(),
                indices.len()
            );

            for index in indices {
                match self.server.set_mute(kind, index, mute).await {
                    Ok(()) => {
                        if let Some(led) = indicator {
                            projector::set(self.indicators.as_ref(), led, mute);
                        }
                    }
                    Err(e) => warn!("Failed to set mute of {} #{}: {}", kind, index, e),
                }
            }
        }
    }

    /// Make the addressed device target the default of its kind
    pub(super) async fn select_default(&mut self, control: u8) {
        let addressed =
            self.targets_with(|t| t.kind().is_device() && t.controls().default == Some(control));

        for id in addressed {
            let kind = self.registry[id].kind();

            for other in self.registry.ids_of_kind(kind) {
                if other == id {
                    continue;
                }
                self.registry[other].is_default = false;
                if let Some(led) = self.registry[other].indicators().default {
                    projector::set(self.indicators.as_ref(), led, false);
                }
            }

            let target = &mut self.registry[id];
            target.is_default = true;
            if let Some(led) = target.indicators().default {
                projector::set(self.indicators.as_ref(), led, true);
            }

            let name = target.first_name().unwrap_or_default().to_string();
            info!("Selecting '{}' as default {}", target.match_name(), kind);

            match kind {
                ObjectKind::OutputDevice => self.defaults.output = name.clone(),
                ObjectKind::InputDevice => self.defaults.input = name.clone(),
                _ => {}
            }

            if let Err(e) = self.server.set_default(kind, &name).await {
                warn!("Failed to set default {} to '{}': {}", kind, name, e);
            }
        }
    }
}
