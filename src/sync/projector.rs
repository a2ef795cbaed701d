//! Indicator projection
//!
//! Derives the LED state of a target from its cached state. Output is always
//! absolute on/off, never a toggle.

use tracing::{trace, warn};

use super::target::Target;
use crate::surface::IndicatorSink;

/// Indicator states for a target, one entry per assigned indicator
pub fn project(target: &Target) -> Vec<(u8, bool)> {
    let indicators = target.indicators();
    let mut states = Vec::with_capacity(3);

    if let Some(id) = indicators.presence {
        states.push((id, target.is_present()));
    }
    // Nothing to be muted without a live object
    if let Some(id) = indicators.mute {
        states.push((id, target.is_present() && target.mute));
    }
    if let Some(id) = indicators.default {
        states.push((id, target.is_default));
    }

    states
}

/// Push a target's projected state to the surface
pub fn render(target: &Target, sink: &dyn IndicatorSink) {
    for (id, on) in project(target) {
        set(sink, id, on);
    }
}

/// Switch off every indicator of a target, regardless of state
pub fn clear(target: &Target, sink: &dyn IndicatorSink) {
    for id in target.indicators().all() {
        set(sink, id, false);
    }
}

/// Set one indicator, logging failures
pub fn set(sink: &dyn IndicatorSink, id: u8, on: bool) {
    trace!(indicator = id, on, "Set indicator");
    if let Err(e) = sink.set_indicator(id, on) {
        warn!("Failed to set indicator {}: {}", id, e);
    }
}
