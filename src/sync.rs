//! Target synchronization
//!
//! Keeps the configured targets in step with the audio server and the surface
//! indicators. All target mutation happens inside the `SyncActor`; callers
//! talk to it through a `SyncHandle`.

mod actor;
mod actor_handle;
mod commands;
mod dispatch;
mod engine;
mod projector;
mod registry;
mod target;

#[cfg(test)]
mod testing;

pub use actor::SyncActor;
pub use actor_handle::SyncHandle;
pub use commands::SyncCommand;
pub use engine::SyncEngine;
pub use projector::project;
pub use registry::{TargetId, TargetRegistry};
pub use target::{ControlAssignments, IndicatorAssignments, LiveId, Target};
