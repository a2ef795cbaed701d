//! Commands accepted by the sync actor
//!
//! Event commands are fire-and-forget; queries and shutdown answer through a
//! oneshot channel.

use tokio::sync::oneshot;

use super::target::Target;
use crate::audio::ServerEvent;
use crate::surface::SurfaceEvent;

#[derive(Debug)]
pub enum SyncCommand {
    // -------------------------------------------------------------------------
    // Events (no response)
    // -------------------------------------------------------------------------
    /// Full scan of the audio server
    Bootstrap,

    /// Notification from the audio server
    ServerEvent(ServerEvent),

    /// Input from the control surface
    Surface(SurfaceEvent),

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Copy of every target, in configuration order
    Snapshot {
        response: oneshot::Sender<Vec<Target>>,
    },

    /// Clear all indicators and stop; answered once the indicators are off
    Shutdown { response: oneshot::Sender<()> },
}
