//! SyncHandle - public API of the SyncActor
//!
//! Event methods are fire-and-forget so the notification and MIDI loops never
//! wait on gateway calls; queries await a oneshot response.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::actor::SyncActor;
use super::commands::SyncCommand;
use super::engine::SyncEngine;
use super::target::Target;
use crate::audio::ServerEvent;
use crate::surface::SurfaceEvent;

#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<SyncCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Spawn a SyncActor owning `engine`
    pub fn spawn(engine: SyncEngine) -> Self {
        SyncActor::spawn(engine)
    }

    /// Queue a full scan of the audio server
    pub fn bootstrap(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Bootstrap);
    }

    /// Queue another full scan once `delay` has elapsed
    ///
    /// Catches objects that appear shortly after the first scan.
    pub fn bootstrap_after(&self, delay: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if handle.is_alive() {
                debug!("Running delayed bootstrap");
                handle.bootstrap();
            } else {
                debug!("Sync actor stopped before the delayed bootstrap");
            }
        })
    }

    pub fn server_event(&self, event: ServerEvent) {
        let _ = self.cmd_tx.send(SyncCommand::ServerEvent(event));
    }

    pub fn surface_event(&self, event: SurfaceEvent) {
        let _ = self.cmd_tx.send(SyncCommand::Surface(event));
    }

    /// Copy of every target, taken after all previously queued commands
    ///
    /// Empty if the actor has stopped.
    pub async fn snapshot(&self) -> Vec<Target> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SyncCommand::Snapshot {
                response: response_tx,
            })
            .is_err()
        {
            return Vec::new();
        }
        response_rx.await.ok().unwrap_or_default()
    }

    /// Clear every indicator and stop the actor
    ///
    /// Returns once the indicators are off, or immediately if the actor is
    /// already gone.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SyncCommand::Shutdown {
                response: response_tx,
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// Returns false once the actor has stopped
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}
