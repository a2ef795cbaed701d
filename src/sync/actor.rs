//! SyncActor - single owner of the target set
//!
//! Server notifications and surface input both mutate targets. Funnelling
//! them through one command channel processes them strictly one at a time,
//! in arrival order, without locks.

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::actor_handle::SyncHandle;
use super::commands::SyncCommand;
use super::engine::SyncEngine;

pub struct SyncActor {
    engine: SyncEngine,

    /// Receiver for incoming commands
    command_rx: mpsc::UnboundedReceiver<SyncCommand>,

    /// Server and surface events processed
    event_count: u64,
}

impl SyncActor {
    /// Spawn the actor's run loop and return a handle to it
    pub fn spawn(engine: SyncEngine) -> SyncHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = SyncActor {
            engine,
            command_rx: cmd_rx,
            event_count: 0,
        };

        tokio::spawn(actor.run());

        info!("SyncActor spawned");
        SyncHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("SyncActor run loop started");
        let mut cleared = false;

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                SyncCommand::Bootstrap => {
                    self.engine.bootstrap().await;
                }
                SyncCommand::ServerEvent(event) => {
                    self.event_count += 1;
                    self.engine.handle_event(event).await;
                }
                SyncCommand::Surface(event) => {
                    self.event_count += 1;
                    self.engine.handle_surface_event(event).await;
                }
                SyncCommand::Snapshot { response } => {
                    let _ = response.send(self.engine.registry().targets().to_vec());
                }
                SyncCommand::Shutdown { response } => {
                    info!("SyncActor received shutdown command");
                    self.engine.shutdown();
                    cleared = true;
                    let _ = response.send(());
                    break;
                }
            }
        }

        // Every handle dropped without an explicit shutdown
        if !cleared {
            self.engine.shutdown();
        }

        info!(
            event_count = self.event_count,
            "SyncActor run loop terminated"
        );
    }
}
