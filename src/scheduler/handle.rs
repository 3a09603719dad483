use crate::clock::clock::Clock;
use crate::error::SchedulerError;
use crate::scheduler::scheduler::{Command, Request};
use crate::scheduler::status::{SchedulerState, status_text};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable control surface for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<SchedulerState>,
    clock: Arc<dyn Clock>,
    default_pause: Duration,
}

impl SchedulerHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Request>,
        status: watch::Receiver<SchedulerState>,
        clock: Arc<dyn Clock>,
        default_pause: Duration,
    ) -> Self {
        Self {
            commands,
            status,
            clock,
            default_pause,
        }
    }

    /// Forward a system wake notification without waiting for it.
    pub fn wake(&self) -> Result<(), SchedulerError> {
        self.send(Command::Wake)
    }

    /// Send `command` and wait until the scheduler has applied it. Returns
    /// the state it left behind.
    pub async fn apply(&self, command: Command) -> Result<SchedulerState, SchedulerError> {
        let (reply, applied) = oneshot::channel();
        self.commands
            .send(Request {
                command,
                reply: Some(reply),
            })
            .map_err(|_| SchedulerError::Stopped)?;
        applied.await.map_err(|_| SchedulerError::Stopped)
    }

    /// Configured pause length (one hour unless overridden).
    pub fn default_pause(&self) -> Duration {
        self.default_pause
    }

    /// Latest published snapshot.
    pub fn state(&self) -> SchedulerState {
        self.status.borrow().clone()
    }

    /// Recomputed from the latest snapshot on every call.
    pub fn status_text(&self) -> String {
        status_text(&self.status.borrow(), self.clock.now())
    }

    /// Status text for a snapshot that may be newer than the watched one.
    pub fn describe(&self, state: &SchedulerState) -> String {
        status_text(state, self.clock.now())
    }

    /// Changes after every scheduler transition.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.status.clone()
    }

    fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.commands
            .send(Request {
                command,
                reply: None,
            })
            .map_err(|_| SchedulerError::Stopped)
    }
}
