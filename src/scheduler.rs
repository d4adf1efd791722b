use crate::types::DuelId;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A delayed follow-up. Firing one is always safe: the handler re-checks the
/// duel's status and does nothing if the duel has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduledAction {
    ExpireDuel(DuelId),
    StartDuel(DuelId),
    ExpireMulti(DuelId),
    StartMulti(DuelId),
}

impl ScheduledAction {
    pub fn duel_id(self) -> DuelId {
        match self {
            Self::ExpireDuel(id) | Self::StartDuel(id) | Self::ExpireMulti(id) | Self::StartMulti(id) => id,
        }
    }
}

impl fmt::Display for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpireDuel(id) => write!(f, "expire duel {}", id),
            Self::StartDuel(id) => write!(f, "start duel {}", id),
            Self::ExpireMulti(id) => write!(f, "expire multiplayer duel {}", id),
            Self::StartMulti(id) => write!(f, "start multiplayer duel {}", id),
        }
    }
}

pub trait Scheduler {
    fn schedule(&self, delay: Duration, action: ScheduledAction);
}

/// Records what would have been scheduled; tests fire the actions by hand.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    queued: Mutex<Vec<(Duration, ScheduledAction)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<(Duration, ScheduledAction)> {
        self.queued.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn drain(&self) -> Vec<ScheduledAction> {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .map(|(_, action)| action)
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: ScheduledAction) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((delay, action));
    }
}

/// Sleeps on the tokio runtime and forwards each action to [`drive_timers`].
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    tx: mpsc::UnboundedSender<ScheduledAction>,
}

impl TokioScheduler {
    pub fn channel(runtime: Handle) -> (Self, mpsc::UnboundedReceiver<ScheduledAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { runtime, tx }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: ScheduledAction) {
        let tx = self.tx.clone();
        tracing::debug!(%action, delay_secs = delay.as_secs(), "timer scheduled");
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(action).is_err() {
                tracing::warn!(%action, "timer fired after the driver stopped");
            }
        });
    }
}

/// Hands fired actions to `fire` one at a time until every sender is gone.
pub async fn drive_timers<F>(mut rx: mpsc::UnboundedReceiver<ScheduledAction>, mut fire: F)
where
    F: FnMut(ScheduledAction),
{
    while let Some(action) = rx.recv().await {
        tracing::debug!(%action, "timer fired");
        fire(action);
    }
}
