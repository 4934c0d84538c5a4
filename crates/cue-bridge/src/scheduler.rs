//! Keyed, cancellable timers.
//!
//! Timers only enqueue a `BridgeEvent`; the core loop does the work. Each
//! (engine, kind) key holds at most one task, and scheduling a key again
//! aborts whatever was there.

use std::collections::HashMap;
use std::time::Duration;

use cue_proto::SourceRole;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::core::BridgeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Heartbeat,
    LivenessPoll,
    Settle,
    Reconnect,
}

pub struct Scheduler {
    event_tx: mpsc::Sender<BridgeEvent>,
    tasks: HashMap<(SourceRole, TimerKind), AbortHandle>,
}

impl Scheduler {
    pub fn new(event_tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            event_tx,
            tasks: HashMap::new(),
        }
    }

    /// Repeat `event()` every `period`, first firing one period from now.
    pub fn every<F>(&mut self, role: SourceRole, kind: TimerKind, period: Duration, event: F)
    where
        F: Fn() -> BridgeEvent + Send + 'static,
    {
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(event()).await.is_err() {
                    break;
                }
            }
        });
        self.insert(role, kind, handle.abort_handle());
    }

    /// Fire `event` once after `delay`.
    pub fn after(&mut self, role: SourceRole, kind: TimerKind, delay: Duration, event: BridgeEvent) {
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
        self.insert(role, kind, handle.abort_handle());
    }

    pub fn cancel(&mut self, role: SourceRole, kind: TimerKind) {
        if let Some(handle) = self.tasks.remove(&(role, kind)) {
            debug!("cancel {:?} timer for {}", kind, role);
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    fn insert(&mut self, role: SourceRole, kind: TimerKind, handle: AbortHandle) {
        if let Some(previous) = self.tasks.insert((role, kind), handle) {
            previous.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
