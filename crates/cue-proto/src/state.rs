use crate::protocol::{BridgeState, EngineStatus, LinkHealth};
use crate::role::SourceRole;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, revisioned snapshot of the bridge for control clients.
///
/// Only the bridge event loop writes; socket handlers read.
pub struct StateManager {
    state: Arc<RwLock<BridgeState>>,
}

impl StateManager {
    pub fn new(selected: SourceRole, engines: Vec<EngineStatus>) -> Self {
        let state = BridgeState {
            rev: 1,
            selected: Some(selected),
            engines,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn get_state(&self) -> BridgeState {
        self.state.read().await.clone()
    }

    /// Replace selection and per-engine tracking, keeping each engine's link
    /// health.  Returns `true` (and bumps `rev`) only if something changed.
    pub async fn publish(&self, selected: SourceRole, engines: Vec<EngineStatus>) -> bool {
        let mut state = self.state.write().await;

        let merged: Vec<EngineStatus> = engines
            .into_iter()
            .map(|mut engine| {
                if let Some(prev) = state.engines.iter().find(|e| e.role == engine.role) {
                    engine.link = prev.link.clone();
                }
                engine
            })
            .collect();

        if state.selected == Some(selected) && state.engines == merged {
            return false;
        }
        state.selected = Some(selected);
        state.engines = merged;
        state.rev += 1;
        true
    }

    pub async fn set_link_health(&self, role: SourceRole, health: LinkHealth) -> bool {
        let mut state = self.state.write().await;
        let Some(engine) = state.engines.iter_mut().find(|e| e.role == Some(role)) else {
            return false;
        };
        if engine.link == health {
            return false;
        }
        engine.link = health;
        state.rev += 1;
        true
    }
}
