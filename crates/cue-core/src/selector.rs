use cue_proto::SourceRole;

use crate::error::BridgeError;

/// Which engine feeds the display.
///
/// `Only` is terminal: a single-engine bridge never switches. With a pair,
/// `Main` and `Backup` may switch freely in either direction.
#[derive(Debug, Clone)]
pub struct SourceSelector {
    selected: SourceRole,
    configured: Vec<SourceRole>,
}

impl SourceSelector {
    pub fn new(configured: &[SourceRole]) -> Self {
        let selected = if configured.contains(&SourceRole::Main) {
            SourceRole::Main
        } else {
            SourceRole::Only
        };
        Self {
            selected,
            configured: configured.to_vec(),
        }
    }

    pub fn selected(&self) -> SourceRole {
        self.selected
    }

    pub fn is_configured(&self, role: SourceRole) -> bool {
        self.configured.contains(&role)
    }

    pub fn can_switch(&self) -> bool {
        self.selected != SourceRole::Only
    }

    /// Switch to `role`. The selection is left alone on error.
    pub fn changeover(&mut self, role: SourceRole) -> Result<SourceRole, BridgeError> {
        if !self.can_switch() {
            return Err(BridgeError::ChangeoverUnavailable);
        }
        if role == SourceRole::Only || !self.is_configured(role) {
            return Err(BridgeError::UnconfiguredRoleRequested(role));
        }
        let previous = self.selected;
        self.selected = role;
        Ok(previous)
    }
}
