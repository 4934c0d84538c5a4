use cue_proto::SourceRole;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Changeover to a role with no engine bound to it.
    #[error("no engine is configured for role {0}")]
    UnconfiguredRoleRequested(SourceRole),

    /// Single-engine setups have nothing to switch to.
    #[error("changeover is unavailable with a single engine")]
    ChangeoverUnavailable,
}
