use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Which configured engine a message, request or display decision refers to.
///
/// With a single engine configured the only role is `Only`; with two engines
/// they are bound to `Main` and `Backup` and the operator can switch between
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceRole {
    Main,
    Backup,
    Only,
}

impl SourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRole::Main => "MAIN",
            SourceRole::Backup => "BACKUP",
            SourceRole::Only => "ONLY",
        }
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceRole {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MAIN" => Ok(SourceRole::Main),
            "BACKUP" => Ok(SourceRole::Backup),
            "ONLY" => Ok(SourceRole::Only),
            _ => Err(ProtoError::UnknownRole(s.to_string())),
        }
    }
}
