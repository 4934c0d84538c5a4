//! QLab OSC address scheme.
//!
//! Requests go to `/workspace/{ws}/…`. QLab answers on the same address
//! prefixed with `/reply`, and pushes unsolicited changes under `/update`.
//! There is no request id, so inbound messages are classified purely by
//! address shape; the cue id embedded in `…/cue_id/{id}/…` replies is the
//! only correlation handle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ProtoError;

pub const REPLY_PREFIX: &str = "/reply";
pub const UPDATE_PREFIX: &str = "/update";

const PLAYHEAD_SUFFIX: &str = "/playheadId";
const NAME_SUFFIX: &str = "/displayName";
const NUMBER_SUFFIX: &str = "/number";
const RUNNING_SHALLOW_SUFFIX: &str = "/runningCues/shallow";
const RUNNING_SUFFIX: &str = "/runningCues";
const CHILDREN_SHALLOW_SUFFIX: &str = "/children/shallow";
const CHILDREN_SUFFIX: &str = "/children";
const IS_RUNNING_SUFFIX: &str = "/isRunning";
const DISCONNECT_SUFFIX: &str = "/disconnect";

/// What an inbound engine message means to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Pushed whenever the monitored list's playhead moves, including to nothing.
    PlaybackPositionUpdate,
    /// Answer to an explicit `playheadId` request.
    DirectPlayheadReply,
    NameReply,
    NumberReply,
    /// List of `{uniqueID, name, number}` for cues currently running.
    RunningCuesReply,
    /// Cue ids of the playing list.
    ChildrenReply,
    IsRunningReply,
    DisconnectNotice,
    /// Anything else; relayed untouched.
    Unrecognized,
}

/// Operator transport buttons forwarded to the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportAction {
    Next,
    Previous,
    Go,
    Panic,
}

impl TransportAction {
    /// Verb appended to the cue list address.
    pub fn verb(&self) -> &'static str {
        match self {
            TransportAction::Next => "playhead/next",
            TransportAction::Previous => "playhead/previous",
            TransportAction::Go => "go",
            TransportAction::Panic => "panic",
        }
    }
}

impl fmt::Display for TransportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportAction::Next => "next",
            TransportAction::Previous => "previous",
            TransportAction::Go => "go",
            TransportAction::Panic => "panic",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportAction {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(TransportAction::Next),
            "previous" | "prev" => Ok(TransportAction::Previous),
            "go" => Ok(TransportAction::Go),
            "panic" => Ok(TransportAction::Panic),
            _ => Err(ProtoError::UnknownAddress(s.to_string())),
        }
    }
}

/// Address builder and classifier bound to one engine's workspace and lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAddresses {
    workspace: String,
    cue_list: String,
    playing_list: String,
    position_update: String,
}

impl EngineAddresses {
    pub fn new(workspace: &str, cue_list: &str, playing_list: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            cue_list: cue_list.to_string(),
            playing_list: playing_list.to_string(),
            position_update: format!(
                "{}/workspace/{}/cueList/{}/playbackPosition",
                UPDATE_PREFIX, workspace, cue_list
            ),
        }
    }

    pub fn for_engine(engine: &EngineConfig) -> Self {
        Self::new(&engine.workspace_id, &engine.cue_list_id, engine.playing_list())
    }

    pub fn cue_list(&self) -> &str {
        &self.cue_list
    }

    pub fn playing_list(&self) -> &str {
        &self.playing_list
    }

    fn ws(&self) -> String {
        format!("/workspace/{}", self.workspace)
    }

    fn cue(&self, cue_id: &str, verb: &str) -> String {
        format!("{}/cue_id/{}/{}", self.ws(), cue_id, verb)
    }

    // ── outbound ──────────────────────────────────────────────────────────────

    pub fn connect(&self) -> String {
        format!("{}/connect", self.ws())
    }

    pub fn updates(&self) -> String {
        format!("{}/updates", self.ws())
    }

    pub fn thump(&self) -> String {
        format!("{}/thump", self.ws())
    }

    pub fn playhead_id(&self) -> String {
        self.cue(&self.cue_list, "playheadId")
    }

    pub fn display_name(&self, cue_id: &str) -> String {
        self.cue(cue_id, "displayName")
    }

    pub fn number(&self, cue_id: &str) -> String {
        self.cue(cue_id, "number")
    }

    /// Full (nested) child listing of the playing list.
    pub fn children(&self) -> String {
        self.cue(&self.playing_list, "children")
    }

    pub fn running_cues(&self) -> String {
        format!("{}/runningCues/shallow", self.ws())
    }

    pub fn is_running(&self, cue_id: &str) -> String {
        self.cue(cue_id, "isRunning")
    }

    pub fn transport(&self, action: TransportAction) -> String {
        self.cue(&self.cue_list, action.verb())
    }

    // ── inbound ───────────────────────────────────────────────────────────────

    pub fn position_update(&self) -> &str {
        &self.position_update
    }

    /// Classify an inbound address. First match wins.
    pub fn classify(&self, address: &str) -> EventKind {
        if address == self.position_update {
            return EventKind::PlaybackPositionUpdate;
        }

        if address.starts_with(REPLY_PREFIX) {
            if address.ends_with(PLAYHEAD_SUFFIX) {
                return EventKind::DirectPlayheadReply;
            }
            if address.ends_with(NAME_SUFFIX) {
                return EventKind::NameReply;
            }
            if address.ends_with(NUMBER_SUFFIX) {
                return EventKind::NumberReply;
            }
            if address.ends_with(RUNNING_SHALLOW_SUFFIX) || address.ends_with(RUNNING_SUFFIX) {
                return EventKind::RunningCuesReply;
            }
            if address.ends_with(CHILDREN_SHALLOW_SUFFIX) || address.ends_with(CHILDREN_SUFFIX) {
                return EventKind::ChildrenReply;
            }
            if address.ends_with(IS_RUNNING_SUFFIX) {
                return EventKind::IsRunningReply;
            }
        }

        if address.ends_with(DISCONNECT_SUFFIX) {
            return EventKind::DisconnectNotice;
        }

        EventKind::Unrecognized
    }
}

/// Cue id from a `…/cue_id/{id}/…` address, if there is one.
pub fn cue_id_in(address: &str) -> Option<&str> {
    let mut segments = address.split('/');
    while let Some(segment) = segments.next() {
        if segment == "cue_id" {
            return segments.next().filter(|id| !id.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> EngineAddresses {
        EngineAddresses::new("WS", "LIST", "FX")
    }

    #[test]
    fn builds_request_addresses() {
        let a = addrs();
        assert_eq!(a.updates(), "/workspace/WS/updates");
        assert_eq!(a.playhead_id(), "/workspace/WS/cue_id/LIST/playheadId");
        assert_eq!(a.display_name("42"), "/workspace/WS/cue_id/42/displayName");
        assert_eq!(a.children(), "/workspace/WS/cue_id/FX/children");
        assert_eq!(a.running_cues(), "/workspace/WS/runningCues/shallow");
        assert_eq!(
            a.transport(TransportAction::Next),
            "/workspace/WS/cue_id/LIST/playhead/next"
        );
        assert_eq!(a.transport(TransportAction::Go), "/workspace/WS/cue_id/LIST/go");
    }

    #[test]
    fn position_update_only_for_own_list() {
        let a = addrs();
        assert_eq!(
            a.classify("/update/workspace/WS/cueList/LIST/playbackPosition"),
            EventKind::PlaybackPositionUpdate
        );
        assert_eq!(
            a.classify("/update/workspace/WS/cueList/OTHER/playbackPosition"),
            EventKind::Unrecognized
        );
    }

    #[test]
    fn reply_suffixes_need_reply_prefix() {
        let a = addrs();
        assert_eq!(a.classify("/workspace/WS/cue_id/9/displayName"), EventKind::Unrecognized);
        assert_eq!(
            a.classify("/reply/workspace/WS/cue_id/9/displayName"),
            EventKind::NameReply
        );
        assert_eq!(a.classify("/reply/cue_id/9/number"), EventKind::NumberReply);
    }

    #[test]
    fn cue_id_extraction() {
        assert_eq!(cue_id_in("/reply/workspace/WS/cue_id/ABC-1/number"), Some("ABC-1"));
        assert_eq!(cue_id_in("/reply/workspace/WS/runningCues/shallow"), None);
        assert_eq!(cue_id_in("/reply/cue_id//number"), None);
    }

    #[test]
    fn transport_action_names() {
        assert_eq!("prev".parse::<TransportAction>().unwrap(), TransportAction::Previous);
        assert_eq!(TransportAction::Panic.to_string(), "panic");
        assert!("stop".parse::<TransportAction>().is_err());
    }
}
