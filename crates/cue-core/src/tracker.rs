//! Per-engine cue state.
//!
//! One `CueTracker` exists for every configured engine. It interprets that
//! engine's inbound messages, keeps playhead, membership and active-cue state,
//! and returns the follow-up requests as effects. Nothing here knows which
//! engine is on the display; that is the bridge's concern.

use std::collections::HashSet;

use cue_proto::config::EngineConfig;
use cue_proto::protocol::EngineStatus;
use cue_proto::reply::{self, RunningCue};
use cue_proto::{cue_id_in, EngineAddresses, EventKind, SourceRole, TransportAction};
use rosc::{OscMessage, OscType};
use tracing::{debug, info, warn};

use crate::effect::Effect;

/// Cue the monitored list's playhead stands on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayheadState {
    pub cue_id: Option<String>,
    pub name: String,
    pub number: String,
    /// A name request is outstanding for `cue_id`.
    pub pending_name: bool,
    pub pending_number: bool,
}

impl PlayheadState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Name and number both belong to the current cue.
    pub fn is_settled(&self) -> bool {
        !self.pending_name && !self.pending_number
    }

    fn point_at(&mut self, cue_id: String) {
        self.cue_id = Some(cue_id);
        self.pending_name = true;
        self.pending_number = true;
    }

    fn accepts_reply_for(&self, reply_cue: Option<&str>) -> bool {
        match (&self.cue_id, reply_cue) {
            (None, _) => false,
            (Some(current), Some(reply_cue)) => current == reply_cue,
            (Some(_), None) => true,
        }
    }
}

/// Cue from the playing list that is currently running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveCueState {
    pub cue_id: Option<String>,
    pub name: String,
    pub number: String,
    /// The repeating isRunning poll is scheduled.
    pub is_polling_active: bool,
}

pub struct CueTracker {
    role: SourceRole,
    addresses: EngineAddresses,
    name: String,
    endpoint: String,
    passcode: Option<String>,
    playhead: PlayheadState,
    members: HashSet<String>,
    active: ActiveCueState,
    disconnected: bool,
}

impl CueTracker {
    pub fn new(role: SourceRole, engine: &EngineConfig) -> Self {
        Self {
            role,
            addresses: EngineAddresses::for_engine(engine),
            name: engine.name.clone(),
            endpoint: engine.endpoint(),
            passcode: engine.passcode.clone().filter(|p| !p.is_empty()),
            playhead: PlayheadState::default(),
            members: HashSet::new(),
            active: ActiveCueState::default(),
            disconnected: false,
        }
    }

    pub fn role(&self) -> SourceRole {
        self.role
    }

    pub fn addresses(&self) -> &EngineAddresses {
        &self.addresses
    }

    pub fn playhead(&self) -> &PlayheadState {
        &self.playhead
    }

    pub fn active(&self) -> &ActiveCueState {
        &self.active
    }

    pub fn members(&self) -> &HashSet<String> {
        &self.members
    }

    pub fn is_member(&self, cue_id: &str) -> bool {
        self.members.contains(cue_id)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn request(&self, addr: String) -> Effect {
        Effect::request(self.role, addr)
    }

    fn request_with(&self, addr: String, args: Vec<OscType>) -> Effect {
        Effect::Send {
            role: self.role,
            message: OscMessage { addr, args },
        }
    }

    // ── outbound sequences ────────────────────────────────────────────────────

    /// Open a session: connect (with passcode), subscribe to updates, then
    /// the same queries as a refresh.
    pub fn session_start(&self) -> Vec<Effect> {
        let connect_args = match &self.passcode {
            Some(code) => vec![OscType::String(code.clone())],
            None => Vec::new(),
        };
        let mut effects = vec![self.request_with(self.addresses.connect(), connect_args)];
        effects.extend(self.refresh());
        effects
    }

    /// Subscribe to updates and re-ask membership, playhead and running cues.
    pub fn refresh(&self) -> Vec<Effect> {
        vec![
            self.request_with(self.addresses.updates(), vec![OscType::Int(1)]),
            self.request(self.addresses.children()),
            self.request(self.addresses.playhead_id()),
            self.request(self.addresses.running_cues()),
        ]
    }

    /// Unsubscribe from updates; sent on shutdown.
    pub fn session_end(&self) -> Vec<Effect> {
        vec![self.request_with(self.addresses.updates(), vec![OscType::Int(0)])]
    }

    pub fn heartbeat(&self) -> Effect {
        self.request(self.addresses.thump())
    }

    pub fn transport(&self, action: TransportAction) -> Effect {
        self.request(self.addresses.transport(action))
    }

    /// Queries issued once a changeover has settled on this engine.
    pub fn resync_queries(&self) -> Vec<Effect> {
        vec![
            self.request(self.addresses.playhead_id()),
            self.request(self.addresses.running_cues()),
        ]
    }

    /// Forget displayed values ahead of a resync: the playhead counts as
    /// unsettled until the playhead query is answered, and the active cue is
    /// rebuilt from the running-cues query.
    pub fn begin_resync(&mut self) -> Vec<Effect> {
        self.playhead.pending_name = true;
        self.playhead.pending_number = true;
        self.clear_active()
    }

    /// One tick of the liveness poll.
    pub fn poll_tick(&mut self) -> Vec<Effect> {
        match (&self.active.cue_id, self.active.is_polling_active) {
            (Some(cue_id), true) => vec![self.request(self.addresses.is_running(cue_id))],
            _ => {
                // Timer outlived its state; stop it
                self.active.is_polling_active = false;
                vec![Effect::CancelLivenessPoll { role: self.role }]
            }
        }
    }

    // ── inbound ───────────────────────────────────────────────────────────────

    pub fn handle(&mut self, message: &OscMessage) -> Vec<Effect> {
        let address = message.addr.as_str();
        let args = message.args.as_slice();

        match self.addresses.classify(address) {
            EventKind::PlaybackPositionUpdate => self.on_position(reply::position_cue_id(args)),
            EventKind::DirectPlayheadReply => self.on_playhead_reply(address, args),
            EventKind::NameReply => self.on_name_reply(address, args),
            EventKind::NumberReply => self.on_number_reply(address, args),
            EventKind::ChildrenReply => self.on_children_reply(address, args),
            EventKind::RunningCuesReply => self.on_running_cues_reply(args),
            EventKind::IsRunningReply => self.on_is_running_reply(address, args),
            EventKind::DisconnectNotice => self.on_disconnect(),
            EventKind::Unrecognized => vec![Effect::Forward(message.clone())],
        }
    }

    fn on_position(&mut self, cue_id: Option<String>) -> Vec<Effect> {
        self.disconnected = false;
        let mut effects = Vec::new();

        match cue_id {
            None => {
                debug!("{}: playhead cleared", self.role);
                self.playhead.clear();
            }
            Some(cue_id) => {
                debug!("{}: playhead moved to {}", self.role, cue_id);
                effects.push(self.request(self.addresses.display_name(&cue_id)));
                effects.push(self.request(self.addresses.number(&cue_id)));
                self.playhead.point_at(cue_id);
            }
        }

        // The previous running cue may have just finished or a new one started
        effects.push(self.request(self.addresses.running_cues()));
        effects
    }

    fn on_playhead_reply(&mut self, address: &str, args: &[OscType]) -> Vec<Effect> {
        if let Some(list) = cue_id_in(address) {
            if list != self.addresses.cue_list() {
                debug!("{}: playhead reply for other list {}", self.role, list);
                return Vec::new();
            }
        }

        let cue_id = match reply::decode_playhead(args) {
            Ok(cue_id) => cue_id,
            Err(e) => {
                warn!("{}: {}: {}", self.role, address, e);
                return Vec::new();
            }
        };
        self.disconnected = false;

        match cue_id {
            None => {
                debug!("{}: no cue standing by", self.role);
                self.playhead.clear();
                Vec::new()
            }
            Some(cue_id) => {
                let effects = vec![
                    self.request(self.addresses.display_name(&cue_id)),
                    self.request(self.addresses.number(&cue_id)),
                ];
                self.playhead.point_at(cue_id);
                effects
            }
        }
    }

    fn on_name_reply(&mut self, address: &str, args: &[OscType]) -> Vec<Effect> {
        if !self.playhead.accepts_reply_for(cue_id_in(address)) {
            debug!("{}: stale name reply {}", self.role, address);
            return Vec::new();
        }
        match reply::decode_string(args) {
            Ok(name) => {
                self.playhead.name = name;
                self.playhead.pending_name = false;
            }
            // Still pending: the display keeps the previous playhead until
            // the next playhead change re-requests it
            Err(e) => warn!("{}: {}: {}; playhead display held", self.role, address, e),
        }
        Vec::new()
    }

    fn on_number_reply(&mut self, address: &str, args: &[OscType]) -> Vec<Effect> {
        if !self.playhead.accepts_reply_for(cue_id_in(address)) {
            debug!("{}: stale number reply {}", self.role, address);
            return Vec::new();
        }
        match reply::decode_string(args) {
            Ok(number) => {
                self.playhead.number = number;
                self.playhead.pending_number = false;
            }
            // Still pending: the display keeps the previous playhead until
            // the next playhead change re-requests it
            Err(e) => warn!("{}: {}: {}; playhead display held", self.role, address, e),
        }
        Vec::new()
    }

    fn on_children_reply(&mut self, address: &str, args: &[OscType]) -> Vec<Effect> {
        if let Some(list) = cue_id_in(address) {
            if list != self.addresses.playing_list() {
                debug!("{}: children reply for other cue {}", self.role, list);
                return Vec::new();
            }
        }

        let ids = match reply::decode_cue_ids(args) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("{}: {}: {}", self.role, address, e);
                return Vec::new();
            }
        };

        self.members = ids.into_iter().collect();
        info!("{}: playing list has {} cues", self.role, self.members.len());

        let mut effects = Vec::new();
        let still_member = self
            .active
            .cue_id
            .as_deref()
            .map_or(true, |id| self.members.contains(id));
        if !still_member {
            effects.extend(self.clear_active());
        }
        effects.push(self.request(self.addresses.running_cues()));
        effects
    }

    fn on_running_cues_reply(&mut self, args: &[OscType]) -> Vec<Effect> {
        let cues = match reply::decode_running_cues(args) {
            Ok(cues) => cues,
            Err(e) => {
                warn!("{}: running cues: {}", self.role, e);
                return Vec::new();
            }
        };

        let matched: Option<RunningCue> = cues
            .into_iter()
            .filter(|cue| self.members.contains(&cue.unique_id))
            .last();

        let Some(cue) = matched else {
            return Vec::new();
        };

        debug!("{}: running {} {}", self.role, cue.number, cue.name);
        self.active.cue_id = Some(cue.unique_id);
        self.active.name = cue.name;
        self.active.number = cue.number;
        self.active.is_polling_active = true;
        vec![Effect::StartLivenessPoll { role: self.role }]
    }

    fn on_is_running_reply(&mut self, address: &str, args: &[OscType]) -> Vec<Effect> {
        let Some(active_id) = self.active.cue_id.as_deref() else {
            return Vec::new();
        };
        if let Some(reply_cue) = cue_id_in(address) {
            if reply_cue != active_id {
                debug!("{}: isRunning reply for inactive cue {}", self.role, reply_cue);
                return Vec::new();
            }
        }

        match reply::decode_bool(args) {
            Ok(true) => Vec::new(),
            Ok(false) => {
                debug!("{}: running cue {} finished", self.role, active_id);
                self.clear_active()
            }
            Err(e) => {
                warn!("{}: {}: {}", self.role, address, e);
                Vec::new()
            }
        }
    }

    fn on_disconnect(&mut self) -> Vec<Effect> {
        warn!("{}: engine reported disconnect", self.role);
        self.playhead.clear();
        let effects = self.clear_active();
        self.disconnected = true;
        effects
    }

    fn clear_active(&mut self) -> Vec<Effect> {
        let was_polling = self.active.is_polling_active;
        self.active = ActiveCueState::default();
        if was_polling {
            vec![Effect::CancelLivenessPoll { role: self.role }]
        } else {
            Vec::new()
        }
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            role: Some(self.role),
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            current_cue_id: self.playhead.cue_id.clone(),
            cue_name: self.playhead.name.clone(),
            cue_number: self.playhead.number.clone(),
            active_name: self.active.name.clone(),
            active_number: self.active.number.clone(),
            polling_active: self.active.is_polling_active,
            disconnected: self.disconnected,
            members: self.members.len(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EngineConfig {
        EngineConfig {
            name: "QLab".into(),
            host: "127.0.0.1".into(),
            port: 53000,
            workspace_id: "WS".into(),
            cue_list_id: "LIST".into(),
            playing_list_id: None,
            passcode: Some("4321".into()),
        }
    }

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    fn json(data: &str) -> Vec<OscType> {
        vec![OscType::String(format!(r#"{{"status":"ok","data":{}}}"#, data))]
    }

    fn sends(effects: &[Effect]) -> Vec<&str> {
        effects.iter().filter_map(Effect::send_address).collect()
    }

    #[test]
    fn session_start_passes_passcode() {
        let tracker = CueTracker::new(SourceRole::Only, &engine());
        let effects = tracker.session_start();
        match &effects[0] {
            Effect::Send { message, .. } => {
                assert_eq!(message.addr, "/workspace/WS/connect");
                assert_eq!(message.args, vec![OscType::String("4321".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(sends(&effects).contains(&"/workspace/WS/cue_id/LIST/playheadId"));
    }

    #[test]
    fn direct_playhead_reply_requests_name_and_number() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        let effects = tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/LIST/playheadId",
            json(r#""C9""#),
        ));
        assert_eq!(
            sends(&effects),
            vec![
                "/workspace/WS/cue_id/C9/displayName",
                "/workspace/WS/cue_id/C9/number"
            ]
        );
        assert_eq!(tracker.playhead().cue_id.as_deref(), Some("C9"));
        assert!(!tracker.playhead().is_settled());
    }

    #[test]
    fn direct_playhead_none_clears() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        tracker.handle(&msg(
            "/update/workspace/WS/cueList/LIST/playbackPosition",
            vec![OscType::String("C1".into())],
        ));
        let effects = tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/LIST/playheadId",
            json(r#""none""#),
        ));
        assert!(effects.is_empty());
        assert_eq!(tracker.playhead(), &PlayheadState::default());
    }

    #[test]
    fn stale_name_reply_is_dropped() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        tracker.handle(&msg(
            "/update/workspace/WS/cueList/LIST/playbackPosition",
            vec![OscType::String("NEW".into())],
        ));
        tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/OLD/displayName",
            json(r#""Old cue""#),
        ));
        assert_eq!(tracker.playhead().name, "");
        assert!(tracker.playhead().pending_name);
    }

    #[test]
    fn malformed_reply_changes_nothing() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        tracker.handle(&msg(
            "/update/workspace/WS/cueList/LIST/playbackPosition",
            vec![OscType::String("C1".into())],
        ));
        let before = tracker.playhead().clone();
        let effects = tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/C1/displayName",
            vec![OscType::String("{broken".into())],
        ));
        assert!(effects.is_empty());
        assert_eq!(tracker.playhead(), &before);

        // The number alone does not settle the playhead
        tracker.handle(&msg("/reply/workspace/WS/cue_id/C1/number", json(r#""4""#)));
        assert!(tracker.playhead().pending_name);
        assert!(!tracker.playhead().is_settled());
    }

    #[test]
    fn unrecognized_is_forwarded() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        let message = msg("/update/workspace/WS/cue_id/C1", vec![]);
        assert_eq!(tracker.handle(&message), vec![Effect::Forward(message.clone())]);
    }

    #[test]
    fn membership_drop_clears_active() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/LIST/children",
            json(r#"[{"uniqueID":"5"},{"uniqueID":"6"}]"#),
        ));
        tracker.handle(&msg(
            "/reply/workspace/WS/runningCues/shallow",
            json(r#"[{"uniqueID":"6","name":"FX","number":"3.2.1"}]"#),
        ));
        assert!(tracker.active().is_polling_active);

        let effects = tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/LIST/children",
            json(r#"[{"uniqueID":"5"}]"#),
        ));
        assert_eq!(effects[0], Effect::CancelLivenessPoll { role: SourceRole::Only });
        assert_eq!(tracker.active(), &ActiveCueState::default());
    }

    #[test]
    fn children_of_other_cue_ignored() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        let effects = tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/GROUP/children",
            json(r#"[{"uniqueID":"5"}]"#),
        ));
        assert!(effects.is_empty());
        assert!(tracker.members().is_empty());
    }

    #[test]
    fn disconnect_clears_everything() {
        let mut tracker = CueTracker::new(SourceRole::Only, &engine());
        tracker.handle(&msg(
            "/reply/workspace/WS/cue_id/LIST/children",
            json(r#"[{"uniqueID":"6"}]"#),
        ));
        tracker.handle(&msg(
            "/reply/workspace/WS/runningCues/shallow",
            json(r#"[{"uniqueID":"6","name":"FX","number":"1"}]"#),
        ));
        tracker.handle(&msg(
            "/update/workspace/WS/cueList/LIST/playbackPosition",
            vec![OscType::String("6".into())],
        ));

        let effects = tracker.handle(&msg("/update/workspace/WS/disconnect", vec![]));
        assert_eq!(effects, vec![Effect::CancelLivenessPoll { role: SourceRole::Only }]);
        assert!(tracker.is_disconnected());
        assert_eq!(tracker.playhead(), &PlayheadState::default());
        assert_eq!(tracker.active(), &ActiveCueState::default());

        // Next playhead information means the engine is back
        tracker.handle(&msg(
            "/update/workspace/WS/cueList/LIST/playbackPosition",
            vec![],
        ));
        assert!(!tracker.is_disconnected());
    }

    #[test]
    fn stale_poll_tick_cancels_itself() {
        let mut tracker = CueTracker::new(SourceRole::Main, &engine());
        assert_eq!(
            tracker.poll_tick(),
            vec![Effect::CancelLivenessPoll { role: SourceRole::Main }]
        );
    }
}
