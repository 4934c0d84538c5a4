//! The bridge state machine.
//!
//! `Bridge` owns every engine's tracker, the source selection and the display
//! diff. Each input is a method call that returns the effects to perform, so
//! the whole protocol logic runs without sockets or timers.

use std::collections::BTreeMap;

use cue_proto::config::{BridgeConfig, Config, EngineConfig, TransportTarget};
use cue_proto::protocol::{Command, EngineStatus};
use cue_proto::{SourceRole, TransportAction};
use rosc::OscMessage;
use tracing::{debug, info};

use crate::effect::Effect;
use crate::emitter::{DisplayEmitter, DisplaySnapshot};
use crate::error::BridgeError;
use crate::selector::SourceSelector;
use crate::tracker::CueTracker;

#[derive(Debug, Clone, Copy)]
pub struct BridgeSettings {
    pub transport_target: TransportTarget,
    /// Keep connectionless sessions alive with a periodic thump.
    pub heartbeat: bool,
    pub forward_unrecognized: bool,
}

impl BridgeSettings {
    pub fn from_config(bridge: &BridgeConfig) -> Self {
        Self {
            transport_target: bridge.transport_target,
            heartbeat: bridge.transport.needs_heartbeat(),
            forward_unrecognized: bridge.forward_unrecognized,
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

pub struct Bridge {
    trackers: BTreeMap<SourceRole, CueTracker>,
    selector: SourceSelector,
    emitter: DisplayEmitter,
    settings: BridgeSettings,
}

impl Bridge {
    pub fn new(engines: &[(SourceRole, EngineConfig)], settings: BridgeSettings) -> Self {
        let trackers: BTreeMap<SourceRole, CueTracker> = engines
            .iter()
            .map(|(role, engine)| (*role, CueTracker::new(*role, engine)))
            .collect();
        let roles: Vec<SourceRole> = trackers.keys().copied().collect();

        Self {
            trackers,
            selector: SourceSelector::new(&roles),
            emitter: DisplayEmitter::new(),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.bound_engines(),
            BridgeSettings::from_config(&config.bridge),
        )
    }

    pub fn selected(&self) -> SourceRole {
        self.selector.selected()
    }

    pub fn roles(&self) -> Vec<SourceRole> {
        self.trackers.keys().copied().collect()
    }

    pub fn tracker(&self, role: SourceRole) -> Option<&CueTracker> {
        self.trackers.get(&role)
    }

    pub fn statuses(&self) -> Vec<EngineStatus> {
        self.trackers.values().map(CueTracker::status).collect()
    }

    /// Open every engine session and put the initial state on the display.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for role in self.roles() {
            effects.extend(self.start_engine_session(role));
        }
        self.emit_into(&mut effects);
        effects
    }

    /// Re-open one engine's session, e.g. after its link came back.
    pub fn start_engine(&mut self, role: SourceRole) -> Vec<Effect> {
        let mut effects = self.start_engine_session(role);
        self.emit_into(&mut effects);
        effects
    }

    fn start_engine_session(&self, role: SourceRole) -> Vec<Effect> {
        let Some(tracker) = self.trackers.get(&role) else {
            return Vec::new();
        };
        let mut effects = tracker.session_start();
        if self.settings.heartbeat {
            effects.push(Effect::StartHeartbeat { role });
        }
        effects
    }

    pub fn shutdown(&self) -> Vec<Effect> {
        self.trackers
            .values()
            .flat_map(CueTracker::session_end)
            .collect()
    }

    /// Interpret one inbound engine message.
    pub fn handle_message(&mut self, role: SourceRole, message: &OscMessage) -> Vec<Effect> {
        let Some(tracker) = self.trackers.get_mut(&role) else {
            return self.forward(message);
        };

        let mut effects = tracker.handle(message);
        if !self.settings.forward_unrecognized {
            effects.retain(|e| !matches!(e, Effect::Forward(_)));
        }
        self.emit_into(&mut effects);
        effects
    }

    /// A message from a host that is not a configured engine.
    pub fn forward(&self, message: &OscMessage) -> Vec<Effect> {
        if self.settings.forward_unrecognized {
            vec![Effect::Forward(message.clone())]
        } else {
            Vec::new()
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Effect>, BridgeError> {
        match command {
            Command::Refresh => Ok(self.refresh()),
            Command::Changeover { role } => self.changeover(role),
            Command::Transport { action } => Ok(self.transport(action)),
            Command::GetState => Ok(Vec::new()),
        }
    }

    /// Re-subscribe and re-query every engine. Heartbeats keep running.
    pub fn refresh(&mut self) -> Vec<Effect> {
        info!("refresh requested");
        let mut effects: Vec<Effect> = self
            .trackers
            .values()
            .flat_map(CueTracker::refresh)
            .collect();
        self.emit_into(&mut effects);
        effects
    }

    /// Switch the display to `role`. Both engines stay monitored.
    pub fn changeover(&mut self, role: SourceRole) -> Result<Vec<Effect>, BridgeError> {
        let previous = self.selector.changeover(role)?;
        info!("changeover {} -> {}", previous, role);

        let mut effects = vec![Effect::Display(self.emitter.blank())];
        if let Some(tracker) = self.trackers.get_mut(&role) {
            effects.extend(tracker.begin_resync());
        }
        effects.push(Effect::ScheduleSettle { role });
        self.emit_into(&mut effects);
        Ok(effects)
    }

    /// Changeover delay elapsed: ask the newly selected engine where it is.
    pub fn settle_elapsed(&mut self, role: SourceRole) -> Vec<Effect> {
        if self.selector.selected() != role {
            debug!("settle for {} superseded by {}", role, self.selector.selected());
            return Vec::new();
        }
        self.trackers
            .get(&role)
            .map(CueTracker::resync_queries)
            .unwrap_or_default()
    }

    pub fn poll_tick(&mut self, role: SourceRole) -> Vec<Effect> {
        let Some(tracker) = self.trackers.get_mut(&role) else {
            return vec![Effect::CancelLivenessPoll { role }];
        };
        let mut effects = tracker.poll_tick();
        self.emit_into(&mut effects);
        effects
    }

    pub fn heartbeat_tick(&self, role: SourceRole) -> Vec<Effect> {
        self.trackers
            .get(&role)
            .map(|t| vec![t.heartbeat()])
            .unwrap_or_default()
    }

    /// Forward a transport button unchanged to the target engines.
    pub fn transport(&self, action: TransportAction) -> Vec<Effect> {
        info!("transport {}", action);
        match self.settings.transport_target {
            TransportTarget::All => self
                .trackers
                .values()
                .map(|t| t.transport(action))
                .collect(),
            TransportTarget::Selected => self
                .trackers
                .get(&self.selector.selected())
                .map(|t| vec![t.transport(action)])
                .unwrap_or_default(),
        }
    }

    fn emit_into(&mut self, effects: &mut Vec<Effect>) {
        let Some(tracker) = self.trackers.get(&self.selector.selected()) else {
            return;
        };
        let snapshot = DisplaySnapshot::of(tracker);
        effects.extend(self.emitter.diff(&snapshot).into_iter().map(Effect::Display));
    }
}
