//! Display diffing and rendering.

use cue_proto::config::DisplayConfig;
use cue_proto::SourceRole;
use rosc::{OscMessage, OscType};

use crate::effect::DisplayUpdate;
use crate::tracker::CueTracker;

pub const DISCONNECTED_NOTICE: &str = "QLab is disconnected";
pub const DISCONNECTED_NAME: &str = "QLAB IS DISCONNECTED";

/// What the selected engine would put on the display right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub role: SourceRole,
    /// `None` while a name or number answer is still outstanding.
    pub playhead: Option<(String, String)>,
    pub active: (String, String),
    pub disconnected: bool,
}

impl DisplaySnapshot {
    pub fn of(tracker: &CueTracker) -> Self {
        let playhead = tracker.playhead();
        let active = tracker.active();
        Self {
            role: tracker.role(),
            playhead: playhead
                .is_settled()
                .then(|| (playhead.name.clone(), playhead.number.clone())),
            active: (active.name.clone(), active.number.clone()),
            disconnected: tracker.is_disconnected(),
        }
    }
}

/// Remembers what was last sent so consumers only see changes.
#[derive(Debug, Default)]
pub struct DisplayEmitter {
    last_playhead: Option<(String, String)>,
    last_active: Option<(String, String)>,
    last_disconnected: bool,
}

fn blank_pair() -> (String, String) {
    (String::new(), String::new())
}

impl DisplayEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&mut self, snapshot: &DisplaySnapshot) -> Vec<DisplayUpdate> {
        if snapshot.disconnected {
            if self.last_disconnected {
                return Vec::new();
            }
            self.last_disconnected = true;
            // Rendering overwrites the name and blanks the rest
            self.last_playhead = None;
            self.last_active = Some(blank_pair());
            return vec![DisplayUpdate::Disconnected {
                role: snapshot.role,
            }];
        }
        self.last_disconnected = false;

        let mut updates = Vec::new();

        if let Some(playhead) = &snapshot.playhead {
            if self.last_playhead.as_ref() != Some(playhead) {
                self.last_playhead = Some(playhead.clone());
                updates.push(DisplayUpdate::Playhead {
                    name: playhead.0.clone(),
                    number: playhead.1.clone(),
                });
            }
        }

        if self.last_active.as_ref() != Some(&snapshot.active) {
            self.last_active = Some(snapshot.active.clone());
            updates.push(DisplayUpdate::Active {
                name: snapshot.active.0.clone(),
                number: snapshot.active.1.clone(),
            });
        }

        updates
    }

    /// Blank everything and take the blank as the new baseline.
    pub fn blank(&mut self) -> DisplayUpdate {
        self.last_playhead = Some(blank_pair());
        self.last_active = Some(blank_pair());
        self.last_disconnected = false;
        DisplayUpdate::Blank
    }
}

fn text(addr: &str, value: &str) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args: vec![OscType::String(value.to_string())],
    }
}

impl DisplayUpdate {
    /// OSC messages that show this update on a consumer.
    pub fn to_osc(&self, display: &DisplayConfig) -> Vec<OscMessage> {
        match self {
            DisplayUpdate::Playhead { name, number } => vec![
                text(&display.name_address, name),
                text(&display.number_address, number),
            ],
            DisplayUpdate::Active { name, number } => vec![
                text(&display.active_name_address, name),
                text(&display.active_number_address, number),
            ],
            DisplayUpdate::Disconnected { .. } => vec![
                text(&display.notify_address, DISCONNECTED_NOTICE),
                text(&display.name_address, DISCONNECTED_NAME),
                text(&display.number_address, ""),
                text(&display.active_name_address, ""),
                text(&display.active_number_address, ""),
            ],
            DisplayUpdate::Blank => vec![
                text(&display.number_address, ""),
                text(&display.name_address, ""),
                text(&display.active_name_address, ""),
                text(&display.active_number_address, ""),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(playhead: Option<(&str, &str)>, active: (&str, &str), disconnected: bool) -> DisplaySnapshot {
        DisplaySnapshot {
            role: SourceRole::Main,
            playhead: playhead.map(|(a, b)| (a.to_string(), b.to_string())),
            active: (active.0.to_string(), active.1.to_string()),
            disconnected,
        }
    }

    #[test]
    fn repeats_are_suppressed() {
        let mut emitter = DisplayEmitter::new();
        let s = snap(Some(("Blackout", "3.2")), ("", ""), false);
        assert_eq!(emitter.diff(&s).len(), 2);
        assert!(emitter.diff(&s).is_empty());
    }

    #[test]
    fn unsettled_playhead_waits() {
        let mut emitter = DisplayEmitter::new();
        emitter.diff(&snap(Some(("", "")), ("", ""), false));
        assert!(emitter.diff(&snap(None, ("", ""), false)).is_empty());
    }

    #[test]
    fn disconnect_emitted_once_per_transition() {
        let mut emitter = DisplayEmitter::new();
        let down = snap(Some(("", "")), ("", ""), true);
        assert_eq!(emitter.diff(&down).len(), 1);
        assert!(emitter.diff(&down).is_empty());

        // Back up: the playhead is re-sent even if it equals the old value
        let up = snap(Some(("", "")), ("", ""), false);
        assert_eq!(
            emitter.diff(&up),
            vec![DisplayUpdate::Playhead {
                name: String::new(),
                number: String::new()
            }]
        );
        assert_eq!(emitter.diff(&down).len(), 1);
    }

    #[test]
    fn blank_resets_baseline() {
        let mut emitter = DisplayEmitter::new();
        let s = snap(Some(("Blackout", "3.2")), ("FX", "1"), false);
        emitter.diff(&s);
        assert_eq!(emitter.blank(), DisplayUpdate::Blank);
        assert_eq!(emitter.diff(&s).len(), 2);
    }

    #[test]
    fn renders_to_configured_addresses() {
        let display = DisplayConfig::default();
        let msgs = DisplayUpdate::Playhead {
            name: "Blackout".into(),
            number: "3.2".into(),
        }
        .to_osc(&display);
        assert_eq!(msgs[0].addr, "/next/name");
        assert_eq!(msgs[0].args, vec![OscType::String("Blackout".into())]);
        assert_eq!(msgs[1].addr, "/next/number");

        let notice = DisplayUpdate::Disconnected {
            role: SourceRole::Main,
        }
        .to_osc(&display);
        assert_eq!(notice[0].addr, "/NOTIFY");
    }
}
