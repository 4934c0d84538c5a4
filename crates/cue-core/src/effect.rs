use cue_proto::SourceRole;
use rosc::OscMessage;

/// Something the bridge wants done. The core never performs IO itself; the
/// runtime executes effects in the order they are returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fire-and-forget request to one engine.
    Send { role: SourceRole, message: OscMessage },
    /// State change for the display consumers.
    Display(DisplayUpdate),
    /// Engine message the bridge does not interpret, relayed as-is.
    Forward(OscMessage),
    /// Start (or restart) the repeating isRunning poll for an engine.
    StartLivenessPoll { role: SourceRole },
    CancelLivenessPoll { role: SourceRole },
    /// Start the repeating thump for a connectionless link.
    StartHeartbeat { role: SourceRole },
    /// Call back into `Bridge::settle_elapsed` after the changeover delay.
    ScheduleSettle { role: SourceRole },
}

/// A change the display consumers should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    /// Cue standing by in the monitored list.
    Playhead { name: String, number: String },
    /// Cue currently running from the playing list.
    Active { name: String, number: String },
    /// The selected engine reported a disconnect.
    Disconnected { role: SourceRole },
    /// Momentary blank while switching engines.
    Blank,
}

impl Effect {
    pub(crate) fn request(role: SourceRole, addr: String) -> Self {
        Effect::Send {
            role,
            message: OscMessage { addr, args: Vec::new() },
        }
    }

    /// Outbound OSC address, for sends.
    pub fn send_address(&self) -> Option<&str> {
        match self {
            Effect::Send { message, .. } => Some(&message.addr),
            _ => None,
        }
    }
}
