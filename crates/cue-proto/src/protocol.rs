use rosc::OscType;
use serde::{Deserialize, Serialize};

use crate::address::TransportAction;
use crate::error::{ProtoError, ProtoResult};
use crate::role::SourceRole;

/// Current control protocol version.  Bump this when the wire format changes
/// in a breaking way.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest control frame body accepted from a client.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// OSC addresses the control surface sends.
pub const CONTROL_REFRESH: &str = "/module/refresh";
pub const CONTROL_CHANGEOVER: &str = "/module/changeover";
pub const CONTROL_TRANSPORT_PREFIX: &str = "/transport/";

/// Messages sent from a control client to the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Re-request updates, membership and playhead from the engines.
    Refresh,
    /// Switch which engine feeds the display.
    Changeover { role: SourceRole },
    /// Forward a transport button to the engines.
    Transport { action: TransportAction },
    GetState,
}

impl Command {
    /// Map a control-surface OSC message onto a command.
    pub fn from_osc(address: &str, args: &[OscType]) -> Option<Self> {
        if address == CONTROL_REFRESH {
            return Some(Command::Refresh);
        }
        if address == CONTROL_CHANGEOVER {
            let role = match args.first()? {
                OscType::String(s) => s.parse().ok()?,
                _ => return None,
            };
            return Some(Command::Changeover { role });
        }
        let verb = address.strip_prefix(CONTROL_TRANSPORT_PREFIX)?;
        let action = verb.parse().ok()?;
        Some(Command::Transport { action })
    }
}

/// Messages sent from the bridge to control clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: bridge version + full state snapshot.
    Hello {
        protocol_version: u32,
        bridge_rev: u64,
        state: BridgeState,
    },
    State {
        data: BridgeState,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Link health to one engine as observed by the bridge.
///
/// Transitions:
///   Absent -> Connecting -> Up -> Down -> Connecting ...
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LinkHealth {
    #[default]
    Absent,
    Connecting,
    Up,
    Down,
}

impl LinkHealth {
    /// Short label for badges (≤4 chars).
    pub fn badge_label(&self) -> Option<&'static str> {
        match self {
            LinkHealth::Absent => None,
            LinkHealth::Connecting => Some("CONN"),
            LinkHealth::Up => None,
            LinkHealth::Down => Some("DOWN"),
        }
    }
}

/// What the bridge knows about one engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineStatus {
    pub role: Option<SourceRole>,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub link: LinkHealth,
    pub current_cue_id: Option<String>,
    pub cue_name: String,
    pub cue_number: String,
    pub active_name: String,
    pub active_number: String,
    pub polling_active: bool,
    pub disconnected: bool,
    /// Size of the playing list membership set.
    pub members: usize,
}

/// Full state of the bridge.  `rev` is incremented on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeState {
    #[serde(default)]
    pub rev: u64,
    pub selected: Option<SourceRole>,
    pub engines: Vec<EngineStatus>,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode the frame at the start of `data`, returning it with the number
    /// of bytes it spans. `Ok(None)` means the frame is not complete yet.
    pub fn decode(data: &[u8]) -> ProtoResult<Option<(Self, usize)>> {
        let Some(header) = data.get(..4) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge(len));
        }
        let consumed = 4 + len;
        let Some(body) = data.get(4..consumed) else {
            return Ok(None);
        };
        let msg = serde_json::from_slice(body).map_err(|e| ProtoError::InvalidFrame {
            consumed,
            reason: e.to_string(),
        })?;
        Ok(Some((msg, consumed)))
    }
}

/// Reassembles control messages from a byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete message, if any. A frame that fails to parse is dropped
    /// and reported so the frames behind it still arrive. An oversized length
    /// header leaves no way to resynchronise; the buffer is discarded and the
    /// caller should close the stream.
    pub fn next_message(&mut self) -> Option<ProtoResult<Message>> {
        match Message::decode(&self.pending) {
            Ok(None) => None,
            Ok(Some((msg, consumed))) => {
                self.pending.drain(..consumed);
                Some(Ok(msg))
            }
            Err(ProtoError::InvalidFrame { consumed, reason }) => {
                self.pending.drain(..consumed);
                Some(Err(ProtoError::InvalidFrame { consumed, reason }))
            }
            Err(e) => {
                self.pending.clear();
                Some(Err(e))
            }
        }
    }
}
