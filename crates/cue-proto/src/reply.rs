//! Reply payload decoding.
//!
//! QLab wraps every answer in a JSON object sent as the first OSC string
//! argument: `{"address": …, "status": "ok", "data": <answer>}`. Decoding
//! failures mean "nothing learned"; callers log and move on.

use rosc::OscType;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ProtoError, ProtoResult};

/// Playhead value QLab reports when nothing is standing by.
pub const NO_CUE: &str = "none";

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    #[serde(default)]
    status: Option<String>,
    data: Option<Value>,
}

/// A cue reported by a running-cues query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningCue {
    pub unique_id: String,
    pub name: String,
    pub number: String,
}

#[derive(Debug, Deserialize)]
struct RawRunningCue {
    #[serde(rename = "uniqueID", alias = "uniqueId")]
    unique_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    number: Option<String>,
}

/// Extract the `data` field of a reply.
pub fn decode(args: &[OscType]) -> ProtoResult<Value> {
    let raw = match args.first() {
        Some(OscType::String(raw)) => raw,
        Some(other) => {
            return Err(ProtoError::MalformedReply(format!(
                "expected JSON string argument, got {:?}",
                other
            )))
        }
        None => return Err(ProtoError::MalformedReply("reply has no arguments".into())),
    };

    let envelope: ReplyEnvelope = serde_json::from_str(raw)
        .map_err(|e| ProtoError::MalformedReply(format!("invalid JSON: {}", e)))?;

    if let Some(status) = envelope.status.as_deref() {
        if status != "ok" {
            return Err(ProtoError::MalformedReply(format!("reply status '{}'", status)));
        }
    }

    envelope
        .data
        .ok_or_else(|| ProtoError::MalformedReply("reply has no data field".into()))
}

/// Reply data as text. Numbers are stringified since cue numbers are labels.
pub fn decode_string(args: &[OscType]) -> ProtoResult<String> {
    match decode(args)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ProtoError::MalformedReply(format!(
            "expected string data, got {}",
            other
        ))),
    }
}

pub fn decode_bool(args: &[OscType]) -> ProtoResult<bool> {
    match decode(args)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map_or(false, |f| f != 0.0)),
        other => Err(ProtoError::MalformedReply(format!(
            "expected boolean data, got {}",
            other
        ))),
    }
}

/// Playhead reply data, with the "none" sentinel mapped to `None`.
pub fn decode_playhead(args: &[OscType]) -> ProtoResult<Option<String>> {
    let id = decode_string(args)?;
    Ok(cue_id_or_none(&id))
}

/// Every `uniqueID` in a children listing, descending into nested `cues`.
pub fn decode_cue_ids(args: &[OscType]) -> ProtoResult<Vec<String>> {
    let data = decode(args)?;
    let entries = data
        .as_array()
        .ok_or_else(|| ProtoError::MalformedReply("children data is not a list".into()))?;

    let mut ids = Vec::new();
    collect_ids(entries, &mut ids);
    Ok(ids)
}

fn collect_ids(entries: &[Value], ids: &mut Vec<String>) {
    for entry in entries {
        if let Some(id) = entry.get("uniqueID").and_then(Value::as_str) {
            ids.push(id.to_string());
        }
        if let Some(children) = entry.get("cues").and_then(Value::as_array) {
            collect_ids(children, ids);
        }
    }
}

pub fn decode_running_cues(args: &[OscType]) -> ProtoResult<Vec<RunningCue>> {
    let data = decode(args)?;
    let raw: Vec<RawRunningCue> = serde_json::from_value(data)
        .map_err(|e| ProtoError::MalformedReply(format!("running cues: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|cue| {
            let name = cue
                .display_name
                .filter(|n| !n.is_empty())
                .or(cue.name)
                .unwrap_or_default();
            RunningCue {
                unique_id: cue.unique_id,
                name,
                number: cue.number.unwrap_or_default(),
            }
        })
        .collect())
}

/// Cue id carried by a playback-position push update. These are plain OSC
/// strings, not JSON; an empty argument list means the playhead is clear.
pub fn position_cue_id(args: &[OscType]) -> Option<String> {
    match args.first() {
        Some(OscType::String(id)) => cue_id_or_none(id),
        _ => None,
    }
}

fn cue_id_or_none(id: &str) -> Option<String> {
    let id = id.trim();
    if id.is_empty() || id == NO_CUE {
        None
    } else {
        Some(id.to_string())
    }
}
