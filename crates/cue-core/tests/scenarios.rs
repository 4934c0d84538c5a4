use cue_core::{Bridge, BridgeError, BridgeSettings, DisplayUpdate, Effect};
use cue_proto::config::EngineConfig;
use cue_proto::protocol::Command;
use cue_proto::SourceRole;
use rosc::{OscMessage, OscType};

fn engine(ws: &str) -> EngineConfig {
    EngineConfig {
        name: format!("QLab {}", ws),
        host: "10.0.0.1".into(),
        port: 53000,
        workspace_id: ws.into(),
        cue_list_id: "LIST".into(),
        playing_list_id: Some("PLAYING".into()),
        passcode: None,
    }
}

fn pair() -> Bridge {
    let mut bridge = Bridge::new(
        &[
            (SourceRole::Main, engine("A")),
            (SourceRole::Backup, engine("B")),
        ],
        BridgeSettings::default(),
    );
    bridge.start();
    bridge
}

fn only() -> Bridge {
    let mut bridge = Bridge::new(&[(SourceRole::Only, engine("A"))], BridgeSettings::default());
    bridge.start();
    bridge
}

fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args,
    }
}

fn reply(addr: &str, data: &str) -> OscMessage {
    msg(
        addr,
        vec![OscType::String(format!(
            r#"{{"address":"{}","status":"ok","data":{}}}"#,
            addr, data
        ))],
    )
}

fn position(ws: &str, cue: &str) -> OscMessage {
    msg(
        &format!("/update/workspace/{}/cueList/LIST/playbackPosition", ws),
        vec![OscType::String(cue.into())],
    )
}

fn sends(effects: &[Effect]) -> Vec<&str> {
    effects.iter().filter_map(Effect::send_address).collect()
}

fn displays(effects: &[Effect]) -> Vec<&DisplayUpdate> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Display(update) => Some(update),
            _ => None,
        })
        .collect()
}

fn count_polls(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::StartLivenessPoll { .. }))
        .count()
}

#[test]
fn position_update_resolves_to_one_playhead_emission() {
    let mut bridge = pair();

    let effects = bridge.handle_message(SourceRole::Main, &position("A", "42"));
    assert_eq!(
        sends(&effects),
        vec![
            "/workspace/A/cue_id/42/displayName",
            "/workspace/A/cue_id/42/number",
            "/workspace/A/runningCues/shallow",
        ]
    );
    assert!(displays(&effects).is_empty());

    let name = bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/displayName", r#""Blackout""#),
    );
    assert!(displays(&name).is_empty());

    let number = bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/number", r#""3.2""#),
    );
    assert_eq!(
        displays(&number),
        vec![&DisplayUpdate::Playhead {
            name: "Blackout".into(),
            number: "3.2".into()
        }]
    );

    // Same values again produce nothing
    let again = bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/number", r#""3.2""#),
    );
    assert!(displays(&again).is_empty());
}

#[test]
fn stale_name_reply_is_dropped() {
    let mut bridge = pair();
    bridge.handle_message(SourceRole::Main, &position("A", "42"));
    bridge.handle_message(SourceRole::Main, &position("A", "43"));

    bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/displayName", r#""Old""#),
    );
    bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/43/displayName", r#""New""#),
    );
    let effects = bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/43/number", r#""4""#),
    );
    assert_eq!(
        displays(&effects),
        vec![&DisplayUpdate::Playhead {
            name: "New".into(),
            number: "4".into()
        }]
    );
}

#[test]
fn none_playhead_clears_without_lookups() {
    let mut bridge = pair();
    bridge.handle_message(SourceRole::Main, &position("A", "42"));
    bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/displayName", r#""Blackout""#),
    );
    bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/42/number", r#""3.2""#),
    );

    let effects = bridge.handle_message(SourceRole::Main, &position("A", "none"));
    assert_eq!(sends(&effects), vec!["/workspace/A/runningCues/shallow"]);
    assert_eq!(
        displays(&effects),
        vec![&DisplayUpdate::Playhead {
            name: String::new(),
            number: String::new()
        }]
    );

    let tracker = bridge.tracker(SourceRole::Main).unwrap();
    assert_eq!(tracker.playhead().cue_id, None);
}

#[test]
fn running_member_becomes_active_until_it_stops() {
    let mut bridge = pair();
    bridge.handle_message(
        SourceRole::Main,
        &reply(
            "/reply/workspace/A/cue_id/PLAYING/children",
            r#"[{"uniqueID":"5"},{"uniqueID":"6"}]"#,
        ),
    );

    let effects = bridge.handle_message(
        SourceRole::Main,
        &reply(
            "/reply/workspace/A/runningCues/shallow",
            r#"[{"uniqueID":"99","name":"Other","number":"9"},{"uniqueID":"6","name":"FX","number":"3.2.1"}]"#,
        ),
    );
    assert_eq!(
        displays(&effects),
        vec![&DisplayUpdate::Active {
            name: "FX".into(),
            number: "3.2.1".into()
        }]
    );
    assert_eq!(count_polls(&effects), 1);

    let tick = bridge.poll_tick(SourceRole::Main);
    assert_eq!(sends(&tick), vec!["/workspace/A/cue_id/6/isRunning"]);

    let stopped = bridge.handle_message(
        SourceRole::Main,
        &reply("/reply/workspace/A/cue_id/6/isRunning", "false"),
    );
    assert!(stopped.contains(&Effect::CancelLivenessPoll {
        role: SourceRole::Main
    }));
    assert_eq!(
        displays(&stopped),
        vec![&DisplayUpdate::Active {
            name: String::new(),
            number: String::new()
        }]
    );

    // A tick that raced the cancel only stops itself
    let late = bridge.poll_tick(SourceRole::Main);
    assert_eq!(
        late,
        vec![Effect::CancelLivenessPoll {
            role: SourceRole::Main
        }]
    );
}

#[test]
fn membership_rebuild_is_idempotent() {
    let mut bridge = pair();
    let children = reply(
        "/reply/workspace/A/cue_id/PLAYING/children",
        r#"[{"uniqueID":"5","cues":[{"uniqueID":"7"}]},{"uniqueID":"6"}]"#,
    );
    bridge.handle_message(SourceRole::Main, &children);
    let first = bridge.tracker(SourceRole::Main).unwrap().members().clone();
    bridge.handle_message(SourceRole::Main, &children);
    let second = bridge.tracker(SourceRole::Main).unwrap().members().clone();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn only_one_poll_per_engine() {
    let mut bridge = pair();
    bridge.handle_message(
        SourceRole::Main,
        &reply(
            "/reply/workspace/A/cue_id/PLAYING/children",
            r#"[{"uniqueID":"6"}]"#,
        ),
    );
    let running = reply(
        "/reply/workspace/A/runningCues/shallow",
        r#"[{"uniqueID":"6","name":"FX","number":"1"}]"#,
    );
    bridge.handle_message(SourceRole::Main, &running);
    bridge.handle_message(SourceRole::Main, &running);

    let tracker = bridge.tracker(SourceRole::Main).unwrap();
    assert!(tracker.active().is_polling_active);
    assert_eq!(tracker.active().cue_id.as_deref(), Some("6"));
    assert_eq!(
        sends(&bridge.poll_tick(SourceRole::Main)),
        vec!["/workspace/A/cue_id/6/isRunning"]
    );
}

#[test]
fn unconfigured_changeover_keeps_selection() {
    let mut bridge = Bridge::new(&[(SourceRole::Main, engine("A"))], BridgeSettings::default());
    bridge.start();
    let err = bridge.changeover(SourceRole::Backup).unwrap_err();
    assert_eq!(err, BridgeError::UnconfiguredRoleRequested(SourceRole::Backup));
    assert_eq!(bridge.selected(), SourceRole::Main);
}

#[test]
fn single_engine_never_changes_over() {
    let mut bridge = only();
    assert_eq!(
        bridge.changeover(SourceRole::Main).unwrap_err(),
        BridgeError::ChangeoverUnavailable
    );
    assert_eq!(
        bridge
            .handle_command(Command::Changeover {
                role: SourceRole::Backup
            })
            .unwrap_err(),
        BridgeError::ChangeoverUnavailable
    );
    assert_eq!(bridge.selected(), SourceRole::Only);
}

#[test]
fn changeover_blanks_then_resyncs_backup() {
    let mut bridge = pair();
    bridge.handle_message(SourceRole::Backup, &position("B", "7"));
    bridge.handle_message(
        SourceRole::Backup,
        &reply("/reply/workspace/B/cue_id/7/displayName", r#""Preset""#),
    );
    bridge.handle_message(
        SourceRole::Backup,
        &reply("/reply/workspace/B/cue_id/7/number", r#""1""#),
    );

    let effects = bridge.changeover(SourceRole::Backup).unwrap();
    assert_eq!(displays(&effects), vec![&DisplayUpdate::Blank]);
    assert!(effects.contains(&Effect::ScheduleSettle {
        role: SourceRole::Backup
    }));

    let settle = bridge.settle_elapsed(SourceRole::Backup);
    assert_eq!(
        sends(&settle),
        vec![
            "/workspace/B/cue_id/LIST/playheadId",
            "/workspace/B/runningCues/shallow",
        ]
    );

    bridge.handle_message(
        SourceRole::Backup,
        &reply("/reply/workspace/B/cue_id/LIST/playheadId", r#""7""#),
    );
    bridge.handle_message(
        SourceRole::Backup,
        &reply("/reply/workspace/B/cue_id/7/displayName", r#""Preset""#),
    );
    let shown = bridge.handle_message(
        SourceRole::Backup,
        &reply("/reply/workspace/B/cue_id/7/number", r#""1""#),
    );
    assert_eq!(
        displays(&shown),
        vec![&DisplayUpdate::Playhead {
            name: "Preset".into(),
            number: "1".into()
        }]
    );
}

#[test]
fn disconnect_notice_only_affects_its_engine() {
    let mut bridge = pair();
    let notice = msg("/workspace/B/disconnect", vec![]);
    let effects = bridge.handle_message(SourceRole::Backup, &notice);
    assert!(displays(&effects).is_empty());
    assert!(bridge.tracker(SourceRole::Backup).unwrap().is_disconnected());
    assert!(!bridge.tracker(SourceRole::Main).unwrap().is_disconnected());

    let notice = msg("/workspace/A/disconnect", vec![]);
    let effects = bridge.handle_message(SourceRole::Main, &notice);
    assert_eq!(
        displays(&effects),
        vec![&DisplayUpdate::Disconnected {
            role: SourceRole::Main
        }]
    );
}

#[test]
fn unknown_messages_are_relayed() {
    let mut bridge = only();
    let custom = msg("/cue/1/start", vec![OscType::Int(1)]);
    let effects = bridge.handle_message(SourceRole::Only, &custom);
    assert_eq!(effects, vec![Effect::Forward(custom)]);
}

#[test]
fn changeover_stops_only_the_new_engine_poll() {
    let mut bridge = pair();
    for (role, ws) in [(SourceRole::Main, "A"), (SourceRole::Backup, "B")] {
        bridge.handle_message(
            role,
            &reply(
                &format!("/reply/workspace/{}/cue_id/PLAYING/children", ws),
                r#"[{"uniqueID":"6"}]"#,
            ),
        );
        let effects = bridge.handle_message(
            role,
            &reply(
                &format!("/reply/workspace/{}/runningCues/shallow", ws),
                r#"[{"uniqueID":"6","name":"FX","number":"3.2.1"}]"#,
            ),
        );
        assert_eq!(count_polls(&effects), 1);
    }
    let main_before = bridge.tracker(SourceRole::Main).unwrap().active().clone();

    let effects = bridge.changeover(SourceRole::Backup).unwrap();
    assert!(effects.contains(&Effect::CancelLivenessPoll {
        role: SourceRole::Backup
    }));
    assert!(!effects.contains(&Effect::CancelLivenessPoll {
        role: SourceRole::Main
    }));

    let main = bridge.tracker(SourceRole::Main).unwrap();
    assert_eq!(main.active(), &main_before);
    assert!(main.active().is_polling_active);
    assert_eq!(
        sends(&bridge.poll_tick(SourceRole::Main)),
        vec!["/workspace/A/cue_id/6/isRunning"]
    );

    let backup = bridge.tracker(SourceRole::Backup).unwrap();
    assert_eq!(backup.active().cue_id, None);
    assert!(!backup.active().is_polling_active);
}
