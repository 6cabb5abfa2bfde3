//! Integration tests for tether_sync
//!
//! Drives live `game.Match` entities through direct batches, call
//! responses and a channel transport, checking ordering, staleness,
//! gaps, snapshots and disconnect behaviour.

mod common;

use common::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_ir::{ChangeSource, MessagePatch, PatchBatch, PatchResponse, Value};
use tether_object::FieldValue;
use tether_patch::AddressReason;
use tether_sync::*;

const WAIT: Duration = Duration::from_secs(5);

fn raw(json: &str) -> Value {
    Value::from_json(json).expect("fixture JSON")
}

fn engine() -> SyncEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = SyncEngine::new(Arc::new(model()), SyncConfig::default());
    engine
        .materialize(
            "m1",
            "game.Match",
            &raw(r#"{"id": "m1", "title": "Final", "players": [{"name": "Ada"}]}"#),
            4,
        )
        .unwrap();
    engine
}

fn batch(change_number: u64, patches: Vec<MessagePatch>) -> PatchBatch {
    patches
        .into_iter()
        .fold(
            PatchBatch::new("game.Match", "m1", ChangeSource::Server),
            |batch, patch| batch.with_patch(patch),
        )
        .with_change_number(change_number)
}

fn title(engine: &SyncEngine) -> String {
    engine
        .entity("m1")
        .and_then(|e| e.instance.get("title"))
        .and_then(FieldValue::as_str)
        .unwrap_or_default()
        .to_string()
}

#[test]
fn test_reapplying_a_batch_is_a_no_op() {
    let mut engine = engine();
    let b = batch(5, vec![MessagePatch::insert_list("players", 1, raw(r#"{"name": "Lin"}"#))]);

    assert_eq!(engine.apply_batch(&b).unwrap().status, BatchStatus::Applied);
    let after_first = engine.entity("m1").cloned().unwrap();

    let again = engine.apply_batch(&b).unwrap();
    assert_eq!(again.status, BatchStatus::Stale);
    assert!(again.patches.applied == 0 && again.patches.errors.is_empty());
    assert_eq!(engine.entity("m1"), Some(&after_first));
}

#[test]
fn test_batches_apply_in_change_number_order() {
    let b1 = batch(5, vec![MessagePatch::set("title", "Semi")]);
    let b2 = batch(6, vec![MessagePatch::set("title", "Final 2")]);

    let mut in_order = engine();
    in_order.apply_batch(&b1).unwrap();
    in_order.apply_batch(&b2).unwrap();
    assert_eq!(title(&in_order), "Final 2");
    assert_eq!(in_order.entity("m1").map(|e| e.change_number), Some(6));

    // A late older batch is discarded instead of rolling state back
    let mut reordered = engine();
    reordered.apply_batch(&b2).unwrap();
    let late = reordered.apply_batch(&b1).unwrap();
    assert_eq!(late.status, BatchStatus::Stale);
    assert_eq!(title(&reordered), "Final 2");
}

#[test]
fn test_sequence_gap_is_reported_and_applied() {
    let mut engine = engine();
    let report = engine
        .apply_batch(&batch(
            9,
            vec![MessagePatch::set("title", "Gap").with_change_number(8)],
        ))
        .unwrap();

    assert!(report.is_applied());
    assert_eq!(
        report.warnings,
        vec![SyncWarning::SequenceGap {
            expected: 5,
            received: 8
        }]
    );
    assert_eq!(title(&engine), "Gap");
    assert_eq!(engine.stats().sequence_gaps, 1);
}

#[test]
fn test_partial_failure_keeps_other_patches() {
    let mut engine = engine();
    let report = engine
        .apply_batch(&batch(
            5,
            vec![
                MessagePatch::set("title", "Semi"),
                MessagePatch::set("players[3].name", "Kim"),
                MessagePatch::set("players[0].name", "Nadia"),
            ],
        ))
        .unwrap();

    assert_eq!(report.patches.applied, 2);
    assert_eq!(report.patches.errors.len(), 1);
    assert_eq!(report.patches.errors[0].field_path, "players[3].name");
    assert_eq!(
        report.patches.errors[0].reason,
        AddressReason::IndexOutOfBounds { index: 3, len: 1 }
    );
    assert_eq!(title(&engine), "Semi");
    assert_eq!(engine.entity("m1").map(|e| e.change_number), Some(5));

    let stats = engine.stats();
    assert_eq!(stats.patches_applied, 2);
    assert_eq!(stats.patches_skipped, 1);
}

#[test]
fn test_listeners_see_applied_batches_only() {
    let mut engine = engine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.on_change(move |report, instance| {
        sink.lock().push((
            report.change_number,
            report.user_ids.clone(),
            instance.get("title").and_then(FieldValue::as_str).map(str::to_string),
        ));
    });

    let b = PatchBatch::builder("game.Match", "m1", ChangeSource::Remote)
        .after(4)
        .user("ada")
        .transaction("tx-1")
        .patch(MessagePatch::set("title", "Semi"))
        .patch(MessagePatch::set("winner", "ada").with_user("lin"))
        .build();
    let report = engine.apply_batch(&b).unwrap();
    assert_eq!(report.transaction_ids, vec!["tx-1".to_string()]);
    engine.apply_batch(&b).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 6);
    assert_eq!(seen[0].1, vec!["ada".to_string(), "lin".to_string()]);
    assert_eq!(seen[0].2.as_deref(), Some("Semi"));
}

#[test]
fn test_apply_response() {
    let mut engine = engine();

    let response = PatchResponse::success(vec![
        batch(5, vec![MessagePatch::set("title", "One")]),
        batch(6, vec![MessagePatch::insert_map("scores", "ada", 3)]),
    ]);
    assert_eq!(response.new_change_number, 6);
    let reports = engine.apply_response(&response).unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(BatchReport::is_clean));

    let failed = PatchResponse::failure("match is closed");
    match engine.apply_response(&failed) {
        Err(SyncError::Remote(message)) => assert_eq!(message, "match is closed"),
        other => panic!("expected remote error, got {:?}", other),
    }

    let unknown = PatchResponse::success(vec![PatchBatch::new("game.Match", "m2", ChangeSource::Server)
        .with_change_number(1)]);
    assert!(matches!(
        engine.apply_response(&unknown),
        Err(SyncError::UnknownEntity(id)) if id == "m2"
    ));
}

#[test]
fn test_snapshot_restore() {
    let mut engine = engine();
    engine
        .apply_batch(&batch(
            5,
            vec![
                MessagePatch::set("host", raw(r#"{"id": "u1", "avatar": "AQID"}"#)),
                MessagePatch::set("state", "RUNNING"),
                MessagePatch::insert_map("places", "tile_1", raw(r#"{"latitude": 1.5}"#)),
            ],
        ))
        .unwrap();
    let live = engine.entity("m1").cloned().unwrap();

    let json = engine.snapshot("m1").unwrap().to_json().unwrap();
    let snapshot = EntitySnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot.change_number, 5);
    assert_eq!(snapshot.message_type, "game.Match");

    engine.remove_entity("m1");
    assert!(engine.entity("m1").is_none());

    let diagnostics = engine.restore(&snapshot).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    let restored = engine.entity("m1").unwrap();
    assert_eq!(restored.instance, live.instance);
    assert_eq!(restored.change_number, 5);
}

#[test]
fn test_transport_delivery_and_disconnect() {
    let mut engine = engine();
    let (mut transport, sender) = ChannelTransport::new(8);
    engine.attach(&mut transport).unwrap();

    sender
        .send_json(
            r#"[{
                "messageType": "game.Match",
                "entityId": "m1",
                "changeNumber": 5,
                "source": "SERVER",
                "patches": [
                    {"operation": "SET", "fieldPath": "players[0].name", "value": "Nadia", "changeNumber": 5}
                ]
            }]"#,
        )
        .unwrap();

    let results = engine.pump_timeout(WAIT);
    assert_eq!(results.len(), 1);
    assert!(results[0].as_ref().map(BatchReport::is_clean).unwrap_or(false));
    let name = engine
        .entity("m1")
        .and_then(|e| e.instance.get("players"))
        .and_then(FieldValue::as_list)
        .and_then(|players| players[0].as_message())
        .and_then(|p| p.get("name"))
        .and_then(FieldValue::as_str)
        .map(str::to_string);
    assert_eq!(name.as_deref(), Some("Nadia"));

    transport.disconnect();
    assert!(matches!(
        sender.send(vec![batch(6, vec![MessagePatch::set("title", "Late")])]),
        Err(TransportError::Closed)
    ));
    assert!(engine.pump_timeout(Duration::from_millis(50)).is_empty());
    assert_eq!(title(&engine), "Final");
}

#[test]
fn test_full_inbox_drops_and_counts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = SyncEngine::new(
        Arc::new(model()),
        SyncConfig::default().with_inbox_capacity(1),
    );
    engine
        .materialize("m1", "game.Match", &Value::Null, 0)
        .unwrap();

    let (mut transport, sender) = ChannelTransport::new(4);
    engine.attach(&mut transport).unwrap();
    sender
        .send(vec![
            batch(1, vec![MessagePatch::set("title", "a")]),
            batch(2, vec![MessagePatch::set("title", "b")]),
            batch(3, vec![MessagePatch::set("title", "c")]),
        ])
        .unwrap();

    let deadline = Instant::now() + WAIT;
    while engine.stats().inbox_dropped < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.stats().inbox_dropped, 2);

    let results = engine.pump();
    assert_eq!(results.len(), 1);
    assert_eq!(title(&engine), "a");
}
