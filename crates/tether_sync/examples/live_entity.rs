//! Live entity demonstration
//!
//! This example shows:
//! - Wiring two independently generated packages
//! - Materializing an entity whose fields cross packages
//! - Receiving server batches through a channel transport
//! - Stale and out-of-sequence deliveries
//! - Local edits ready to forward upstream

use std::time::Duration;
use tether_ir::Value;
use tether_object::Package;
use tether_schema::{FieldSchema, FieldType, MessageSchema, SchemaRegistry};
use tether_sync::{BatchStatus, ChangeTransport, ChannelTransport, SyncConfig, SyncEngine};

fn packages() -> Result<Vec<Package>, tether_schema::SchemaError> {
    let common = SchemaRegistry::new("library.common").with_message(
        MessageSchema::new("library.common.User")
            .with_field(FieldSchema::string("id", 1))
            .with_field(FieldSchema::string("name", 2)),
    )?;
    let lobby = SchemaRegistry::new("lobby").with_message(
        MessageSchema::new("lobby.Room")
            .with_field(FieldSchema::string("topic", 1))
            .with_field(FieldSchema::repeated_message("members", 2, "library.common.User"))
            .with_field(FieldSchema::map("ready", 3, FieldType::Boolean)),
    )?;
    Ok(vec![
        Package::with_default_factory(lobby),
        Package::with_default_factory(common),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    println!("Live Entity Demo");
    println!("================\n");

    let mut engine = SyncEngine::with_packages(packages()?, SyncConfig::default())?;
    engine.on_change(|report, room| {
        println!(
            "  -> {} at change {} ({} patches): {}",
            report.entity_id,
            report.change_number,
            report.patches.applied,
            room.to_value().to_json().unwrap_or_default()
        );
    });

    let initial = Value::from_json(r#"{"topic": "Friday", "members": [{"id": "u1", "name": "Ada"}]}"#)?;
    engine.materialize("room-1", "lobby.Room", &initial, 1)?;
    println!("Materialized room-1 at change 1\n");

    let (mut transport, sender) = ChannelTransport::new(16);
    engine.attach(&mut transport)?;

    // A host bridge would push these from a socket
    sender.send_json(
        r#"{"messageType": "lobby.Room", "entityId": "room-1", "changeNumber": 3, "source": "SERVER",
            "patches": [
              {"operation": "INSERT_LIST", "fieldPath": "members", "index": 1,
               "value": {"id": "u2", "name": "Lin"}, "changeNumber": 2},
              {"operation": "INSERT_MAP", "fieldPath": "ready", "key": "u1", "value": true, "changeNumber": 3}
            ]}"#,
    )?;
    // Redelivered
    sender.send_json(
        r#"{"messageType": "lobby.Room", "entityId": "room-1", "changeNumber": 3, "source": "SERVER",
            "patches": []}"#,
    )?;
    // Skips change 4
    sender.send_json(
        r#"{"messageType": "lobby.Room", "entityId": "room-1", "changeNumber": 5, "source": "SERVER",
            "patches": [{"operation": "SET", "fieldPath": "members[1].name", "value": "Nadia", "changeNumber": 5}]}"#,
    )?;

    let mut received = 0;
    while received < 3 {
        let results = engine.pump_timeout(Duration::from_secs(1));
        if results.is_empty() {
            break;
        }
        for result in results {
            received += 1;
            match result {
                Ok(report) if report.status == BatchStatus::Stale => {
                    println!("Discarded stale batch {}", report.change_number)
                }
                Ok(report) => {
                    for warning in &report.warnings {
                        println!("Warning: {}", warning);
                    }
                }
                Err(e) => eprintln!("Rejected: {}", e),
            }
        }
    }

    println!("\nLocal edit:");
    let (batch, _) = engine.edit(
        "room-1",
        [tether_ir::MessagePatch::set("topic", "Saturday").with_user("u1")],
    )?;
    println!("Forward upstream: {}\n", batch.to_json()?);

    transport.disconnect();
    println!("Stats: {:?}", engine.stats());
    Ok(())
}
