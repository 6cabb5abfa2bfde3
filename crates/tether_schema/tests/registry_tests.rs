//! Integration tests for tether_schema
//!
//! Loads registries in the generator's JSON shape.

use tether_schema::*;

const GAME_SCHEMA: &str = r#"{
    "package": "game",
    "messages": {
        "game.Match": {
            "fields": [
                { "name": "title", "id": 1, "type": "STRING" },
                { "name": "players", "id": 2, "type": "REPEATED", "messageType": "game.Player" },
                { "name": "places", "id": 3, "type": "MAP", "elementType": "MESSAGE", "messageType": "library.geo.Place" },
                { "name": "winner", "id": 4, "type": "STRING", "oneofGroup": "outcome" },
                { "name": "draw", "id": 5, "type": "BOOLEAN", "oneofGroup": "outcome" },
                { "name": "state", "id": 6, "type": "ENUM", "enumValues": { "OPEN": 0, "RUNNING": 1, "DONE": 2 } }
            ]
        },
        "game.Player": {
            "name": "Player",
            "fullName": "game.Player",
            "fields": [
                { "name": "name", "id": 1, "type": "STRING" },
                { "name": "score", "id": 2, "type": "INTEGER" }
            ]
        }
    }
}"#;

#[test]
fn test_load_from_json() {
    let registry = SchemaRegistry::from_json(GAME_SCHEMA).expect("schema should load");

    assert_eq!(registry.package(), "game");
    assert_eq!(registry.len(), 2);

    let schema = registry.get_schema("game.Match").unwrap();
    assert_eq!(schema.name, "Match");
    assert_eq!(schema.full_name, "game.Match");

    let players = registry.get_field_schema("game.Match", "players").unwrap();
    assert_eq!(players.field_type, FieldType::Repeated);
    assert_eq!(players.element_kind(), Some(FieldType::Message));
    assert_eq!(players.message_type.as_deref(), Some("game.Player"));

    let state = registry.get_field_schema_by_id("game.Match", 6).unwrap();
    assert_eq!(state.enum_values.get("RUNNING"), Some(&1));

    assert!(registry.is_oneof_field("game.Match", "draw"));
    assert_eq!(registry.get_oneof_fields("game.Match", "outcome").len(), 2);
}

#[test]
fn test_field_order_preserved() {
    let registry = SchemaRegistry::from_json(GAME_SCHEMA).unwrap();
    let names: Vec<_> = registry
        .get_schema("game.Match")
        .unwrap()
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["title", "players", "places", "winner", "draw", "state"]);

    let types: Vec<_> = registry.type_names().collect();
    assert_eq!(types, vec!["game.Match", "game.Player"]);
}

#[test]
fn test_json_round_trip() {
    let registry = SchemaRegistry::from_json(GAME_SCHEMA).unwrap();
    let json = registry.to_json().unwrap();
    let reloaded = SchemaRegistry::from_json(&json).unwrap();

    assert_eq!(reloaded.package(), registry.package());
    for name in registry.type_names() {
        assert_eq!(reloaded.get_schema(name), registry.get_schema(name));
    }
}

#[test]
fn test_duplicate_id_in_json_rejected() {
    let json = r#"{
        "package": "game",
        "messages": {
            "game.Player": {
                "fields": [
                    { "name": "name", "id": 1, "type": "STRING" },
                    { "name": "score", "id": 1, "type": "INTEGER" }
                ]
            }
        }
    }"#;
    let err = SchemaRegistry::from_json(json).unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateFieldId { id: 1, .. }));
}

#[test]
fn test_key_mismatch_rejected() {
    let json = r#"{
        "package": "game",
        "messages": {
            "game.Player": { "fullName": "game.Other", "fields": [] }
        }
    }"#;
    assert!(matches!(
        SchemaRegistry::from_json(json),
        Err(SchemaError::KeyMismatch { .. })
    ));
}

#[test]
fn test_message_field_without_type_rejected() {
    let json = r#"{
        "package": "game",
        "messages": {
            "game.Match": {
                "fields": [ { "name": "host", "id": 1, "type": "MESSAGE" } ]
            }
        }
    }"#;
    assert!(matches!(
        SchemaRegistry::from_json(json),
        Err(SchemaError::MissingMessageType { .. })
    ));
}

#[test]
fn test_malformed_json() {
    assert!(matches!(
        SchemaRegistry::from_json("{ not json"),
        Err(SchemaError::Json(_))
    ));
}
