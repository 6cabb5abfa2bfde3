//! Shared fixtures: three independently generated packages

#![allow(dead_code)]

use tether_object::{ObjectConfig, ObjectModel, Package};
use tether_schema::{FieldSchema, FieldType, MessageSchema, SchemaRegistry};

pub fn common_package() -> SchemaRegistry {
    SchemaRegistry::new("library.common")
        .with_message(
            MessageSchema::new("library.common.User")
                .with_field(FieldSchema::string("id", 1))
                .with_field(FieldSchema::string("name", 2))
                .with_field(FieldSchema::bytes("avatar", 3)),
        )
        .unwrap()
        .with_message(
            MessageSchema::new("library.common.Metadata")
                .with_field(FieldSchema::message("owner", 1, "library.common.User"))
                .with_field(FieldSchema::map("labels", 2, FieldType::String)),
        )
        .unwrap()
}

pub fn geo_package() -> SchemaRegistry {
    SchemaRegistry::new("library.geo")
        .with_message(
            MessageSchema::new("library.geo.Place")
                .with_field(FieldSchema::string("id", 1))
                .with_field(FieldSchema::number("latitude", 2))
                .with_field(FieldSchema::number("longitude", 3))
                .with_field(FieldSchema::string("label", 4)),
        )
        .unwrap()
}

pub fn game_package() -> SchemaRegistry {
    SchemaRegistry::new("game")
        .with_message(
            MessageSchema::new("game.Match")
                .with_field(FieldSchema::string("id", 1))
                .with_field(FieldSchema::string("title", 2))
                .with_field(FieldSchema::repeated_message("players", 3, "game.Player"))
                .with_field(FieldSchema::map_message("places", 4, "library.geo.Place"))
                .with_field(FieldSchema::message("host", 5, "library.common.User"))
                .with_field(FieldSchema::string("winner", 6).in_oneof("outcome"))
                .with_field(FieldSchema::boolean("draw", 7).in_oneof("outcome"))
                .with_field(
                    FieldSchema::enumeration("state", 8)
                        .with_enum_value("PENDING", 0)
                        .with_enum_value("RUNNING", 1)
                        .with_enum_value("FINISHED", 2),
                )
                .with_field(FieldSchema::map("scores", 9, FieldType::Integer))
                .with_field(FieldSchema::message("metadata", 10, "library.common.Metadata"))
                .with_field(FieldSchema::repeated("tags", 11, FieldType::String)),
        )
        .unwrap()
        .with_message(
            MessageSchema::new("game.Player")
                .with_field(FieldSchema::string("name", 1))
                .with_field(FieldSchema::integer("score", 2))
                .with_field(FieldSchema::message("user", 3, "library.common.User")),
        )
        .unwrap()
}

pub fn model() -> ObjectModel {
    model_with(ObjectConfig::default())
}

pub fn model_with(config: ObjectConfig) -> ObjectModel {
    ObjectModel::builder()
        .package(Package::with_default_factory(game_package()))
        .package(Package::with_default_factory(common_package()))
        .package(Package::with_default_factory(geo_package()))
        .config(config)
        .build()
        .unwrap()
}
