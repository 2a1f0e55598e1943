// Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use draftline_core::registry::{AttributeType, OwnerSchema, SchemaRegistry};
use draftline_core::AttributeMap;
use draftline_engine::LiveOwner;
use draftline_store::Database;
use serde_json::{json, Value};

/// Post schema; `with_rating` adds a column a later schema drops
pub fn post_schema(with_rating: bool) -> OwnerSchema {
    let mut post = OwnerSchema::new("post")
        .attribute("title", AttributeType::String)
        .attribute("body", AttributeType::Text)
        .attribute("published", AttributeType::Boolean)
        .attribute("user_id", AttributeType::Reference);
    if with_rating {
        post = post.attribute("rating", AttributeType::Integer);
    }
    post.timestamps()
        .belongs_to("author", "user", "user_id")
        .has_many("comments", "comment", "post_id")
        .nested("author")
        .nested("comments")
        .validates_presence_of("title")
        .display_with("title")
}

pub fn registry_with(post: OwnerSchema) -> Arc<SchemaRegistry> {
    SchemaRegistry::builder()
        .register(
            OwnerSchema::new("user")
                .attribute("name", AttributeType::String)
                .validates_presence_of("name"),
        )
        .register(
            OwnerSchema::new("comment")
                .attribute("body", AttributeType::Text)
                .attribute("post_id", AttributeType::Reference),
        )
        .register(post)
        .build()
        .unwrap()
}

pub fn registry() -> Arc<SchemaRegistry> {
    registry_with(post_schema(false))
}

pub fn setup_db() -> Database {
    Database::open_in_memory(registry()).unwrap()
}

pub fn open_file_db(path: &Path, registry: Arc<SchemaRegistry>) -> Database {
    Database::open(path, registry).unwrap()
}

pub fn map(value: Value) -> AttributeMap {
    value.as_object().cloned().unwrap()
}

/// The canonical post used across tests
pub fn create_post(db: &mut Database) -> LiveOwner {
    LiveOwner::create(
        db,
        "post",
        &map(json!({ "title": "So Post", "body": "Such interesting." })),
        None,
    )
    .unwrap()
}
