// Integration tests for the versioned owner lifecycle.
// Covers create snapshots, current_draft caching, destroy_draft and destroy.

mod common;

use common::{create_post, map, registry, setup_db};
use draftline_core::{DraftlineError, Event, SnapshotFilter};
use draftline_engine::{LiveOwner, Versionable};
use draftline_store::{RecordRepo, SnapshotRepo};
use serde_json::json;

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

#[test]
fn test_create_writes_one_create_snapshot() {
    // Given: An empty database
    let mut db = setup_db();

    // When: A post is created
    let post = create_post(&mut db);

    // Then: Exactly one committed create snapshot captures its attributes
    let history = post.snapshots(&db, SnapshotFilter::All).unwrap();
    assert_eq!(history.len(), 1);
    let created = &history[0];
    assert_eq!(created.event, Event::Create);
    assert!(!created.draft);
    assert!(created.committed_at.is_some());
    assert_eq!(created.object, post.versioned_attributes());
    assert_eq!(created.object.get("title"), Some(&json!("So Post")));
    assert_eq!(created.object.get("body"), Some(&json!("Such interesting.")));
}

#[test]
fn test_create_snapshot_excludes_blacklisted_attributes() {
    let mut db = setup_db();
    let post = create_post(&mut db);

    let created = &post.snapshots(&db, SnapshotFilter::All).unwrap()[0];
    for hidden in ["created_at", "updated_at", "published"] {
        assert!(!created.object.contains_key(hidden), "{} was captured", hidden);
    }
    assert_eq!(
        created.object.get("id"),
        Some(&json!(post.to_param().unwrap()))
    );
}

#[test]
fn test_create_records_committer() {
    let mut db = setup_db();
    let post = LiveOwner::create(
        &mut db,
        "post",
        &map(json!({ "title": "So Post" })),
        Some("alice".to_string()),
    )
    .unwrap();

    let created = &post.snapshots(&db, SnapshotFilter::All).unwrap()[0];
    assert_eq!(created.committer.as_deref(), Some("alice"));
}

#[test]
fn test_built_owner_saves_with_attached_committer() {
    let mut db = setup_db();
    let mut post = LiveOwner::build(registry(), "post", &map(json!({ "title": "So Post" })))
        .unwrap()
        .with_committer("dave");

    assert!(post.save(&mut db).unwrap());

    let created = &post.snapshots(&db, SnapshotFilter::All).unwrap()[0];
    assert_eq!(created.committer.as_deref(), Some("dave"));
    assert_eq!(post.current_draft(&mut db, false).unwrap().committer(), Some("dave"));
}

#[test]
fn test_create_invalid_writes_nothing() {
    // Given: Attributes that fail presence validation
    let mut db = setup_db();

    // When: The post is created
    let result = LiveOwner::create(&mut db, "post", &map(json!({ "body": "untitled" })), None);

    // Then: RecordInvalid carries the error and no row exists
    match result {
        Err(DraftlineError::RecordInvalid { record }) => {
            assert_eq!(record.full_messages(), vec!["Title can't be blank".to_string()]);
        }
        other => panic!("expected RecordInvalid, got {:?}", other),
    }
    assert_eq!(RecordRepo::count(db.connection(), "post").unwrap(), 0);
}

#[test]
fn test_save_on_update_adds_no_snapshot() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);

    assert!(post
        .update(&mut db, &map(json!({ "title": "Renamed" })))
        .unwrap());

    let found = LiveOwner::find(&db, "post", post.record().id().unwrap()).unwrap();
    assert_eq!(found.attribute("title"), Some(&json!("Renamed")));
    assert_eq!(post.snapshots(&db, SnapshotFilter::All).unwrap().len(), 1);
}

#[test]
fn test_build_then_save_creates_snapshot_with_nested_author() {
    let mut db = setup_db();
    let mut post = LiveOwner::build(
        registry(),
        "post",
        &map(json!({ "title": "So Post", "author_attributes": { "name": "Steve" } })),
    )
    .unwrap();

    assert!(post.save(&mut db).unwrap());

    let created = &post.snapshots(&db, SnapshotFilter::All).unwrap()[0];
    let author = created.object.get("author_attributes").unwrap();
    assert_eq!(author.get("name"), Some(&json!("Steve")));
    assert!(author.get("id").and_then(|v| v.as_str()).is_some());
}

// ---------------------------------------------------------------------------
// current_draft
// ---------------------------------------------------------------------------

#[test]
fn test_current_draft_requires_persisted_owner() {
    let mut db = setup_db();
    let mut post =
        LiveOwner::build(registry(), "post", &map(json!({ "title": "Unsaved" }))).unwrap();

    let err = post.current_draft(&mut db, false).unwrap_err();

    assert!(matches!(err, DraftlineError::RecordNotPersisted { .. }));
    assert_eq!(err.to_string(), "Unsaved must be persisted to create a draft version");
}

#[test]
fn test_current_draft_is_cached_and_single() {
    // Given: A persisted post
    let mut db = setup_db();
    let mut post = create_post(&mut db);

    // When: The draft is requested twice without force_reload
    let first = post.current_draft(&mut db, false).unwrap().snapshot_id().clone();
    let second = post.current_draft(&mut db, false).unwrap().snapshot_id().clone();

    // Then: The same draft is returned and only one draft snapshot exists
    assert_eq!(first, second);
    let owner = post.owner_key().unwrap();
    assert_eq!(SnapshotRepo::count_for_owner(db.connection(), &owner).unwrap(), 2);
    assert!(post.has_current_draft(&db).unwrap());
}

#[test]
fn test_new_draft_starts_from_live_attributes() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let expected = post.versioned_attributes();

    let draft = post.current_draft(&mut db, false).unwrap();
    let stored = draft.snapshot(&db).unwrap();

    assert_eq!(stored.event, Event::Draft);
    assert!(stored.draft);
    assert!(stored.committed_at.is_none());
    assert_eq!(stored.object, expected);
}

#[test]
fn test_force_reload_discards_unsaved_edits() {
    // Given: A draft with an unsaved in-memory edit
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.set_attribute("title", json!("edited")).unwrap();
    let draft_id = draft.snapshot_id().clone();

    // When: The draft is requested again, with and without force_reload
    let cached = post.current_draft(&mut db, false).unwrap();
    assert_eq!(cached.attribute("title"), Some(&json!("edited")));
    let reloaded = post.current_draft(&mut db, true).unwrap();

    // Then: The edit is gone and the same stored draft is used
    assert_eq!(reloaded.attribute("title"), Some(&json!("So Post")));
    assert_eq!(reloaded.snapshot_id(), &draft_id);
}

#[test]
fn test_current_draft_resumes_stored_draft_on_fresh_owner() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.update(&mut db, &map(json!({ "title": "Test" }))).unwrap();
    let draft_id = draft.snapshot_id().clone();

    let mut again = LiveOwner::find(&db, "post", post.record().id().unwrap()).unwrap();
    let resumed = again.current_draft(&mut db, false).unwrap();

    assert_eq!(resumed.snapshot_id(), &draft_id);
    assert_eq!(resumed.attribute("title"), Some(&json!("Test")));
    assert_eq!(again.attribute("title"), Some(&json!("So Post")));
}

// ---------------------------------------------------------------------------
// destroy_draft
// ---------------------------------------------------------------------------

#[test]
fn test_destroy_draft_then_new_draft() {
    // Given: A post with a draft
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let old = post.current_draft(&mut db, false).unwrap().snapshot_id().clone();

    // When: The draft is destroyed
    let removed = post.destroy_draft(&mut db).unwrap();

    // Then: No draft remains and the next request creates a new one
    assert_eq!(removed, 1);
    assert!(!post.has_current_draft(&db).unwrap());
    let fresh = post.current_draft(&mut db, false).unwrap().snapshot_id().clone();
    assert_ne!(fresh, old);
    assert!(post.has_current_draft(&db).unwrap());
    assert_eq!(post.snapshots(&db, SnapshotFilter::Draft).unwrap().len(), 1);
}

#[test]
fn test_destroy_draft_keeps_committed_history() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    post.current_draft(&mut db, false).unwrap();

    post.destroy_draft(&mut db).unwrap();

    let committed = post.snapshots(&db, SnapshotFilter::Committed).unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].event, Event::Create);
}

// ---------------------------------------------------------------------------
// destroy
// ---------------------------------------------------------------------------

#[test]
fn test_destroy_cascades_snapshots() {
    // Given: A post with a create snapshot and a draft
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    post.current_draft(&mut db, false).unwrap();
    let owner = post.owner_key().unwrap();

    // When: The post is destroyed
    let removed = post.destroy(&mut db).unwrap();

    // Then: The row and its whole history are gone
    assert_eq!(removed, 2);
    assert!(!RecordRepo::exists(db.connection(), &owner.kind, &owner.id).unwrap());
    assert_eq!(SnapshotRepo::count_for_owner(db.connection(), &owner).unwrap(), 0);
}

#[test]
fn test_reload_discards_live_edits() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    post.set_attribute("title", json!("unsaved")).unwrap();

    post.reload(&db).unwrap();

    assert_eq!(post.attribute("title"), Some(&json!("So Post")));
    assert_eq!(post.to_s(), "So Post");
}

#[test]
fn test_live_flags() {
    let mut db = setup_db();
    let post = create_post(&mut db);
    assert!(post.is_live());
    assert!(!post.is_version());
}
