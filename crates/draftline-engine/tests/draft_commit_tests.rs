// Integration tests for draft editing and the commit protocol.

mod common;

use common::{create_post, map, setup_db};
use draftline_core::{CommitParams, DraftlineError, Event, SnapshotFilter};
use draftline_core_types::RecordId;
use draftline_engine::{LiveOwner, Versionable};
use draftline_store::RecordRepo;
use serde_json::json;

// ---------------------------------------------------------------------------
// save
// ---------------------------------------------------------------------------

#[test]
fn test_draft_save_leaves_live_owner_untouched() {
    // Given: A post and its draft
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    let draft = post.current_draft(&mut db, false).unwrap();

    // When: The draft is edited and saved
    draft.set_attribute("title", json!("Test")).unwrap();
    draft.set_attribute("body", json!("New body")).unwrap();
    assert!(draft.save(&mut db).unwrap());

    // Then: The draft snapshot holds the edit; the live row does not
    let stored = draft.snapshot(&db).unwrap();
    assert_eq!(stored.object.get("title"), Some(&json!("Test")));
    assert_eq!(stored.object.get("body"), Some(&json!("New body")));
    let live = LiveOwner::find(&db, "post", &post_id).unwrap();
    assert_eq!(live.attribute("title"), Some(&json!("So Post")));
}

#[test]
fn test_draft_save_invalid_returns_false() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();

    draft.set_attribute("title", json!("")).unwrap();

    assert!(!draft.save(&mut db).unwrap());
    assert_eq!(draft.errors().len(), 1);
    let stored = draft.snapshot(&db).unwrap();
    assert_eq!(stored.object.get("title"), Some(&json!("So Post")));
}

#[test]
fn test_draft_save_strict_raises_record_invalid() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.set_attribute("title", json!("  ")).unwrap();

    let err = draft.save_strict(&mut db).unwrap_err();

    match err {
        DraftlineError::RecordInvalid { record } => {
            assert_eq!(record.get("title"), Some(&json!("  ")));
            assert_eq!(record.full_messages(), vec!["Title can't be blank".to_string()]);
        }
        other => panic!("expected RecordInvalid, got {:?}", other),
    }
}

#[test]
fn test_draft_save_records_committer() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    post.set_committer(Some("bob".to_string()));
    let draft = post.current_draft(&mut db, false).unwrap();

    draft.update(&mut db, &map(json!({ "title": "Test" }))).unwrap();

    assert_eq!(draft.snapshot(&db).unwrap().committer.as_deref(), Some("bob"));
}

#[test]
fn test_draft_reload_rereads_saved_state() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.update(&mut db, &map(json!({ "title": "Saved" }))).unwrap();
    draft.set_attribute("title", json!("Unsaved")).unwrap();

    draft.reload(&db).unwrap();

    assert_eq!(draft.attribute("title"), Some(&json!("Saved")));
}

#[test]
fn test_nested_author_not_created_until_commit() {
    // Given: A draft that assigns a new author
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    let draft = post.current_draft(&mut db, false).unwrap();
    assert!(draft
        .update(&mut db, &map(json!({ "author_attributes": { "name": "Steve" } })))
        .unwrap());

    // Then: Saving the draft writes no user row
    assert_eq!(RecordRepo::count(db.connection(), "user").unwrap(), 0);
    let stored = draft.snapshot(&db).unwrap();
    assert_eq!(
        stored.object["author_attributes"].get("name"),
        Some(&json!("Steve"))
    );

    // When: The draft is committed
    draft.commit(&mut db, &CommitParams::default()).unwrap();

    // Then: Exactly one user exists and the live post points at it
    assert_eq!(RecordRepo::count(db.connection(), "user").unwrap(), 1);
    let live = LiveOwner::find(&db, "post", &post_id).unwrap();
    let author = live.record().related_one("author").unwrap();
    assert_eq!(author.get("name"), Some(&json!("Steve")));
    assert_eq!(
        live.attribute("user_id"),
        Some(&json!(author.id().unwrap().as_str()))
    );
}

#[test]
fn test_nested_comments_are_upserted_and_destroyed_at_commit() {
    // Given: A post with two comments
    let mut db = setup_db();
    let mut post = LiveOwner::create(
        &mut db,
        "post",
        &map(json!({
            "title": "So Post",
            "comments_attributes": [{ "body": "first" }, { "body": "second" }]
        })),
        None,
    )
    .unwrap();
    let post_id = post.record().id().cloned().unwrap();
    let ids: Vec<String> = post
        .record()
        .related_many("comments")
        .iter()
        .map(|c| c.id().unwrap().to_string())
        .collect();

    let (first, second) = (&ids[0], &ids[1]);

    // When: The draft edits one comment, destroys the other, adds a third
    let draft = post.current_draft(&mut db, false).unwrap();
    draft
        .update(
            &mut db,
            &map(json!({
                "comments_attributes": [
                    { "id": first, "body": "edited" },
                    { "id": second, "_destroy": true },
                    { "body": "third" }
                ]
            })),
        )
        .unwrap();
    assert_eq!(RecordRepo::count(db.connection(), "comment").unwrap(), 2);
    draft.commit(&mut db, &CommitParams::default()).unwrap();

    // Then: The live post has the edited and the new comment only
    let live = LiveOwner::find(&db, "post", &post_id).unwrap();
    let bodies: Vec<_> = live
        .record()
        .related_many("comments")
        .iter()
        .map(|c| c.get("body").cloned().unwrap())
        .collect();
    assert_eq!(bodies, vec![json!("edited"), json!("third")]);
    assert_eq!(RecordRepo::count(db.connection(), "comment").unwrap(), 2);
}

// ---------------------------------------------------------------------------
// commit
// ---------------------------------------------------------------------------

#[test]
fn test_commit_applies_draft_to_live_owner() {
    // Given: The canonical post with a saved draft edit
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    let draft = post.current_draft(&mut db, false).unwrap();
    draft
        .update(&mut db, &map(json!({ "title": "Test", "body": "New body" })))
        .unwrap();

    // When: The draft is committed with a message
    let committed = draft
        .commit(&mut db, &CommitParams::with_message("Publish"))
        .unwrap();

    // Then: The snapshot is final and the live post carries its attributes
    assert!(!committed.draft);
    assert_eq!(committed.event, Event::Commit);
    assert!(committed.committed_at.is_some());
    assert_eq!(committed.commit_message.as_deref(), Some("Publish"));
    assert!(!draft.is_draft(&db).unwrap());

    let live = LiveOwner::find(&db, "post", &post_id).unwrap();
    assert_eq!(live.attribute("title"), Some(&json!("Test")));
    assert_eq!(live.attribute("body"), Some(&json!("New body")));
    for (key, value) in draftline_core::self_attributes(live.record()) {
        assert_eq!(committed.object.get(&key), Some(&value), "{} differs", key);
    }
}

#[test]
fn test_commit_params_override_defaults() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.set_committer(Some("alice".to_string()));
    let at = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let committed = draft
        .commit(
            &mut db,
            &CommitParams {
                commit_message: None,
                committer: Some("carol".to_string()),
                committed_at: Some(at),
            },
        )
        .unwrap();

    assert_eq!(committed.committer.as_deref(), Some("carol"));
    assert_eq!(committed.committed_at, Some(at));
    assert_eq!(committed.to_s("So Post"), "So Post #20240102030405");
}

#[test]
fn test_second_commit_fails_with_invalid_version() {
    // Given: A committed draft
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.commit(&mut db, &CommitParams::default()).unwrap();

    // When: It is committed again
    let err = draft.commit(&mut db, &CommitParams::default()).unwrap_err();

    // Then: The draft-state error names the snapshot
    assert_eq!(
        err.to_string(),
        format!("Version {} must be a draft", draft.snapshot_id())
    );
    assert!(matches!(err, DraftlineError::InvalidVersion { .. }));
}

#[test]
fn test_update_after_commit_fails_with_invalid_version() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.commit(&mut db, &CommitParams::default()).unwrap();

    let err = draft
        .update(&mut db, &map(json!({ "title": "Late" })))
        .unwrap_err();
    assert!(matches!(err, DraftlineError::InvalidVersion { .. }));

    let err = draft
        .update_strict(&mut db, &map(json!({ "title": "Late" })))
        .unwrap_err();
    assert!(matches!(err, DraftlineError::InvalidVersion { .. }));
}

#[test]
fn test_failed_commit_rolls_back_snapshot() {
    // Given: A draft whose in-memory title is blank
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    let draft = post.current_draft(&mut db, false).unwrap();
    draft.set_attribute("title", json!("")).unwrap();

    // When: It is committed
    let err = draft.commit(&mut db, &CommitParams::default()).unwrap_err();

    // Then: Validation fails and neither the snapshot nor the live row changed
    assert!(matches!(err, DraftlineError::RecordInvalid { .. }));
    let stored = draft.snapshot(&db).unwrap();
    assert!(stored.draft);
    assert_eq!(stored.event, Event::Draft);
    let live = LiveOwner::find(&db, "post", &post_id).unwrap();
    assert_eq!(live.attribute("title"), Some(&json!("So Post")));
}

#[test]
fn test_commit_after_destroy_draft_is_not_found() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let mut draft = post.current_draft(&mut db, false).unwrap().clone();
    post.destroy_draft(&mut db).unwrap();

    let err = draft.commit(&mut db, &CommitParams::default()).unwrap_err();

    assert!(matches!(err, DraftlineError::SnapshotNotFound { .. }));
}

#[test]
fn test_history_is_newest_first() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    post.current_draft(&mut db, false)
        .unwrap()
        .commit(&mut db, &CommitParams::default())
        .unwrap();
    post.current_draft(&mut db, true).unwrap();

    let events: Vec<Event> = post
        .snapshots(&db, SnapshotFilter::All)
        .unwrap()
        .into_iter()
        .map(|s| s.event)
        .collect();
    assert_eq!(events, vec![Event::Draft, Event::Commit, Event::Create]);
}

// ---------------------------------------------------------------------------
// identity
// ---------------------------------------------------------------------------

#[test]
fn test_proxy_identifies_as_live_owner() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let draft = post.current_draft(&mut db, false).unwrap().clone();

    assert!(draft == post);
    assert!(post == draft);
    assert_eq!(draft.to_param(), post.to_param());
    assert_eq!(draft.owner_key(), post.owner_key());
    assert!(draft.is_version());
    assert!(!draft.is_live());
}

// ---------------------------------------------------------------------------
// nested payloads committed from a fresh load
// ---------------------------------------------------------------------------

/// Load the owner again and commit its stored draft
fn commit_from_fresh_load(db: &mut draftline_store::Database, post_id: &RecordId) -> LiveOwner {
    let mut post = LiveOwner::find(db, "post", post_id).unwrap();
    post.current_draft(db, false)
        .unwrap()
        .commit(db, &CommitParams::default())
        .unwrap();
    LiveOwner::find(db, "post", post_id).unwrap()
}

#[test]
fn test_stored_new_author_is_created_on_fresh_commit() {
    // Given: A draft saved with a new author, then dropped from memory
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    post.current_draft(&mut db, false)
        .unwrap()
        .update(&mut db, &map(json!({ "author_attributes": { "name": "Steve" } })))
        .unwrap();
    drop(post);

    // When: A fresh load commits the stored draft
    let live = commit_from_fresh_load(&mut db, &post_id);

    // Then: The author is built from the snapshot payload
    assert_eq!(RecordRepo::count(db.connection(), "user").unwrap(), 1);
    let author = live.record().related_one("author").unwrap();
    assert_eq!(author.get("name"), Some(&json!("Steve")));
    assert_eq!(
        live.attribute("user_id"),
        Some(&json!(author.id().unwrap().as_str()))
    );
}

#[test]
fn test_stored_author_edit_updates_in_place_on_fresh_commit() {
    // Given: A post with a committed author
    let mut db = setup_db();
    let mut post = LiveOwner::create(
        &mut db,
        "post",
        &map(json!({ "title": "So Post", "author_attributes": { "name": "Steve" } })),
        None,
    )
    .unwrap();
    let post_id = post.record().id().cloned().unwrap();
    let author_id = post
        .record()
        .related_one("author")
        .and_then(|a| a.id().cloned())
        .unwrap();
    assert_eq!(RecordRepo::count(db.connection(), "user").unwrap(), 1);

    // When: A draft renames the author by id and a fresh load commits it
    post.current_draft(&mut db, false)
        .unwrap()
        .update(
            &mut db,
            &map(json!({ "author_attributes": { "id": author_id.as_str(), "name": "Steeve" } })),
        )
        .unwrap();
    let live = commit_from_fresh_load(&mut db, &post_id);

    // Then: The same user row is renamed; no user is added
    assert_eq!(RecordRepo::count(db.connection(), "user").unwrap(), 1);
    let author = live.record().related_one("author").unwrap();
    assert_eq!(author.id(), Some(&author_id));
    assert_eq!(author.get("name"), Some(&json!("Steeve")));
}

#[test]
fn test_stored_new_comments_are_created_on_fresh_commit() {
    let mut db = setup_db();
    let mut post = create_post(&mut db);
    let post_id = post.record().id().cloned().unwrap();
    post.current_draft(&mut db, false)
        .unwrap()
        .update(
            &mut db,
            &map(json!({
                "comments_attributes": [{ "body": "first" }, { "body": "second" }]
            })),
        )
        .unwrap();
    assert_eq!(RecordRepo::count(db.connection(), "comment").unwrap(), 0);

    let live = commit_from_fresh_load(&mut db, &post_id);

    assert_eq!(RecordRepo::count(db.connection(), "comment").unwrap(), 2);
    let bodies: Vec<_> = live
        .record()
        .related_many("comments")
        .iter()
        .map(|c| c.get("body").cloned().unwrap())
        .collect();
    assert_eq!(bodies, vec![json!("first"), json!("second")]);
}

#[test]
fn test_stored_destroy_mark_removes_comment_on_fresh_commit() {
    // Given: A post with two comments and a draft marking one for removal
    let mut db = setup_db();
    let mut post = LiveOwner::create(
        &mut db,
        "post",
        &map(json!({
            "title": "So Post",
            "comments_attributes": [{ "body": "keep" }, { "body": "spam" }]
        })),
        None,
    )
    .unwrap();
    let post_id = post.record().id().cloned().unwrap();
    let spam_id = post.record().related_many("comments")[1]
        .id()
        .cloned()
        .unwrap();
    let draft = post.current_draft(&mut db, false).unwrap();
    draft
        .update(
            &mut db,
            &map(json!({ "comments_attributes": [{ "id": spam_id.as_str(), "_destroy": true }] })),
        )
        .unwrap();

    // Then: The saved payload keeps the mark
    let stored = draft.snapshot(&db).unwrap();
    let marked = stored.object["comments_attributes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c.get("_destroy") == Some(&json!(true)))
        .count();
    assert_eq!(marked, 1);

    // When: A fresh load commits it
    let live = commit_from_fresh_load(&mut db, &post_id);

    // Then: Only the kept comment remains
    assert_eq!(RecordRepo::count(db.connection(), "comment").unwrap(), 1);
    let comments = live.record().related_many("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].get("body"), Some(&json!("keep")));
}
