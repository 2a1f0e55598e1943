use chrono::{DateTime, Utc};
use draftline_core_types::{OwnerKey, SnapshotId};
use serde::{Deserialize, Serialize};

use super::AttributeMap;
use crate::errors::DraftlineError;

/// Lifecycle event recorded on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Create,
    Draft,
    Commit,
}

impl Event {
    pub const ALL: [Event; 3] = [Event::Create, Event::Draft, Event::Commit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Create => "create",
            Event::Draft => "draft",
            Event::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Event {
    type Err = DraftlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| DraftlineError::InvalidEvent {
                value: s.to_string(),
            })
    }
}

/// Which part of an owner's history to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFilter {
    #[default]
    All,
    /// `draft = true`
    Draft,
    /// `draft = false`
    Committed,
}

/// Caller overrides applied last when a draft is committed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitParams {
    pub commit_message: Option<String>,
    pub committer: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl CommitParams {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            commit_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One historical or in-progress state of an owner
///
/// `object` keys are not checked against the owner's current schema; old
/// snapshots may reference attributes that no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub owner: OwnerKey,
    pub event: Event,
    pub committer: Option<String>,
    pub object: AttributeMap,
    pub draft: bool,
    pub commit_message: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    fn build(owner: OwnerKey, event: Event, committer: Option<String>, object: AttributeMap) -> Self {
        let now = Utc::now();
        Self {
            id: SnapshotId::new(),
            owner,
            event,
            committer,
            object,
            draft: false,
            commit_message: None,
            committed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot written when an owner is first persisted
    pub fn new_create(owner: OwnerKey, committer: Option<String>, object: AttributeMap) -> Self {
        let mut snapshot = Self::build(owner, Event::Create, committer, object);
        snapshot.committed_at = Some(snapshot.created_at);
        snapshot
    }

    pub fn new_draft(owner: OwnerKey, committer: Option<String>, object: AttributeMap) -> Self {
        let mut snapshot = Self::build(owner, Event::Draft, committer, object);
        snapshot.draft = true;
        snapshot
    }

    pub fn is_draft(&self) -> bool {
        self.draft
    }

    pub fn is_committed(&self) -> bool {
        !self.draft
    }

    /// Finalize a draft in memory: store `object`, flip to a commit stamped
    /// now, then apply caller overrides
    pub fn apply_commit(&mut self, object: AttributeMap, params: &CommitParams) {
        let now = Utc::now();
        self.object = object;
        self.draft = false;
        self.event = Event::Commit;
        self.committed_at = Some(now);
        self.updated_at = now;

        if let Some(message) = &params.commit_message {
            self.commit_message = Some(message.clone());
        }
        if let Some(committer) = &params.committer {
            self.committer = Some(committer.clone());
        }
        if let Some(at) = params.committed_at {
            self.committed_at = Some(at);
        }
    }

    /// Human label: owner display and `#YYYYMMDDHHMMSS` of the commit time,
    /// space separated, blank parts left out
    pub fn to_s(&self, owner_display: &str) -> String {
        let stamp = self
            .committed_at
            .map(|at| at.format("#%Y%m%d%H%M%S").to_string());
        [Some(owner_display.to_string()), stamp]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
