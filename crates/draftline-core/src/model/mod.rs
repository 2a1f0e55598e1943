pub mod record;
pub mod snapshot;

pub use record::{Record, Related, ValidationError};
pub use snapshot::{CommitParams, Event, Snapshot, SnapshotFilter};

/// Ordered string-keyed attribute map (snapshot objects, record attributes)
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;
