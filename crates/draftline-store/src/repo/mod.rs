//! Repository layer: snapshot rows and domain record rows

pub mod record_repo;
pub mod snapshot_repo;

pub use record_repo::RecordRepo;
pub use snapshot_repo::SnapshotRepo;
