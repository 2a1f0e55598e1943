//! draftline engine - orchestration layer
//!
//! Coordinates the in-memory domain (`draftline-core`) with the SQLite
//! persistence layer (`draftline-store`):
//!
//! - `LiveOwner`: a persisted record with its snapshot history and cached draft
//! - `DraftProxy`: a reified copy of the owner whose writes land in the draft
//!   snapshot until `commit`
//! - `VersionManager`: restore-as-draft and compatibility diagnostics
//! - `Versionable`: the capability surface shared by the live owner and its
//!   draft proxy

pub mod draft_proxy;
pub mod live_owner;
pub mod reify;
pub mod version_manager;
pub mod versionable;

pub use draft_proxy::DraftProxy;
pub use live_owner::LiveOwner;
pub use reify::reify;
pub use version_manager::VersionManager;
pub use versionable::Versionable;
