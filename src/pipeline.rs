//! Session pipeline
//!
//! Ties a session id to its current artifact and replaces that artifact on
//! each transformation. Collaborators are injected through the
//! [`SessionStore`](crate::session_management::SessionStore),
//! [`ArtifactStore`](crate::storage::ArtifactStore) and
//! [`ImageTransform`](crate::imaging::ImageTransform) traits.
//!
//! Re-exports:
//! - [`PipelineController`]: entry point for upload/transform/teardown.
//! - [`TransformOutcome`], [`ReapReport`]: results handed back to callers.

pub mod controller;
pub mod session_lock;

pub use controller::{PipelineController, ReapReport, TransformOutcome};
pub use session_lock::SessionLocks;
