//! Artifact storage
//!
//! Holds the image bytes each session points at. Artifacts are immutable
//! once written; a transform always produces a new one.
//!
//! Components:
//! - `storage_trait`: the `ArtifactStore` trait the pipeline depends on.
//! - `file_storage`: filesystem-backed implementation.

pub mod file_storage;
pub mod storage_trait;

pub use file_storage::FileArtifactStore;
pub use storage_trait::ArtifactStore;
