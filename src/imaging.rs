//! Image transform capability
//!
//! Turns the bytes of one artifact into the bytes of the next one. The
//! pipeline only sees the [`ImageTransform`] trait; [`ImagingTransform`] is
//! the `image`-crate implementation wired in by the controller.
//!
//! Components:
//! - `operation`: validated operations (`blur`, `sharpen`) built from a name and raw parameters.
//! - `transform`: the `ImageTransform` trait and its `image`-backed implementation.

pub mod operation;
pub mod transform;

pub use operation::{Operation, Parameters};
pub use transform::{ImageTransform, ImagingTransform};
