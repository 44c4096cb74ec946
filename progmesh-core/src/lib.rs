//! Core data structures and traits for progmesh
//!
//! This crate provides the fundamental types shared by the progmesh crates:
//! point and vector aliases, the indexed triangle mesh, error types and the
//! bounding traits used to derive scale-relative tolerances.

pub mod point;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
