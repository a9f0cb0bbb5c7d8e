//! Core data structures and traits for pointkit
//! 
//! This crate provides the fundamental types shared by the pointkit crates:
//! points, normals, point clouds, the nearest neighbor search trait, rigid
//! transforms and the flat `f32` buffer boundary used to exchange clouds with
//! callers that only speak `[x0, y0, z0, x1, ...]`.

pub mod point;
pub mod point_cloud;
pub mod traits;
pub mod transform;
pub mod flat;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use traits::*;
pub use transform::*;
pub use flat::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4, Isometry3, UnitQuaternion};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Normal = Normal3f;
