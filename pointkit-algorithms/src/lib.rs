//! # pointkit Algorithms
//!
//! Geometric processing on point clouds.
//!
//! - [`KdTree`]: k-nearest and radius queries over a fixed set of points
//! - [`estimate_normals`] and friends: per-point normals by local plane fitting
//! - [`voxel_grid_filter`]: downsampling by averaging points per voxel
//! - point filters for non-finite values, axis ranges and boxes

pub mod filtering;
pub mod normals;
pub mod nearest_neighbor;

// Re-export commonly used items
pub use filtering::*;
pub use normals::*;
pub use nearest_neighbor::*;
