//! # pointkit
//!
//! Surface normal estimation and voxel-grid downsampling for unordered 3D
//! point clouds.
//!
//! This is the umbrella crate that re-exports the workspace crates. Use the
//! individual crates for more granular control over dependencies.
//!
//! ## Quick Start
//!
//! ```rust
//! use pointkit::prelude::*;
//!
//! let cloud = PointCloud::from_points(vec![
//!     Point3f::new(0.0, 0.0, 0.0),
//!     Point3f::new(1.0, 0.0, 0.0),
//!     Point3f::new(0.0, 1.0, 0.0),
//!     Point3f::new(1.0, 1.0, 0.0),
//! ]);
//!
//! let normals = estimate_normals(&cloud, 4)?;
//! assert!(normals.iter().all(|n| n.z.abs() > 0.999));
//!
//! let downsampled = voxel_grid_filter(&cloud, 2.0)?;
//! assert_eq!(downsampled.points, vec![Point3f::new(0.5, 0.5, 0.0)]);
//! # Ok::<(), pointkit::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms and io
//! - `algorithms`: k-d tree, normal estimation and filtering
//! - `io`: PCD reading and writing
//! - `all`: Enables all features

// Re-export core functionality
pub use pointkit_core::*;

#[cfg(feature = "algorithms")]
pub use pointkit_algorithms as algorithms;

#[cfg(feature = "io")]
pub use pointkit_io as io;

/// Convenient imports for common use cases
pub mod prelude {
    pub use pointkit_core::*;

    #[cfg(feature = "algorithms")]
    pub use pointkit_algorithms::*;

    #[cfg(feature = "io")]
    pub use pointkit_io::{read_point_cloud, write_normal_cloud, write_point_cloud};
}
