//! Core traits for pointkit

use crate::{point::*, point_cloud::*};

/// k-nearest and radius queries over an indexed point set
///
/// Results are `(index, euclidean_distance)` pairs where `index` refers to the
/// position of the point in the slice the searcher was built from.
pub trait NearestNeighborSearch {
    /// The `k` points closest to `query`
    ///
    /// Returns `min(k, n)` results ordered by ascending distance.
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Every point with `distance <= radius`
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Axis aligned extent of a set of points
pub trait Bounded {
    /// `(min, max)` corners; both are the origin for an empty set
    fn bounding_box(&self) -> (Point3f, Point3f);

    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }
}

impl<T> Bounded for PointCloud<T>
where
    T: Copy,
    Point3f: From<T>,
{
    fn bounding_box(&self) -> (Point3f, Point3f) {
        let mut positions = self.points.iter().map(|&p| Point3f::from(p));
        let Some(first) = positions.next() else {
            return (Point3f::origin(), Point3f::origin());
        };
        positions.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)))
    }
}
