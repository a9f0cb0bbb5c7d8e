//! The `PointCloud` container

use crate::point::*;
use crate::transform::Transform3D;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// An ordered list of points
///
/// The cloud owns its points exclusively. Order is significant: algorithms
/// that produce one value per point (normal estimation) return them in the
/// same order as `points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// Positions only
pub type PointCloud3f = PointCloud<Point3f>;

/// Positions paired with unit normals
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Wrap `points` without copying
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points.iter_mut()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Borrow the points as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.points
    }
}

impl<T: Clone> PointCloud<T> {
    /// Build a new cloud holding the points at `indices`, in that order.
    ///
    /// Indices past the end are skipped.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices
                .iter()
                .filter_map(|&i| self.points.get(i).cloned())
                .collect(),
        }
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IndexMut<usize> for PointCloud<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

impl PointCloud<Point3f> {
    /// Map every point through `transform` in place
    pub fn transform(&mut self, transform: &Transform3D) {
        self.points
            .iter_mut()
            .for_each(|p| *p = transform.transform_point(p));
    }
}

impl PointCloud<NormalPoint3f> {
    /// Pair every point with the normal at the same index
    ///
    /// Returns `None` when the lengths differ.
    pub fn from_points_and_normals(points: &[Point3f], normals: &[Normal3f]) -> Option<Self> {
        if points.len() != normals.len() {
            return None;
        }
        Some(
            points
                .iter()
                .zip(normals)
                .map(|(p, n)| NormalPoint3f::new(*p, *n))
                .collect(),
        )
    }

    /// Rotate positions and normals; normals only see the linear part
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in self.points.iter_mut() {
            point.position = transform.transform_point(&point.position);
            point.normal = transform.transform_normal(&point.normal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_select_keeps_requested_order() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ]);
        let picked = cloud.select(&[2, 0, 9]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0], Point3f::new(2.0, 0.0, 0.0));
        assert_eq!(picked[1], Point3f::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_translate_cloud() {
        let mut cloud = PointCloud::from_points(vec![Point3f::new(1.0, 2.0, 3.0)]);
        cloud.transform(&Transform3D::translation(Vector3::new(1.0, 1.0, 1.0)));
        assert_eq!(cloud[0], Point3f::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_points_and_normals_length_mismatch() {
        let points = vec![Point3f::origin(); 2];
        let normals = vec![Normal3f::z(); 3];
        assert!(PointCloud::from_points_and_normals(&points, &normals).is_none());
    }

    #[test]
    fn test_translation_leaves_normals_alone() {
        let mut cloud = PointCloud::from_points_and_normals(
            &[Point3f::origin()],
            &[Normal3f::z()],
        )
        .unwrap();
        cloud.transform(&Transform3D::translation(Vector3::new(5.0, 0.0, 0.0)));
        assert_eq!(cloud[0].position, Point3f::new(5.0, 0.0, 0.0));
        assert_eq!(cloud[0].normal, Normal3f::z());
    }
}
