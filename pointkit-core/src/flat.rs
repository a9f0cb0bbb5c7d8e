//! Flat `f32` buffer boundary
//!
//! Callers outside Rust usually hold a cloud as one contiguous
//! `[x0, y0, z0, x1, y1, z1, ...]` array. This module is the only place that
//! converts between that layout and [`PointCloud`]. Going in, the caller's
//! slice is copied into an owned cloud. Going out, results are copied once into
//! a [`FlatBuffer`], an opaque owned allocation that the caller copies into its
//! own storage and then hands back through [`FlatBuffer::release`].

use crate::error::{Error, Result};
use crate::point::{Normal3f, Point3f};
use crate::point_cloud::PointCloud;

impl PointCloud<Point3f> {
    /// Build a cloud from a flat coordinate buffer of length `3 * n`
    pub fn from_flat(buffer: &[f32]) -> Result<Self> {
        let triples: &[[f32; 3]] = bytemuck::try_cast_slice(buffer).map_err(|_| {
            Error::invalid_data(format!(
                "flat buffer length {} is not a multiple of 3",
                buffer.len()
            ))
        })?;
        Ok(triples.iter().map(|&xyz| Point3f::from(xyz)).collect())
    }

    /// Copy the cloud out into a fresh [`FlatBuffer`]
    pub fn to_flat(&self) -> FlatBuffer {
        FlatBuffer::from_points(&self.points)
    }
}

/// Owned `3 * n` coordinate buffer handed across the boundary
///
/// The internal storage is never exposed mutably and never aliases the cloud it
/// was produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBuffer {
    data: Box<[f32]>,
}

impl FlatBuffer {
    /// Copy points into a new buffer
    pub fn from_points(points: &[Point3f]) -> Self {
        let data: &[f32] = bytemuck::cast_slice(points);
        Self { data: data.into() }
    }

    /// Copy normals into a new buffer
    pub fn from_normals(normals: &[Normal3f]) -> Self {
        let data: &[f32] = bytemuck::cast_slice(normals);
        Self { data: data.into() }
    }

    /// Number of `(x, y, z)` triples held
    pub fn len_points(&self) -> usize {
        self.data.len() / 3
    }

    /// Number of `f32` values held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the raw coordinates
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copy the coordinates into caller-owned storage
    ///
    /// `out` must have exactly [`FlatBuffer::len`] elements.
    pub fn copy_into(&self, out: &mut [f32]) -> Result<()> {
        if out.len() != self.data.len() {
            return Err(Error::invalid_data(format!(
                "output buffer holds {} values, expected {}",
                out.len(),
                self.data.len()
            )));
        }
        out.copy_from_slice(&self.data);
        Ok(())
    }

    /// Give the buffer back; the allocation is freed here
    pub fn release(self) {
        drop(self);
    }

    /// Convert back into a point cloud without going through a caller buffer
    pub fn into_point_cloud(self) -> PointCloud<Point3f> {
        let triples: &[[f32; 3]] = bytemuck::cast_slice(&self.data);
        triples.iter().map(|&xyz| Point3f::from(xyz)).collect()
    }
}

/// Copy `buffer` into `out` and release it in one step
///
/// The buffer is released even when the copy fails.
pub fn copy_and_release(buffer: FlatBuffer, out: &mut [f32]) -> Result<()> {
    let copied = buffer.copy_into(out);
    buffer.release();
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_builds_points_in_order() {
        let cloud = PointCloud::from_flat(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud[0], Point3f::new(0.0, 1.0, 2.0));
        assert_eq!(cloud[1], Point3f::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_from_flat_rejects_partial_triple() {
        let result = PointCloud::from_flat(&[0.0, 1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_from_flat_empty() {
        let cloud = PointCloud::from_flat(&[]).unwrap();
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_copy_and_release() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(1.0, 2.0, 3.0),
            Point3f::new(-1.0, -2.0, -3.0),
        ]);
        let buffer = cloud.to_flat();
        assert_eq!(buffer.len_points(), 2);

        let mut out = vec![0.0f32; 6];
        copy_and_release(buffer, &mut out).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_copy_into_wrong_size() {
        let buffer = FlatBuffer::from_normals(&[Normal3f::z()]);
        let mut out = vec![0.0f32; 4];
        assert!(buffer.copy_into(&mut out).is_err());
        assert_eq!(buffer.as_slice(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_buffer_does_not_alias_cloud() {
        let mut cloud = PointCloud::from_points(vec![Point3f::new(1.0, 1.0, 1.0)]);
        let buffer = cloud.to_flat();
        cloud[0] = Point3f::new(9.0, 9.0, 9.0);
        assert_eq!(buffer.into_point_cloud()[0], Point3f::new(1.0, 1.0, 1.0));
    }
}
