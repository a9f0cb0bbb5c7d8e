//! Rigid and homogeneous transforms for clouds and normals

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

/// A homogeneous 4x4 transform applied as `y = T x`
///
/// Sensor poses usually arrive as a row-major 4x4 array; use
/// [`Transform3D::from_rows`] for those.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f32>,
}

impl Transform3D {
    pub fn identity() -> Self {
        Self::from(Matrix4::identity())
    }

    /// Pure translation by `offset`
    pub fn translation(offset: Vector3<f32>) -> Self {
        Self::from(Isometry3::from_parts(Translation3::from(offset), Default::default()))
    }

    /// Build from a row-major 4x4 array
    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self::from(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    /// The upper-left 3x3 block
    pub fn linear(&self) -> Matrix3<f32> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Map a point, dividing by the homogeneous coordinate
    ///
    /// A point sent to infinity (w = 0) is returned unchanged.
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::from_homogeneous(self.matrix * point.to_homogeneous()).unwrap_or(*point)
    }

    /// Apply the linear block only; translation is ignored
    pub fn transform_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.linear() * vector
    }

    /// Rotate a normal, renormalizing the result
    ///
    /// Translation does not affect normals. A normal mapped to zero length is
    /// returned unchanged.
    pub fn transform_normal(&self, normal: &Vector3<f32>) -> Vector3<f32> {
        self.transform_vector(normal)
            .try_normalize(f32::EPSILON)
            .unwrap_or(*normal)
    }

    /// `self` applied after `first`
    pub fn then_after(self, first: Self) -> Self {
        Self::from(self.matrix * first.matrix)
    }

    /// `None` when the matrix is singular
    pub fn inverse(self) -> Option<Self> {
        self.matrix.try_inverse().map(Self::from)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.then_after(rhs)
    }
}

impl From<Matrix4<f32>> for Transform3D {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }
}

impl From<Isometry3<f32>> for Transform3D {
    fn from(pose: Isometry3<f32>) -> Self {
        Self::from(pose.to_homogeneous())
    }
}
