//! Normal estimation algorithms
//!
//! Normals are fitted per point from a local neighborhood: the eigenvector of
//! the smallest eigenvalue of the neighborhood covariance is the direction of
//! least variance, which approximates the surface normal.
//!
//! The sign of each normal is whatever the eigen solver produces. Plane
//! fitting on unordered points cannot tell the two sides of a surface apart,
//! so neighboring normals may point in opposite directions. Callers that need a
//! consistent side must say which one, using
//! [`orient_normals_towards_viewpoint`] or
//! [`orient_normals_towards_viewpoints`].

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use pointkit_core::{Error, NearestNeighborSearch, Normal3f, Point3f, PointCloud, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::nearest_neighbor::KdTree;

/// Smallest neighborhood a plane can be fitted to
pub const MIN_NEIGHBORS: usize = 3;

/// Middle-to-largest eigenvalue ratio at or below which a neighborhood is a line
const COLLINEAR_RATIO: f64 = 1e-12;

/// How the neighborhood of each point is gathered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NeighborhoodMode {
    /// The `k` nearest points, including the point itself
    FixedK(usize),
    /// Every point within this distance, including the point itself
    FixedRadius(f32),
}

impl NeighborhoodMode {
    /// Pick the mode from a `(k, radius)` pair where exactly one is positive
    ///
    /// Passing both or neither is an [`Error::InvalidConfig`].
    pub fn from_params(k: i64, radius: f32) -> Result<Self> {
        let use_k = k > 0;
        let use_radius = radius > 0.0;
        let mode = match (use_k, use_radius) {
            (true, false) => NeighborhoodMode::FixedK(k as usize),
            (false, true) => NeighborhoodMode::FixedRadius(radius),
            (true, true) => {
                return Err(Error::invalid_config(format!(
                    "k ({}) and radius ({}) are mutually exclusive",
                    k, radius
                )))
            }
            (false, false) => {
                return Err(Error::invalid_config(format!(
                    "one of k ({}) or radius ({}) must be positive",
                    k, radius
                )))
            }
        };
        mode.validate()?;
        Ok(mode)
    }

    /// Check the parameter carried by the mode
    pub fn validate(&self) -> Result<()> {
        match *self {
            NeighborhoodMode::FixedK(0) => {
                Err(Error::invalid_config("k must be greater than 0"))
            }
            NeighborhoodMode::FixedRadius(r) if !(r.is_finite() && r > 0.0) => {
                Err(Error::invalid_config(format!("radius must be positive and finite, got {}", r)))
            }
            _ => Ok(()),
        }
    }

    fn neighbors<S: NearestNeighborSearch>(&self, index: &S, query: &Point3f) -> Vec<usize> {
        let found = match *self {
            NeighborhoodMode::FixedK(k) => index.find_k_nearest(query, k),
            NeighborhoodMode::FixedRadius(r) => index.find_radius_neighbors(query, r),
        };
        found.into_iter().map(|(i, _)| i).collect()
    }
}

/// Configuration for normal estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalEstimationConfig {
    /// Neighborhood used for each plane fit
    pub mode: NeighborhoodMode,
    /// When set, every normal is flipped to face this point
    pub viewpoint: Option<Point3f>,
}

impl Default for NormalEstimationConfig {
    fn default() -> Self {
        Self {
            mode: NeighborhoodMode::FixedK(10),
            viewpoint: None,
        }
    }
}

/// Estimate normals using the `k` nearest neighbors of each point
pub fn estimate_normals(cloud: &PointCloud<Point3f>, k: usize) -> Result<Vec<Normal3f>> {
    estimate_normals_with_config(
        cloud,
        &NormalEstimationConfig {
            mode: NeighborhoodMode::FixedK(k),
            viewpoint: None,
        },
    )
}

/// Estimate normals using every neighbor within `radius` of each point
pub fn estimate_normals_radius(cloud: &PointCloud<Point3f>, radius: f32) -> Result<Vec<Normal3f>> {
    estimate_normals_with_config(
        cloud,
        &NormalEstimationConfig {
            mode: NeighborhoodMode::FixedRadius(radius),
            viewpoint: None,
        },
    )
}

/// Estimate normals, building the spatial index internally
pub fn estimate_normals_with_config(
    cloud: &PointCloud<Point3f>,
    config: &NormalEstimationConfig,
) -> Result<Vec<Normal3f>> {
    config.mode.validate()?;
    let index = KdTree::from_cloud(cloud)?;
    let mut normals = estimate_normals_with_index(cloud, &index, config.mode)?;
    if let Some(viewpoint) = config.viewpoint {
        orient_normals_towards_viewpoint(cloud, &mut normals, &viewpoint)?;
    }
    Ok(normals)
}

/// Estimate one unit normal per point using a prebuilt index
///
/// `index` must have been built from `cloud`. The result has exactly
/// `cloud.len()` entries, normal `i` belonging to point `i`. Points are
/// processed in parallel; if any point has fewer than [`MIN_NEIGHBORS`]
/// neighbors, or its neighbors coincide or are collinear, the whole call fails with
/// [`Error::DegenerateNeighborhood`] and no normals are returned.
///
/// Normals are not oriented, see the module documentation.
pub fn estimate_normals_with_index<S>(
    cloud: &PointCloud<Point3f>,
    index: &S,
    mode: NeighborhoodMode,
) -> Result<Vec<Normal3f>>
where
    S: NearestNeighborSearch + Sync,
{
    mode.validate()?;

    let normals = cloud
        .points
        .par_iter()
        .enumerate()
        .map(|(i, point)| {
            let neighbors = mode.neighbors(index, point);
            if neighbors.len() < MIN_NEIGHBORS {
                return Err(Error::DegenerateNeighborhood {
                    index: i,
                    neighbors: neighbors.len(),
                });
            }
            fit_plane_normal(&cloud.points, &neighbors)?.ok_or(Error::DegenerateNeighborhood {
                index: i,
                neighbors: neighbors.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(points = cloud.len(), ?mode, "estimated normals");
    Ok(normals)
}

/// Fit a plane to the selected points and return its unit normal
///
/// Returns `Ok(None)` when the points coincide or lie on one line, so no
/// plane is defined.
fn fit_plane_normal(points: &[Point3f], neighbors: &[usize]) -> Result<Option<Normal3f>> {
    let mut selected = Vec::with_capacity(neighbors.len());
    for &i in neighbors {
        let p = points.get(i).ok_or_else(|| {
            Error::invalid_data(format!(
                "neighbor index {} out of range for a cloud of {} points",
                i,
                points.len()
            ))
        })?;
        selected.push(Vector3::new(p.x as f64, p.y as f64, p.z as f64));
    }

    let count = selected.len() as f64;
    let centroid: Vector3<f64> = selected.iter().sum::<Vector3<f64>>() / count;

    let mut covariance = Matrix3::<f64>::zeros();
    for p in &selected {
        let diff = p - centroid;
        covariance += diff * diff.transpose();
    }
    covariance /= count;

    // Spread below the rounding noise of the coordinates themselves means the
    // points coincide; scaled by magnitude so tiny but distinct patches pass
    let magnitude_sq = selected.iter().map(|p| p.norm_squared()).fold(0.0, f64::max);
    let noise = f64::EPSILON * f64::EPSILON * magnitude_sq;
    if !(covariance.trace() > noise) {
        return Ok(None);
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut values = [eigen.eigenvalues[0], eigen.eigenvalues[1], eigen.eigenvalues[2]];
    values.sort_by(f64::total_cmp);

    // A line has a single direction of spread and no unique normal
    if !(values[1] > COLLINEAR_RATIO * values[2]) {
        return Ok(None);
    }

    let smallest = eigen.eigenvalues.imin();
    let normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();

    Ok(normal
        .try_normalize(f64::EPSILON)
        .map(|n| n.cast::<f32>().normalize()))
}

/// Flip normals so each one faces `viewpoint`
///
/// A normal is flipped when it points away from the viewpoint, that is when
/// `dot(n, viewpoint - p) < 0`.
pub fn orient_normals_towards_viewpoint(
    cloud: &PointCloud<Point3f>,
    normals: &mut [Normal3f],
    viewpoint: &Point3f,
) -> Result<()> {
    if cloud.len() != normals.len() {
        return Err(Error::invalid_data(format!(
            "{} normals for {} points",
            normals.len(),
            cloud.len()
        )));
    }
    orient(cloud, normals, |_| viewpoint)
}

/// Flip normals so normal `i` faces `viewpoints[i]`
///
/// Use this when each point was observed from its own sensor position.
pub fn orient_normals_towards_viewpoints(
    cloud: &PointCloud<Point3f>,
    normals: &mut [Normal3f],
    viewpoints: &[Point3f],
) -> Result<()> {
    if cloud.len() != normals.len() || cloud.len() != viewpoints.len() {
        return Err(Error::invalid_data(format!(
            "{} normals and {} viewpoints for {} points",
            normals.len(),
            viewpoints.len(),
            cloud.len()
        )));
    }
    orient(cloud, normals, |i| &viewpoints[i])
}

fn orient<'a, F>(cloud: &PointCloud<Point3f>, normals: &mut [Normal3f], viewpoint_of: F) -> Result<()>
where
    F: Fn(usize) -> &'a Point3f + Sync,
{
    // Check every viewpoint before touching any normal
    cloud.points.par_iter().enumerate().try_for_each(|(i, point)| {
        let to_view = viewpoint_of(i) - point;
        if to_view.norm_squared() == 0.0 || !to_view.iter().all(|v| v.is_finite()) {
            return Err(Error::invalid_data(format!(
                "viewpoint for point {} coincides with the point or is not finite",
                i
            )));
        }
        Ok(())
    })?;

    normals
        .par_iter_mut()
        .zip(cloud.points.par_iter())
        .enumerate()
        .for_each(|(i, (normal, point))| {
            if normal.dot(&(viewpoint_of(i) - point)) < 0.0 {
                *normal = -*normal;
            }
        });
    Ok(())
}
