//! Filtering algorithms

use std::collections::BTreeMap;

use pointkit_core::{is_finite_point, Error, Point3f, PointCloud, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Integer cell coordinates `floor(p / voxel_size)` per axis
type VoxelKey = (i64, i64, i64);

#[derive(Default, Clone, Copy)]
struct VoxelAccum {
    sum: [f64; 3],
    count: usize,
}

/// Voxel grid filtering
///
/// Reduces the density of a point cloud by grouping points into cubic voxels
/// of edge `voxel_size` and replacing every occupied voxel by the centroid of
/// its points. Voxels are aligned to the origin, so a cell is
/// `[i * s, (i + 1) * s)` along each axis.
///
/// The output holds one point per occupied voxel, ordered by ascending voxel
/// key `(x, y, z)`, and is therefore never larger than the input. Applying the
/// filter again with the same size returns the same cloud.
///
/// # Errors
/// * [`Error::InvalidConfig`] if `voxel_size` is not positive and finite
/// * [`Error::InvalidData`] if a point has a NaN or infinite coordinate
///
/// # Example
/// ```rust
/// use pointkit_core::{PointCloud, Point3f};
/// use pointkit_algorithms::voxel_grid_filter;
///
/// fn main() -> pointkit_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(1.0, 0.0, 0.0),
///         Point3f::new(0.0, 1.0, 0.0),
///         Point3f::new(1.0, 1.0, 0.0),
///     ]);
///
///     let filtered = voxel_grid_filter(&cloud, 2.0)?;
///     assert_eq!(filtered.len(), 1);
///     assert_eq!(filtered[0], Point3f::new(0.5, 0.5, 0.0));
///     Ok(())
/// }
/// ```
pub fn voxel_grid_filter(cloud: &PointCloud<Point3f>, voxel_size: f32) -> Result<PointCloud<Point3f>> {
    if !(voxel_size.is_finite() && voxel_size > 0.0) {
        return Err(Error::invalid_config(format!(
            "voxel_size must be positive and finite, got {}",
            voxel_size
        )));
    }

    if cloud.is_empty() {
        return Ok(PointCloud::new());
    }

    let size = voxel_size as f64;
    let keys: Vec<VoxelKey> = cloud
        .points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            if !is_finite_point(p) {
                return Err(Error::invalid_data(format!(
                    "point {} has a non-finite coordinate",
                    i
                )));
            }
            match (voxel_index(p.x, size), voxel_index(p.y, size), voxel_index(p.z, size)) {
                (Some(x), Some(y), Some(z)) => Ok((x, y, z)),
                _ => Err(Error::invalid_config(format!(
                    "voxel_size {} is too small for point {} at {:?}",
                    voxel_size, i, p
                ))),
            }
        })
        .collect::<Result<_>>()?;

    let mut voxels: BTreeMap<VoxelKey, VoxelAccum> = BTreeMap::new();
    for (key, p) in keys.into_iter().zip(&cloud.points) {
        let entry = voxels.entry(key).or_default();
        entry.sum[0] += p.x as f64;
        entry.sum[1] += p.y as f64;
        entry.sum[2] += p.z as f64;
        entry.count += 1;
    }

    let filtered: PointCloud<Point3f> = voxels
        .values()
        .map(|acc| {
            let n = acc.count as f64;
            Point3f::new(
                (acc.sum[0] / n) as f32,
                (acc.sum[1] / n) as f32,
                (acc.sum[2] / n) as f32,
            )
        })
        .collect();

    debug!(
        input = cloud.len(),
        output = filtered.len(),
        voxel_size,
        "voxel grid filter"
    );
    Ok(filtered)
}

/// `None` when the cell index does not fit in an `i64`
fn voxel_index(coord: f32, size: f64) -> Option<i64> {
    let cell = (coord as f64 / size).floor();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    (cell >= i64::MIN as f64 && cell < i64::MAX as f64).then_some(cell as i64)
}

/// Coordinate axis selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Inclusive axis aligned region used by [`crop_box_filter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub min: Point3f,
    pub max: Point3f,
}

impl Workspace {
    pub fn new(min: Point3f, max: Point3f) -> Result<Self> {
        if (0..3).any(|a| !(min[a] <= max[a])) {
            return Err(Error::invalid_config(format!(
                "workspace min {:?} exceeds max {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, p: &Point3f) -> bool {
        (0..3).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }
}

/// Drop every point with a NaN or infinite coordinate
pub fn remove_non_finite(cloud: &PointCloud<Point3f>) -> PointCloud<Point3f> {
    cloud.iter().copied().filter(is_finite_point).collect()
}

/// Keep points whose coordinate along `axis` lies in `[min, max]`
///
/// Returns the kept points and their indices in the input, so that values
/// stored alongside the cloud (normals, for instance) can be filtered with
/// [`select_by_indices`].
pub fn passthrough_filter(
    cloud: &PointCloud<Point3f>,
    axis: Axis,
    min: f32,
    max: f32,
) -> Result<(PointCloud<Point3f>, Vec<usize>)> {
    if !(min <= max) {
        return Err(Error::invalid_config(format!(
            "passthrough range [{}, {}] is empty",
            min, max
        )));
    }
    let a = axis.index();
    Ok(keep_where(cloud, |p| p[a] >= min && p[a] <= max))
}

/// Keep points inside `workspace`, bounds included
pub fn crop_box_filter(
    cloud: &PointCloud<Point3f>,
    workspace: &Workspace,
) -> (PointCloud<Point3f>, Vec<usize>) {
    keep_where(cloud, |p| workspace.contains(p))
}

/// Pick `items[i]` for every `i` in `indices`
pub fn select_by_indices<T: Copy>(items: &[T], indices: &[usize]) -> Result<Vec<T>> {
    indices
        .iter()
        .map(|&i| {
            items.get(i).copied().ok_or_else(|| {
                Error::invalid_data(format!("index {} out of range for {} items", i, items.len()))
            })
        })
        .collect()
}

fn keep_where<F>(cloud: &PointCloud<Point3f>, keep: F) -> (PointCloud<Point3f>, Vec<usize>)
where
    F: Fn(&Point3f) -> bool,
{
    let indices: Vec<usize> = cloud
        .iter()
        .enumerate()
        .filter(|(_, p)| keep(*p))
        .map(|(i, _)| i)
        .collect();
    (cloud.select(&indices), indices)
}
