//! I/O operations for point clouds
//!
//! This crate reads and writes PCD files: ASCII and binary data sections
//! on read, ASCII (default) or binary on write. Points with normals are
//! written with `normal_x normal_y normal_z` fields next to `x y z`.

pub mod error;
pub mod pcd;

pub use error::*;
pub use pcd::{PcdData, PcdDataFormat, PcdField, PcdFieldType, PcdHeader, PcdReader, PcdWriteOptions, PcdWriter};

use pointkit_core::{NormalPoint3f, Point3f, PointCloud, Result};
use std::path::Path;

/// Trait for reading point clouds from files
pub trait PointCloudReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>>;
}

/// Trait for writing point clouds to files
pub trait PointCloudWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()>;
}

fn check_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pcd") => Ok(()),
        _ => Err(pointkit_core::Error::UnsupportedFormat(format!(
            "Unsupported point cloud format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and read point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    let path = path.as_ref();
    check_extension(path)?;
    PcdReader::read_point_cloud(path)
}

/// Auto-detect format and write point cloud
///
/// PCD output is ASCII with `FIELDS x y z`; reading the file back yields
/// exactly the same points.
pub fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    check_extension(path)?;
    PcdWriter::write_point_cloud(cloud, path)
}

/// Write points together with their normals as ASCII PCD
pub fn write_normal_cloud<P: AsRef<Path>>(cloud: &PointCloud<NormalPoint3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    check_extension(path)?;
    PcdWriter::write_normal_cloud(cloud, path, &PcdWriteOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointkit_core::Error;

    #[test]
    fn test_unsupported_format() {
        let cloud = PointCloud::from_points(vec![Point3f::origin()]);
        assert!(matches!(read_point_cloud("cloud.ply"), Err(Error::UnsupportedFormat(_))));
        assert!(matches!(write_point_cloud(&cloud, "cloud"), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_is_io_not_found() {
        match read_point_cloud("/no/such/dir/cloud.pcd") {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
