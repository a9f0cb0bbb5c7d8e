//! File round trips through the public load/save functions

use pointkit_core::{Error, Normal3f, Point3f, PointCloud};
use pointkit_io::{
    read_point_cloud, write_normal_cloud, write_point_cloud, PcdDataFormat, PcdReader, PcdWriteOptions, PcdWriter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::tempdir;

fn random_cloud(n: usize, seed: u64) -> PointCloud<Point3f> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Point3f::new(
                rng.gen_range(-1000.0..1000.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1e-3..1e-3),
            )
        })
        .collect()
}

#[test]
fn ascii_round_trip_is_exact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cloud.pcd");
    let cloud = random_cloud(500, 7);

    write_point_cloud(&cloud, &path).unwrap();
    let loaded = read_point_cloud(&path).unwrap();

    assert_eq!(loaded, cloud);
}

#[test]
fn saved_file_has_minimal_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("square.pcd");
    let cloud = PointCloud::from_points(vec![
        Point3f::new(0.0, 0.0, 0.0),
        Point3f::new(1.0, 0.0, 0.0),
        Point3f::new(0.0, 1.0, 0.0),
        Point3f::new(1.0, 1.0, 0.0),
    ]);

    write_point_cloud(&cloud, &path).unwrap();
    let text = fs::read_to_string(&path).unwrap();

    assert!(text.contains("VERSION 0.7\n"));
    assert!(text.contains("FIELDS x y z\n"));
    assert!(text.contains("WIDTH 4\nHEIGHT 1\n"));
    assert!(text.contains("POINTS 4\nDATA ascii\n0 0 0\n1 0 0\n0 1 0\n1 1 0\n"));
}

#[test]
fn empty_cloud_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.pcd");
    let cloud = PointCloud::<Point3f>::new();

    write_point_cloud(&cloud, &path).unwrap();
    assert!(read_point_cloud(&path).unwrap().is_empty());
}

#[test]
fn binary_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("binary.pcd");
    let cloud = random_cloud(100, 11);
    let options = PcdWriteOptions {
        data_format: PcdDataFormat::Binary,
        viewpoint: Some([1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0]),
        ..Default::default()
    };

    PcdWriter::write_with_options(&cloud, &path, &options).unwrap();
    let data = PcdReader::read_pcd_file(&path).unwrap();

    assert_eq!(data.header.data_format, PcdDataFormat::Binary);
    assert_eq!(data.header.viewpoint, [1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0]);
    assert_eq!(data.cloud, cloud);
}

#[test]
fn organized_cloud_keeps_grid_shape() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("organized.pcd");
    let cloud = random_cloud(6, 3);

    PcdWriter::write_organized(&cloud, &path, 2, 3).unwrap();
    let data = PcdReader::read_pcd_file(&path).unwrap();

    assert_eq!(data.header.height, 2);
    assert_eq!(data.header.width, 3);
    assert!(data.header.is_organized());
    assert_eq!(data.cloud, cloud);

    let err = PcdWriter::write_organized(&cloud, dir.path().join("bad.pcd"), 4, 2).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn normals_are_written_next_to_points() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("normals.pcd");
    let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.5, -2.0)];
    let normals = vec![Normal3f::new(0.0, 0.0, 1.0), Normal3f::new(0.6, 0.0, -0.8)];
    let cloud = PointCloud::from_points_and_normals(&points, &normals).unwrap();

    write_normal_cloud(&cloud, &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("FIELDS x y z normal_x normal_y normal_z\n"));

    let loaded = PcdReader::read_normal_cloud(&path).unwrap();
    assert_eq!(loaded, cloud);

    // Plain loading drops the normal fields.
    assert_eq!(read_point_cloud(&path).unwrap().points, points);
}

#[test]
fn malformed_file_fails_with_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.pcd");
    fs::write(&path, "FIELDS x y z\nPOINTS 2\nDATA ascii\n1 2 3\n").unwrap();

    match read_point_cloud(&path) {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn read_normal_cloud_requires_normal_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.pcd");
    write_point_cloud(&random_cloud(3, 1), &path).unwrap();

    assert!(PcdReader::read_normal_cloud(&path).is_err());
}
