//! `pointkit` command-line tool
//!
//! ```text
//! pointkit normals in.pcd out.pcd --k 10 [--viewpoint 0,0,5]
//! pointkit voxelize in.pcd out.pcd --voxel-size 0.05
//! pointkit info in.pcd
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pointkit_algorithms::{
    estimate_normals_with_config, voxel_grid_filter, NeighborhoodMode, NormalEstimationConfig,
};
use pointkit_core::{Bounded, Point3f, PointCloud};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pointkit", version, about = "Point cloud normal estimation and voxel downsampling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate one normal per point and write `x y z normal_x normal_y normal_z`
    Normals {
        input: PathBuf,
        output: PathBuf,
        /// Number of nearest neighbors per plane fit
        #[arg(long, default_value_t = 0)]
        k: i64,
        /// Neighborhood radius per plane fit
        #[arg(long, default_value_t = 0.0)]
        radius: f32,
        /// Flip normals towards this point, given as `x,y,z`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        viewpoint: Option<Point3f>,
    },
    /// Replace the points in each occupied voxel by their centroid
    Voxelize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        voxel_size: f32,
    },
    /// Print point count and bounds
    Info { input: PathBuf },
}

fn parse_point(s: &str) -> std::result::Result<Point3f, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("invalid coordinate '{}': {}", c, e)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match coords.as_slice() {
        [x, y, z] => Ok(Point3f::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z but got {} values", coords.len())),
    }
}

fn load(path: &PathBuf) -> Result<PointCloud<Point3f>> {
    pointkit_io::read_point_cloud(path).with_context(|| format!("failed to load {}", path.display()))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Normals { input, output, k, radius, viewpoint } => {
            let config = NormalEstimationConfig {
                mode: NeighborhoodMode::from_params(k, radius)?,
                viewpoint,
            };
            let cloud = load(&input)?;
            let start = Instant::now();
            let normals = estimate_normals_with_config(&cloud, &config)
                .with_context(|| format!("normal estimation failed for {}", input.display()))?;
            info!(points = cloud.len(), mode = ?config.mode, elapsed = ?start.elapsed(), "estimated normals");

            let Some(with_normals) = PointCloud::from_points_and_normals(&cloud.points, &normals) else {
                bail!("{} normals for {} points", normals.len(), cloud.len());
            };
            pointkit_io::write_normal_cloud(&with_normals, &output)
                .with_context(|| format!("failed to save {}", output.display()))?;
        }
        Command::Voxelize { input, output, voxel_size } => {
            let cloud = load(&input)?;
            let start = Instant::now();
            let downsampled = voxel_grid_filter(&cloud, voxel_size)?;
            info!(
                points_in = cloud.len(),
                points_out = downsampled.len(),
                voxel_size,
                elapsed = ?start.elapsed(),
                "downsampled"
            );
            pointkit_io::write_point_cloud(&downsampled, &output)
                .with_context(|| format!("failed to save {}", output.display()))?;
        }
        Command::Info { input } => {
            let cloud = load(&input)?;
            println!("points: {}", cloud.len());
            if !cloud.is_empty() {
                let (min, max) = cloud.bounding_box();
                let center = cloud.center();
                println!("min:    {} {} {}", min.x, min.y, min.z);
                println!("max:    {} {} {}", max.x, max.y, max.z);
                println!("center: {} {} {}", center.x, center.y, center.z);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse().command)
}
