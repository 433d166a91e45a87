//! Optical bar camera tool
//!
//! Inspect, project with, and re-pose optical bar camera files.
//!
//! Usage:
//! ```bash
//! optical-bar info samples/optical_bar.tsai
//! optical-bar pixel-to-ray samples/optical_bar.tsai 120 40
//! optical-bar point-to-pixel samples/optical_bar.tsai 7000000 1000 500000
//! optical-bar --config samples/projection.yaml check samples/optical_bar.tsai
//! optical-bar transform samples/optical_bar.tsai moved.tsai --translation 10 0 0
//! optical-bar batch samples/optical_bar.tsai pixels.csv rays.csv
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{error, info, warn};
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use optical_bar::camera::{CameraModel, OpticalBarModel};
use optical_bar::config::ProjectionConfig;
use optical_bar::optimization::LevenbergMarquardt;
use optical_bar::util::{self, ProjectionError};

/// Optical bar camera tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML file selecting corrections and solver settings
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug messages
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the camera parameters
    Info { camera: PathBuf },

    /// Camera center and ray observed by a pixel
    #[command(allow_negative_numbers = true)]
    PixelToRay { camera: PathBuf, x: f64, y: f64 },

    /// Pixel observing a 3D point
    #[command(allow_negative_numbers = true)]
    PointToPixel {
        camera: PathBuf,
        x: f64,
        y: f64,
        z: f64,
    },

    /// Round trip a grid of pixels through the model and report pixel errors
    Check {
        camera: PathBuf,
        /// Approximate number of pixels to sample
        #[arg(short = 'n', long, default_value_t = 100)]
        points: usize,
        /// Distance along each ray at which the test point is placed
        #[arg(short = 'd', long, default_value_t = 500_000.0)]
        distance: f64,
    },

    /// Apply a similarity transform and write the re-posed camera
    #[command(allow_negative_numbers = true)]
    Transform {
        camera: PathBuf,
        output: PathBuf,
        /// Row-major 3x3 rotation matrix
        #[arg(long, num_args = 9)]
        rotation: Option<Vec<f64>>,
        #[arg(long, num_args = 3)]
        translation: Option<Vec<f64>>,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
    },

    /// Cast every pixel of a CSV file (columns x, y) and write centers and rays
    Batch {
        camera: PathBuf,
        input: PathBuf,
        /// Output CSV, stdout when omitted
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct PixelRecord {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize)]
struct RayRecord {
    x: f64,
    y: f64,
    center_x: f64,
    center_y: f64,
    center_z: f64,
    ray_x: f64,
    ray_y: f64,
    ray_z: f64,
}

impl RayRecord {
    fn new(pixel: &Vector2<f64>, center: &Vector3<f64>, ray: &Vector3<f64>) -> Self {
        RayRecord {
            x: pixel.x,
            y: pixel.y,
            center_x: center.x,
            center_y: center.y,
            center_z: center.z,
            ray_x: ray.x,
            ray_y: ray.y,
            ray_z: ray.z,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoReport {
    width: u32,
    height: u32,
    scan_time: f64,
    reference_center: [f64; 3],
    velocity: [f64; 3],
    scan_left_to_right: bool,
    use_motion_compensation: bool,
}

#[derive(Debug, Serialize)]
struct PixelReport {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    samples: usize,
    distance: f64,
    error: ProjectionError,
}

fn path_str(path: &Path) -> Result<&str, Box<dyn Error>> {
    Ok(path.to_str().ok_or("Invalid path string")?)
}

fn load_camera(
    path: &Path,
    config: &ProjectionConfig,
) -> Result<OpticalBarModel, Box<dyn Error>> {
    let mut model = OpticalBarModel::read(path_str(path)?)?;
    config.apply_to(&mut model);
    info!("Loaded camera model from {path:?}");
    Ok(model)
}

fn print_json<S: Serialize>(value: &S) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn vector3_from(values: Option<Vec<f64>>, default: Vector3<f64>) -> Vector3<f64> {
    values.map_or(default, |v| Vector3::from_column_slice(&v))
}

fn run_batch(
    model: &OpticalBarModel,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(input)?;
    let mut writer: csv::Writer<Box<dyn std::io::Write>> = match output {
        Some(path) => csv::Writer::from_writer(Box::new(std::fs::File::create(path)?)),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };

    let mut written = 0_usize;
    let mut skipped = 0_usize;
    for record in reader.deserialize() {
        let record: PixelRecord = record?;
        let pixel = Vector2::new(record.x, record.y);
        match model.pixel_to_vector(&pixel) {
            Ok(ray) => {
                let center = model.camera_center(&pixel);
                writer.serialize(RayRecord::new(&pixel, &center, &ray))?;
                written += 1;
            }
            Err(e) => {
                warn!("Skipping pixel ({}, {}): {e}", pixel.x, pixel.y);
                skipped += 1;
            }
        }
    }
    writer.flush()?;
    info!("Wrote {written} rays, skipped {skipped} pixels");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Results go to stdout, so the terminal copy of the log goes to stderr.
    let _logger = Logger::try_with_str(if cli.verbose { "debug" } else { "info" })?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stderr(if cli.verbose {
            Duplicate::Debug
        } else {
            Duplicate::Warn
        })
        .format_for_files(detailed_format)
        .format_for_stderr(colored_detailed_format)
        // error;warn;info;debug;trace
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let config = match &cli.config {
        Some(path) => {
            info!("Loading projection config from {path:?}");
            ProjectionConfig::load_from_yaml(path_str(path)?)?
        }
        None => ProjectionConfig::default(),
    };

    match cli.command {
        Command::Info { camera } => {
            let model = load_camera(&camera, &config)?;
            if cli.json {
                let center = model.reference_center();
                let velocity = model.velocity();
                print_json(&InfoReport {
                    width: model.resolution.width,
                    height: model.resolution.height,
                    scan_time: model.scan_time(),
                    reference_center: [center.x, center.y, center.z],
                    velocity: [velocity.x, velocity.y, velocity.z],
                    scan_left_to_right: model.scan_left_to_right,
                    use_motion_compensation: model.use_motion_compensation,
                })?;
            } else {
                println!("{model}");
                println!(" Scan time (s):          {}", model.scan_time());
                let v = model.velocity();
                println!(" Velocity:               ({}, {}, {})", v.x, v.y, v.z);
            }
        }
        Command::PixelToRay { camera, x, y } => {
            let model = load_camera(&camera, &config)?;
            let pixel = Vector2::new(x, y);
            let ray = model.pixel_to_vector(&pixel)?;
            let center = model.camera_center(&pixel);
            if cli.json {
                print_json(&RayRecord::new(&pixel, &center, &ray))?;
            } else {
                println!("center: {} {} {}", center.x, center.y, center.z);
                println!("ray:    {} {} {}", ray.x, ray.y, ray.z);
            }
        }
        Command::PointToPixel { camera, x, y, z } => {
            let model = load_camera(&camera, &config)?;
            let point = Vector3::new(x, y, z);
            let solved = model.point_to_pixel_with(&point, &LevenbergMarquardt, &config.solver);
            let pixel = match solved {
                Ok(pixel) => pixel,
                Err(e) => {
                    error!("Projection failed: {e}");
                    return Err(e.into());
                }
            };
            if cli.json {
                print_json(&PixelReport {
                    x: pixel.x,
                    y: pixel.y,
                })?;
            } else {
                println!("pixel: {} {}", pixel.x, pixel.y);
            }
        }
        Command::Check {
            camera,
            points,
            distance,
        } => {
            let model = load_camera(&camera, &config)?;
            let pixels = util::sample_points(&model.get_resolution(), points);
            info!("Checking {} pixels at {distance} m", pixels.len());
            let error =
                util::compute_consistency_error(&model, &pixels, distance, &config.solver)?;
            if cli.json {
                print_json(&CheckReport {
                    samples: pixels.len(),
                    distance,
                    error,
                })?;
            } else {
                println!("{error:?}");
            }
        }
        Command::Transform {
            camera,
            output,
            rotation,
            translation,
            scale,
        } => {
            let mut model = load_camera(&camera, &config)?;
            let rotation = rotation.map_or(Matrix3::identity(), |r| Matrix3::from_row_slice(&r));
            let translation = vector3_from(translation, Vector3::zeros());
            if let Err(e) = model.apply_transform(&rotation, &translation, scale) {
                error!("Transform rejected: {e}");
                return Err(e.into());
            }
            model.write(path_str(&output)?)?;
            println!("Wrote transformed camera to {output:?}");
        }
        Command::Batch {
            camera,
            input,
            output,
        } => {
            let model = load_camera(&camera, &config)?;
            run_batch(&model, &input, output.as_deref())?;
        }
    }

    Ok(())
}
