//! Sampling and accuracy helpers shared by the CLI and tests.

use std::fmt;

use log::{debug, warn};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::camera::{CameraModel, CameraModelError, OpticalBarModel, Resolution};
use crate::optimization::{LevenbergMarquardt, SolverSettings};

/// Pixel distance statistics of a projection round trip.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    fn from_errors(mut errors: Vec<f64>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();

        errors.sort_by(f64::total_cmp);
        let mid = errors.len() / 2;
        let median = if errors.len() % 2 == 0 {
            (errors[mid - 1] + errors[mid]) / 2.0
        } else {
            errors[mid]
        };

        Some(ProjectionError {
            rmse,
            min: errors[0],
            max: errors[errors.len() - 1],
            mean,
            stddev: variance.sqrt(),
            median,
        })
    }
}

/// Generate a grid of pixels evenly distributed across the image.
///
/// The image is split into roughly `n` cells with the aspect ratio of the
/// image and one pixel is placed at the center of each cell.
pub fn sample_points(resolution: &Resolution, n: usize) -> Vec<Vector2<f64>> {
    let width = resolution.width as f64;
    let height = resolution.height as f64;
    if n == 0 || width <= 0.0 || height <= 0.0 {
        return Vec::new();
    }

    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut points = Vec::with_capacity(num_cells_x * num_cells_y);
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let x = (j as f64 + 0.5) * cell_width;
            let y = (i as f64 + 0.5) * cell_height;
            points.push(Vector2::new(x, y));
        }
    }
    points
}

/// Measures how well `point_to_pixel` inverts `pixel_to_vector`.
///
/// Each pixel is cast `distance` meters along its ray, projected back with
/// `settings`, and compared with where it started. Pixels whose round trip
/// fails are skipped.
///
/// # Errors
///
/// [`CameraModelError::PointToPixel`] if no pixel survives the round trip.
pub fn compute_consistency_error(
    model: &OpticalBarModel,
    pixels: &[Vector2<f64>],
    distance: f64,
    settings: &SolverSettings,
) -> Result<ProjectionError, CameraModelError> {
    let mut errors = Vec::with_capacity(pixels.len());
    for pixel in pixels {
        let round_trip = model.pixel_to_vector(pixel).and_then(|ray| {
            let point = model.camera_center(pixel) + ray * distance;
            model.point_to_pixel_with(&point, &LevenbergMarquardt, settings)
        });
        match round_trip {
            Ok(projected) => errors.push((projected - pixel).norm()),
            Err(e) => warn!("Round trip failed for pixel ({}, {}): {e}", pixel.x, pixel.y),
        }
    }

    debug!("{} of {} pixels survived the round trip", errors.len(), pixels.len());
    ProjectionError::from_errors(errors).ok_or_else(|| {
        CameraModelError::PointToPixel("no pixel survived the round trip".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_points_cover_image() {
        let resolution = Resolution {
            width: 1000,
            height: 500,
        };
        let points = sample_points(&resolution, 50);
        // 10 x 5 cells for a 2:1 image.
        assert_eq!(points.len(), 50);
        assert_relative_eq!(points[0], Vector2::new(50.0, 50.0));
        assert_relative_eq!(points[49], Vector2::new(950.0, 450.0));
        assert!(points
            .iter()
            .all(|p| p.x > 0.0 && p.x < 1000.0 && p.y > 0.0 && p.y < 500.0));
    }

    #[test]
    fn test_sample_points_degenerate() {
        let resolution = Resolution {
            width: 10,
            height: 10,
        };
        assert!(sample_points(&resolution, 0).is_empty());
        assert_eq!(sample_points(&resolution, 1).len(), 1);
    }

    #[test]
    fn test_projection_error_statistics() {
        let stats = ProjectionError::from_errors(vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.rmse, 7.5_f64.sqrt());
        assert_relative_eq!(stats.stddev, 1.25_f64.sqrt());
        assert!(ProjectionError::from_errors(Vec::new()).is_none());
    }

    #[test]
    fn test_consistency_error_on_sample_model() {
        let model = OpticalBarModel::read("samples/optical_bar.tsai").unwrap();
        let pixels = sample_points(&model.get_resolution(), 8);
        let stats =
            compute_consistency_error(&model, &pixels, 500_000.0, &SolverSettings::default())
                .unwrap();
        assert!(stats.max < 1e-3, "{stats:?}");
    }

    #[test]
    fn test_consistency_error_uses_solver_settings() {
        let model = OpticalBarModel::read("samples/optical_bar.tsai").unwrap();
        let pixels = sample_points(&model.get_resolution(), 8);

        // A single iteration from the image center cannot reach a zero residual.
        let strict = SolverSettings {
            max_iterations: 1,
            max_residual: 0.0,
            ..SolverSettings::default()
        };
        assert!(matches!(
            compute_consistency_error(&model, &pixels, 500_000.0, &strict),
            Err(CameraModelError::PointToPixel(_))
        ));
        assert!(
            compute_consistency_error(&model, &pixels, 500_000.0, &SolverSettings::default())
                .is_ok()
        );
    }

    #[test]
    fn test_consistency_error_without_survivors() {
        let mut model = OpticalBarModel::read("samples/optical_bar.tsai").unwrap();
        // Motion compensation below the datum makes every ray fail.
        model.use_motion_compensation = true;
        model.initial_position = nalgebra::Vector3::new(1000.0, 0.0, 0.0);
        let pixels = sample_points(&model.get_resolution(), 4);
        assert!(matches!(
            compute_consistency_error(&model, &pixels, 1000.0, &SolverSettings::default()),
            Err(CameraModelError::PointToPixel(_))
        ));
    }
}
