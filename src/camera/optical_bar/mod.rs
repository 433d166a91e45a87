//! Implements the optical bar (panoramic scanning) camera model.
//!
//! An optical bar camera sweeps its lens across the scene while the platform
//! keeps moving, so every image column is exposed at a different instant and
//! from a different position. This module provides the [`OpticalBarModel`]
//! struct, its forward projection (pixel to ray), the inverse projection
//! (point to pixel) through a nonlinear solver, and the rigid transform used
//! to re-anchor the camera after an external alignment.
//!
//! The forward model is written once, generic over [`RealField`], so that the
//! inverse projection can differentiate it exactly.

pub mod io;

use std::fmt;

use log::{debug, warn};
use nalgebra::{Matrix3, RealField, UnitQuaternion, Vector2, Vector3};

use crate::camera::{validation, CameraModel, CameraModelError, Resolution};
use crate::corrections::{
    apply_atmospheric_refraction_correction, apply_velocity_aberration_correction,
    CorrectionFlags,
};
use crate::geometry::{
    axis_angle_to_quaternion, is_rotation_matrix, lift, lift_matrix3, lift_vector2,
    lift_vector3, matrix_to_quaternion, quaternion_to_axis_angle, rotation_x_axis,
};
use crate::optimization::{
    LevenbergMarquardt, NonlinearSolver, PointToPixelObjective, SolveStatus, SolverSettings,
};

/// Orthonormality tolerance for transform rotations.
pub const ROTATION_TOLERANCE: f64 = 1e-9;

/// Represents an optical bar camera.
///
/// Lengths (`pixel_size`, `focal_length`, positions, radii) share one unit,
/// normally meters. Angles are in radians and the scan rate in radians per
/// time unit, which also sets the unit of `speed`.
///
/// The platform is assumed to move at constant velocity with constant
/// attitude for the duration of one scan.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Vector2, Vector3};
/// use optical_bar::camera::{CameraModel, OpticalBarModel, Resolution};
///
/// let mut model = OpticalBarModel::default();
/// model.resolution = Resolution { width: 1000, height: 500 };
/// model.center_loc_pixels = Vector2::new(500.0, 250.0);
/// model.initial_position = Vector3::new(7_000_000.0, 0.0, 0.0);
/// model.validate_params().unwrap();
///
/// let ray = model.pixel_to_vector(&Vector2::new(500.0, 250.0)).unwrap();
/// assert!((ray.norm() - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalBarModel {
    /// Sensor resolution (columns, rows).
    pub resolution: Resolution,
    /// Pixel where the optical axis meets the sensor.
    pub center_loc_pixels: Vector2<f64>,
    /// Physical size of one pixel, identical in both axes.
    pub pixel_size: f64,
    pub focal_length: f64,
    /// Total angle swept by one complete scan.
    pub scan_angle_radians: f64,
    /// Angular speed of the sweep.
    pub scan_rate_radians: f64,
    /// Fixed tilt of the camera relative to the platform body axes.
    pub forward_tilt_radians: f64,
    /// Platform position at the reference instant of the scan.
    pub initial_position: Vector3<f64>,
    /// Platform attitude (axis-angle) at the reference instant.
    pub initial_orientation: Vector3<f64>,
    /// Platform speed along its forward body axis.
    pub speed: f64,
    pub mean_earth_radius: f64,
    pub mean_surface_elevation: f64,
    /// Apply the lens shift that compensated platform motion during exposure.
    pub use_motion_compensation: bool,
    /// Sweep direction; decides which column is exposed first.
    pub scan_left_to_right: bool,
    /// Optional ray corrections. Not stored in camera files.
    pub corrections: CorrectionFlags,
}

impl Default for OpticalBarModel {
    fn default() -> Self {
        OpticalBarModel {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            center_loc_pixels: Vector2::zeros(),
            pixel_size: 1.0e-5,
            focal_length: 0.5,
            scan_angle_radians: 0.1,
            scan_rate_radians: 0.05,
            forward_tilt_radians: 0.0,
            initial_position: Vector3::zeros(),
            initial_orientation: Vector3::zeros(),
            speed: 7500.0,
            mean_earth_radius: 6_371_000.0,
            mean_surface_elevation: 0.0,
            use_motion_compensation: false,
            scan_left_to_right: false,
            corrections: CorrectionFlags::default(),
        }
    }
}

impl OpticalBarModel {
    /// Index of the last pixel column, the denominator of the scan fraction.
    fn max_col(&self) -> f64 {
        f64::from(self.resolution.width) - 1.0
    }

    /// Time needed for one complete scan.
    pub fn scan_time(&self) -> f64 {
        self.scan_angle_radians / self.scan_rate_radians
    }

    /// Position of `pixel` on the sensor plane, in physical units.
    pub fn pixel_to_sensor_plane<T: RealField>(&self, pixel: &Vector2<T>) -> Vector2<T> {
        (pixel - lift_vector2::<T>(&self.center_loc_pixels)) * lift::<T>(self.pixel_size)
    }

    /// Time elapsed between the reference instant and the exposure of `pixel`.
    ///
    /// The sweep crosses the columns at a constant rate, so the elapsed time
    /// is the fraction of the image already scanned times the scan time.
    /// Without a second column there is no sweep and every pixel is exposed
    /// at the reference instant.
    pub fn pixel_to_time_delta<T: RealField>(&self, pixel: &Vector2<T>) -> T {
        if self.max_col() <= 0.0 {
            return T::zero();
        }
        let max_col: T = lift(self.max_col());
        let scan_fraction = if self.scan_left_to_right {
            pixel.x.clone() / max_col
        } else {
            (max_col.clone() - pixel.x.clone()) / max_col
        };
        scan_fraction * lift(self.scan_time())
    }

    /// Rotation from the camera frame to the global frame.
    ///
    /// Attitude is frozen for the whole scan, so this is the same for every pixel.
    pub fn pose_quaternion(&self) -> UnitQuaternion<f64> {
        axis_angle_to_quaternion(&self.initial_orientation)
    }

    /// Platform velocity in the global frame.
    ///
    /// The platform moves along its forward (+Y) body axis; the camera pose is
    /// first un-tilted to recover the platform attitude.
    pub fn velocity(&self) -> Vector3<f64> {
        let pose = self.pose_quaternion().to_rotation_matrix().into_inner();
        let platform = rotation_x_axis(-self.forward_tilt_radians) * pose;
        platform * Vector3::new(0.0, self.speed, 0.0)
    }

    /// Camera position at the exposure of `pixel`, generic over the scalar.
    pub fn camera_center_generic<T: RealField>(&self, pixel: &Vector2<T>) -> Vector3<T> {
        let dt = self.pixel_to_time_delta(pixel);
        lift_vector3::<T>(&self.initial_position) + lift_vector3::<T>(&self.velocity()) * dt
    }

    /// Camera position at the reference instant of the scan.
    pub fn reference_center(&self) -> Vector3<f64> {
        self.initial_position
    }

    pub fn set_camera_center(&mut self, position: Vector3<f64>) {
        self.initial_position = position;
    }

    pub fn set_camera_pose(&mut self, axis_angle: Vector3<f64>) {
        self.initial_orientation = axis_angle;
    }

    /// Ray observed by `pixel` before any physical correction.
    ///
    /// The local ray uses the east-south-down convention of line scan cameras:
    /// `alpha` is the sweep angle of the column off boresight and the lens
    /// shift from motion compensation moves the ray along the track.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::PixelToRay`] when the image has fewer than two
    /// columns, or when motion compensation is enabled and the camera is not
    /// above the datum sphere.
    pub fn pixel_to_vector_uncorrected_generic<T: RealField>(
        &self,
        pixel: &Vector2<T>,
    ) -> Result<Vector3<T>, CameraModelError> {
        if self.resolution.width < 2 {
            return Err(CameraModelError::PixelToRay(format!(
                "scan timing needs at least two image columns, got width {}",
                self.resolution.width
            )));
        }
        let sensor_plane_pos = self.pixel_to_sensor_plane(pixel);
        let focal_length: T = lift(self.focal_length);

        // Horizontal angle away from boresight.
        let alpha = sensor_plane_pos.x.clone() / focal_length.clone();

        // The film was translated under the lens to compensate the forward
        // motion of the platform during exposure.
        let mut image_motion_compensation = T::zero();
        if self.use_motion_compensation {
            let cam_center = self.camera_center_generic(pixel);
            let height = cam_center.norm()
                - lift::<T>(self.mean_surface_elevation + self.mean_earth_radius);
            // Also rejects a NaN height.
            if !(height > T::zero()) {
                return Err(CameraModelError::PixelToRay(format!(
                    "motion compensation needs the camera above the datum, height = {height}"
                )));
            }
            image_motion_compensation = lift::<T>(self.focal_length * self.speed)
                / (height * lift(self.scan_rate_radians))
                * alpha.clone().sin();
            if !self.scan_left_to_right {
                image_motion_compensation = -image_motion_compensation;
            }
        }

        let local = Vector3::new(
            focal_length.clone() * alpha.clone().sin(),
            sensor_plane_pos.y.clone() + image_motion_compensation,
            focal_length * alpha.cos(),
        )
        .normalize();

        let pose = self.pose_quaternion().to_rotation_matrix().into_inner();
        Ok(lift_matrix3::<T>(&pose) * local)
    }

    /// Ray observed by `pixel` with the enabled corrections applied.
    ///
    /// Refraction is applied before aberration. Every failure is reported as
    /// [`CameraModelError::PixelToRay`].
    pub fn pixel_to_vector_generic<T: RealField>(
        &self,
        pixel: &Vector2<T>,
    ) -> Result<Vector3<T>, CameraModelError> {
        let mut ray = self.pixel_to_vector_uncorrected_generic(pixel)?;
        if !self.corrections.apply_atmospheric_refraction
            && !self.corrections.apply_velocity_aberration
        {
            return Ok(ray);
        }

        let cam_center = self.camera_center_generic(pixel);
        if self.corrections.apply_atmospheric_refraction {
            ray = apply_atmospheric_refraction_correction(
                &cam_center,
                self.mean_earth_radius,
                self.mean_surface_elevation,
                &ray,
            )
            .map_err(into_pixel_to_ray)?;
        }
        if self.corrections.apply_velocity_aberration {
            ray = apply_velocity_aberration_correction(
                &cam_center,
                &self.velocity(),
                self.mean_earth_radius,
                &ray,
            )
            .map_err(into_pixel_to_ray)?;
        }
        Ok(ray)
    }

    /// Ray observed by `pixel` before any physical correction.
    pub fn pixel_to_vector_uncorrected(
        &self,
        pixel: &Vector2<f64>,
    ) -> Result<Vector3<f64>, CameraModelError> {
        self.pixel_to_vector_uncorrected_generic(pixel)
    }

    /// Projects `point` into the image with a caller supplied solver.
    ///
    /// The solve starts at the image center. A solver that does not converge,
    /// or converges to a residual above `settings.max_residual`, fails with
    /// [`CameraModelError::PointToPixel`]. Nothing is retried.
    pub fn point_to_pixel_with<S: NonlinearSolver>(
        &self,
        point: &Vector3<f64>,
        solver: &S,
        settings: &SolverSettings,
    ) -> Result<Vector2<f64>, CameraModelError> {
        let start = Vector2::new(
            f64::from(self.resolution.width) / 2.0,
            f64::from(self.resolution.height) / 2.0,
        );

        let objective = PointToPixelObjective::new(self.clone(), *point);
        objective
            .evaluate(&start)
            .map_err(|e| CameraModelError::PointToPixel(e.to_string()))?;

        let target = nalgebra::DVector::zeros(PointToPixelObjective::RESIDUAL_DIM);
        let initial_guess = nalgebra::DVector::from_column_slice(start.as_slice());
        let outcome = solver.solve(objective.clone(), &initial_guess, &target, settings);

        if outcome.status != SolveStatus::Converged || outcome.solution.len() != 2 {
            warn!("Point to pixel solver did not converge for point {point:?}");
            return Err(CameraModelError::PointToPixel(format!(
                "unable to project point {:?} into the optical bar model",
                point.as_slice()
            )));
        }

        let pixel = Vector2::new(outcome.solution[0], outcome.solution[1]);
        let residual = objective
            .evaluate(&pixel)
            .map_err(|e| CameraModelError::PointToPixel(e.to_string()))?
            .norm();
        debug!(
            "Point to pixel: {:?} -> {:?}, residual {residual:e}, cost {:e}",
            point.as_slice(),
            pixel.as_slice(),
            outcome.final_cost
        );
        if !residual.is_finite() || residual > settings.max_residual {
            return Err(CameraModelError::PointToPixel(format!(
                "solver stopped at pixel {:?} with residual {residual:e}",
                pixel.as_slice()
            )));
        }
        Ok(pixel)
    }

    /// Re-poses the camera with a similarity transform.
    ///
    /// The new position is `scale * rotation * position + translation` and the
    /// new attitude is `rotation * attitude`. Sensor and timing parameters are
    /// untouched.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidParams`] if `scale` is not positive and
    /// finite, `rotation` is not a rotation matrix, or `translation` is not
    /// finite. The model is left unchanged.
    pub fn apply_transform(
        &mut self,
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
        scale: f64,
    ) -> Result<(), CameraModelError> {
        validation::validate_positive("transform scale", scale)?;
        validation::validate_finite("transform translation", translation.as_slice())?;
        if !is_rotation_matrix(rotation, ROTATION_TOLERANCE) {
            return Err(CameraModelError::InvalidParams(format!(
                "transform rotation is not a rotation matrix: {rotation}"
            )));
        }

        let position = self.reference_center();
        let pose = self.pose_quaternion();
        let rotation_quaternion = matrix_to_quaternion(rotation);

        self.set_camera_center(rotation * position * scale + translation);
        self.set_camera_pose(quaternion_to_axis_angle(&(rotation_quaternion * pose)));
        Ok(())
    }
}

fn into_pixel_to_ray(err: CameraModelError) -> CameraModelError {
    match err {
        CameraModelError::PixelToRay(_) => err,
        other => CameraModelError::PixelToRay(other.to_string()),
    }
}

impl CameraModel for OpticalBarModel {
    /// Unit ray observed by `pixel` in the global frame.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::PixelToRay`] if the forward model or one of the
    /// enabled corrections fails.
    fn pixel_to_vector(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        self.pixel_to_vector_generic(pixel)
    }

    /// Pixel observing `point`, solved with Levenberg-Marquardt and the
    /// default [`SolverSettings`].
    fn point_to_pixel(&self, point: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        self.point_to_pixel_with(point, &LevenbergMarquardt, &SolverSettings::default())
    }

    fn camera_center(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        self.camera_center_generic(pixel)
    }

    fn camera_pose(&self, _pixel: &Vector2<f64>) -> UnitQuaternion<f64> {
        self.pose_quaternion()
    }

    fn read(path: &str) -> Result<Self, CameraModelError> {
        io::read_optical_bar(path)
    }

    fn write(&self, path: &str) -> Result<(), CameraModelError> {
        io::write_optical_bar(self, path)
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_resolution(&self.resolution)?;
        validation::validate_positive("pixel size", self.pixel_size)?;
        validation::validate_positive("focal length", self.focal_length)?;
        validation::validate_positive("scan angle", self.scan_angle_radians)?;
        if self.scan_rate_radians == 0.0 || !self.scan_rate_radians.is_finite() {
            return Err(CameraModelError::InvalidParams(format!(
                "scan rate must be non-zero and finite, got {}",
                self.scan_rate_radians
            )));
        }
        validation::validate_finite("image center", self.center_loc_pixels.as_slice())?;
        validation::validate_finite("initial position", self.initial_position.as_slice())?;
        validation::validate_finite("initial orientation", self.initial_orientation.as_slice())?;
        validation::validate_finite(
            "platform parameters",
            &[
                self.forward_tilt_radians,
                self.speed,
                self.mean_earth_radius,
                self.mean_surface_elevation,
            ],
        )?;
        Ok(())
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }
}

impl fmt::Display for OpticalBarModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "------------------------ Optical Bar Model -----------------------")?;
        writeln!(f)?;
        writeln!(
            f,
            " Image size :            {} x {}",
            self.resolution.width, self.resolution.height
        )?;
        writeln!(
            f,
            " Center loc (pixels):    ({}, {})",
            self.center_loc_pixels.x, self.center_loc_pixels.y
        )?;
        writeln!(f, " Pixel size (m) :        {}", self.pixel_size)?;
        writeln!(f, " Focal length (m) :      {}", self.focal_length)?;
        writeln!(f, " Scan angle (rad):       {}", self.scan_angle_radians)?;
        writeln!(f, " Scan rate (rad/s):      {}", self.scan_rate_radians)?;
        writeln!(f, " Forward tilt (rad):     {}", self.forward_tilt_radians)?;
        writeln!(
            f,
            " Initial position:       ({}, {}, {})",
            self.initial_position.x, self.initial_position.y, self.initial_position.z
        )?;
        writeln!(
            f,
            " Initial pose:           ({}, {}, {})",
            self.initial_orientation.x, self.initial_orientation.y, self.initial_orientation.z
        )?;
        writeln!(f, " Speed:                  {}", self.speed)?;
        writeln!(f, " Mean earth radius:      {}", self.mean_earth_radius)?;
        writeln!(f, " Mean surface elevation: {}", self.mean_surface_elevation)?;
        writeln!(f, " Use motion comp:        {}", self.use_motion_compensation)?;
        writeln!(f, " Left to right scan:     {}", self.scan_left_to_right)?;
        writeln!(
            f,
            " Corrections:            refraction {}, aberration {}",
            self.corrections.apply_atmospheric_refraction,
            self.corrections.apply_velocity_aberration
        )?;
        writeln!(f)?;
        writeln!(f, "------------------------------------------------------------------------")
    }
}

/// Contains unit tests for the optical bar camera model.
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// The reference scenario: 1000x500 sensor, 7000 km from the origin.
    pub(crate) fn sample_model() -> OpticalBarModel {
        OpticalBarModel {
            resolution: Resolution {
                width: 1000,
                height: 500,
            },
            center_loc_pixels: Vector2::new(500.0, 250.0),
            pixel_size: 1e-5,
            focal_length: 0.5,
            scan_angle_radians: 0.1,
            scan_rate_radians: 0.05,
            forward_tilt_radians: 0.0,
            initial_position: Vector3::new(7_000_000.0, 0.0, 0.0),
            initial_orientation: Vector3::zeros(),
            speed: 7500.0,
            mean_earth_radius: 6_371_000.0,
            mean_surface_elevation: 0.0,
            use_motion_compensation: false,
            scan_left_to_right: false,
            corrections: CorrectionFlags::default(),
        }
    }

    /// A camera 600 km above the equator looking straight down, with the
    /// platform flying north.
    fn nadir_model() -> OpticalBarModel {
        // Columns: camera x to -Y, camera y (forward) to +Z, camera z (look) to -X.
        let r = Matrix3::new(0.0, 0.0, -1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let pose = matrix_to_quaternion(&r);
        OpticalBarModel {
            initial_position: Vector3::new(6_971_000.0, 0.0, 0.0),
            initial_orientation: quaternion_to_axis_angle(&pose),
            ..sample_model()
        }
    }

    #[test]
    fn test_reference_scenario_center_pixel() {
        let model = sample_model();
        model.validate_params().unwrap();
        let pixel = Vector2::new(500.0, 250.0);

        let sensor = model.pixel_to_sensor_plane(&pixel);
        assert_relative_eq!(sensor, Vector2::zeros(), epsilon = 1e-15);

        // scan_dir = left, so right to left: (999 - 500) / 999 of a 2 second scan.
        let dt = model.pixel_to_time_delta(&pixel);
        assert_relative_eq!(dt, 499.0 / 999.0 * 2.0, epsilon = 1e-12);

        let center = model.camera_center(&pixel);
        assert_relative_eq!(
            center,
            Vector3::new(7_000_000.0, 7500.0 * dt, 0.0),
            epsilon = 1e-6
        );
        assert!((center - model.initial_position).norm() / model.initial_position.norm() < 1e-2);

        let ray = model.pixel_to_vector(&pixel).unwrap();
        assert_relative_eq!(ray, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_reference_scenario_scanning_right() {
        // scan_dir = right in the camera file reads as a left to right sweep.
        let text = io::format_optical_bar(&sample_model())
            .replace("scan_dir = left", "scan_dir = right");
        let model = io::parse_optical_bar(&text).unwrap();
        assert!(model.scan_left_to_right);

        let pixel = Vector2::new(500.0, 250.0);
        assert_relative_eq!(
            model.pixel_to_sensor_plane(&pixel),
            Vector2::zeros(),
            epsilon = 1e-15
        );
        let dt = model.pixel_to_time_delta(&pixel);
        assert_relative_eq!(dt, 500.0 / 999.0 * 2.0, epsilon = 1e-12);

        let center = model.camera_center(&pixel);
        assert_relative_eq!(
            center,
            Vector3::new(7_000_000.0, 7500.0 * dt, 0.0),
            epsilon = 1e-6
        );
        assert!((center - model.initial_position).norm() / model.initial_position.norm() < 1e-2);

        let ray = model.pixel_to_vector(&pixel).unwrap();
        assert_relative_eq!(ray, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_single_column_image_fails_without_nan() {
        let mut model = sample_model();
        model.resolution.width = 1;
        model.use_motion_compensation = true;
        let pixel = Vector2::new(0.0, 250.0);

        assert_eq!(model.pixel_to_time_delta(&pixel), 0.0);
        assert_relative_eq!(model.camera_center(&pixel), model.initial_position);
        assert!(matches!(
            model.pixel_to_vector(&pixel),
            Err(CameraModelError::PixelToRay(_))
        ));
        assert!(matches!(
            model.point_to_pixel(&Vector3::new(7_500_000.0, 0.0, 0.0)),
            Err(CameraModelError::PointToPixel(_))
        ));

        model.resolution.width = 0;
        assert_eq!(model.pixel_to_time_delta(&pixel), 0.0);
        assert!(model.pixel_to_vector(&pixel).is_err());
    }

    #[test]
    fn test_motion_compensation_rejects_nan_height() {
        let mut model = sample_model();
        model.initial_position = Vector3::new(f64::NAN, 0.0, 0.0);
        model.use_motion_compensation = true;
        let result = model.pixel_to_vector(&Vector2::new(10.0, 10.0));
        assert!(matches!(result, Err(CameraModelError::PixelToRay(_))));
    }

    #[test]
    fn test_time_delta_monotonic_in_column() {
        let mut model = sample_model();
        for left_to_right in [true, false] {
            model.scan_left_to_right = left_to_right;
            let deltas: Vec<f64> = (0..1000)
                .step_by(37)
                .map(|col| model.pixel_to_time_delta(&Vector2::new(col as f64, 100.0)))
                .collect();
            for pair in deltas.windows(2) {
                if left_to_right {
                    assert!(pair[1] >= pair[0]);
                } else {
                    assert!(pair[1] <= pair[0]);
                }
            }
        }
    }

    #[test]
    fn test_time_delta_covers_full_scan() {
        let mut model = sample_model();
        model.scan_left_to_right = true;
        assert_relative_eq!(model.pixel_to_time_delta(&Vector2::new(0.0, 0.0)), 0.0);
        assert_relative_eq!(
            model.pixel_to_time_delta(&Vector2::new(999.0, 0.0)),
            model.scan_time()
        );
        model.scan_left_to_right = false;
        assert_relative_eq!(model.pixel_to_time_delta(&Vector2::new(999.0, 0.0)), 0.0);
    }

    #[test]
    fn test_rays_have_unit_length() {
        let mut model = nadir_model();
        model.use_motion_compensation = true;
        model.forward_tilt_radians = 0.2;
        for col in (0..1000).step_by(111) {
            for row in (0..500).step_by(71) {
                let ray = model
                    .pixel_to_vector(&Vector2::new(col as f64, row as f64))
                    .unwrap();
                assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_pose_constant_across_pixels() {
        let model = nadir_model();
        let a = model.camera_pose(&Vector2::new(0.0, 0.0));
        let b = model.camera_pose(&Vector2::new(999.0, 499.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_velocity_follows_pose_and_tilt() {
        let mut model = sample_model();
        assert_relative_eq!(model.velocity(), Vector3::new(0.0, 7500.0, 0.0));

        model.forward_tilt_radians = std::f64::consts::FRAC_PI_2;
        // Un-tilting by -90 degrees about x turns +Y into -Z.
        assert_relative_eq!(
            model.velocity(),
            Vector3::new(0.0, 0.0, -7500.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_motion_compensation_shifts_off_axis_rays() {
        let mut model = nadir_model();
        let pixel = Vector2::new(800.0, 250.0);
        let without = model.pixel_to_vector(&pixel).unwrap();
        model.use_motion_compensation = true;
        let with = model.pixel_to_vector(&pixel).unwrap();
        assert!(without.angle(&with) > 1e-6);

        // No shift on boresight, where sin(alpha) is zero.
        let center = Vector2::new(500.0, 250.0);
        model.use_motion_compensation = false;
        let without = model.pixel_to_vector(&center).unwrap();
        model.use_motion_compensation = true;
        let with = model.pixel_to_vector(&center).unwrap();
        assert_relative_eq!(without, with, epsilon = 1e-15);
    }

    #[test]
    fn test_motion_compensation_below_datum_fails() {
        let mut model = sample_model();
        model.initial_position = Vector3::new(1000.0, 0.0, 0.0);
        model.speed = 0.0;
        model.use_motion_compensation = true;
        let result = model.pixel_to_vector(&Vector2::new(10.0, 10.0));
        assert!(matches!(result, Err(CameraModelError::PixelToRay(_))));
    }

    #[test]
    fn test_correction_failure_is_reported_as_pixel_to_ray() {
        let mut model = sample_model();
        model.initial_position = Vector3::new(1000.0, 0.0, 0.0);
        model.speed = 0.0;
        model.corrections.apply_velocity_aberration = true;
        let result = model.pixel_to_vector(&Vector2::new(10.0, 10.0));
        assert!(matches!(result, Err(CameraModelError::PixelToRay(_))));
    }

    #[test]
    fn test_default_corrections_return_uncorrected_ray() {
        let model = nadir_model();
        let pixel = Vector2::new(123.0, 456.0);
        assert_eq!(
            model.pixel_to_vector(&pixel).unwrap(),
            model.pixel_to_vector_uncorrected(&pixel).unwrap()
        );
    }

    #[test]
    fn test_corrections_change_the_ray() {
        let mut model = nadir_model();
        let pixel = Vector2::new(900.0, 100.0);
        let plain = model.pixel_to_vector(&pixel).unwrap();

        model.corrections.apply_velocity_aberration = true;
        let aberrated = model.pixel_to_vector(&pixel).unwrap();
        assert!(plain.angle(&aberrated) > 1e-6);

        // Refraction near nadir is tiny, well below what `angle` resolves.
        model.corrections.apply_atmospheric_refraction = true;
        let both = model.pixel_to_vector(&pixel).unwrap();
        assert!((aberrated - both).norm() > 0.0);
        assert_relative_eq!(both.norm(), 1.0, epsilon = 1e-12);
    }

    fn assert_point_to_pixel_recovers(model: &OpticalBarModel, pixel: Vector2<f64>, t: f64) {
        let point = model.camera_center(&pixel) + model.pixel_to_vector(&pixel).unwrap() * t;
        let solved = model.point_to_pixel(&point).unwrap();
        assert_relative_eq!(solved, pixel, epsilon = 1e-3);
    }

    #[test]
    fn test_point_to_pixel_inverts_pixel_to_vector() {
        let model = nadir_model();
        for pixel in [
            Vector2::new(500.0, 250.0),
            Vector2::new(120.5, 40.25),
            Vector2::new(870.0, 460.0),
        ] {
            assert_point_to_pixel_recovers(&model, pixel, 600_000.0);
            assert_point_to_pixel_recovers(&model, pixel, 300_000.0);
        }
    }

    #[test]
    fn test_point_to_pixel_with_motion_compensation_and_corrections() {
        let mut model = nadir_model();
        model.use_motion_compensation = true;
        model.scan_left_to_right = true;
        model.forward_tilt_radians = 0.1;
        model.corrections = CorrectionFlags {
            apply_atmospheric_refraction: true,
            apply_velocity_aberration: true,
        };
        assert_point_to_pixel_recovers(&model, Vector2::new(300.0, 400.0), 610_000.0);
        assert_point_to_pixel_recovers(&model, Vector2::new(750.0, 90.0), 610_000.0);
    }

    #[test]
    fn test_point_behind_camera_fails() {
        let model = nadir_model();
        let pixel = Vector2::new(500.0, 250.0);
        let behind = model.camera_center(&pixel) - model.pixel_to_vector(&pixel).unwrap() * 1e5;
        let result = model.point_to_pixel(&behind);
        assert!(matches!(result, Err(CameraModelError::PointToPixel(_))));
    }

    #[test]
    fn test_apply_transform_moves_position_and_pose() {
        let mut model = nadir_model();
        let rotation = rotation_x_axis(0.3);
        let translation = Vector3::new(10.0, -20.0, 30.0);
        let before_position = model.initial_position;
        let before_pose = model.pose_quaternion();

        model.apply_transform(&rotation, &translation, 2.0).unwrap();

        assert_relative_eq!(
            model.initial_position,
            rotation * before_position * 2.0 + translation,
            epsilon = 1e-6
        );
        let expected_pose = matrix_to_quaternion(&rotation) * before_pose;
        assert!(model.pose_quaternion().angle_to(&expected_pose) < 1e-12);
        // Sensor parameters are untouched.
        assert_eq!(model.resolution, sample_model().resolution);
        assert_eq!(model.scan_rate_radians, sample_model().scan_rate_radians);
    }

    #[test]
    fn test_apply_transform_rejects_invalid_input() {
        let original = nadir_model();
        let rotation = rotation_x_axis(0.3);
        let translation = Vector3::new(1.0, 2.0, 3.0);

        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut model = original.clone();
            assert!(matches!(
                model.apply_transform(&rotation, &translation, scale),
                Err(CameraModelError::InvalidParams(_))
            ));
            assert_eq!(model, original);
        }

        let mut model = original.clone();
        assert!(model
            .apply_transform(&(rotation * 2.0), &translation, 1.0)
            .is_err());
        assert!(model
            .apply_transform(&rotation, &Vector3::new(f64::NAN, 0.0, 0.0), 1.0)
            .is_err());
        assert_eq!(model, original);
    }

    #[test]
    fn test_apply_transform_composition() {
        let r1 = rotation_x_axis(0.2);
        let r2 = axis_angle_to_quaternion(&Vector3::new(0.0, 0.1, -0.3))
            .to_rotation_matrix()
            .into_inner();
        let t1 = Vector3::new(100.0, 0.0, -50.0);
        let t2 = Vector3::new(-3.0, 7.0, 11.0);
        let (s1, s2) = (1.5, 0.8);

        let mut sequential = nadir_model();
        sequential.apply_transform(&r1, &t1, s1).unwrap();
        sequential.apply_transform(&r2, &t2, s2).unwrap();

        let mut combined = nadir_model();
        combined
            .apply_transform(&(r2 * r1), &(r2 * t1 * s2 + t2), s1 * s2)
            .unwrap();

        assert_relative_eq!(
            sequential.initial_position,
            combined.initial_position,
            max_relative = 1e-12
        );
        assert!(
            sequential
                .pose_quaternion()
                .angle_to(&combined.pose_quaternion())
                < 1e-12
        );
    }

    #[test]
    fn test_validate_params_rejects_degenerate_models() {
        let mut model = sample_model();
        model.resolution.width = 1;
        assert!(matches!(
            model.validate_params(),
            Err(CameraModelError::InvalidParams(_))
        ));

        let mut model = sample_model();
        model.scan_rate_radians = 0.0;
        assert!(model.validate_params().is_err());

        let mut model = sample_model();
        model.focal_length = -0.5;
        assert!(model.validate_params().is_err());

        let mut model = sample_model();
        model.pixel_size = 0.0;
        assert!(model.validate_params().is_err());
    }

    #[test]
    fn test_display_lists_parameters() {
        let text = sample_model().to_string();
        assert!(text.contains("Optical Bar Model"));
        assert!(text.contains("Image size :            1000 x 500"));
        assert!(text.contains("Left to right scan:     false"));
    }
}
