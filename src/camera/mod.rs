//! Camera model abstractions.
//!
//! This module defines the [`CameraModel`] trait that every camera model in the
//! crate implements, the shared [`CameraModelError`] type, and the small value
//! types used to describe a sensor. The only model currently provided is the
//! panoramic [`OpticalBarModel`].

pub mod optical_bar;

pub use optical_bar::OpticalBarModel;

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Sensor resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Number of pixel columns.
    pub width: u32,
    /// Number of pixel rows.
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Could not read the {0} from the camera file")]
    MissingField(&'static str),
    #[error("Camera file version {0} is not supported, versions prior to 4 are rejected")]
    UnsupportedVersion(i64),
    #[error("Expected OPTICAL_BAR camera type, but got type {0}")]
    WrongCameraType(String),
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Pixel to ray failed: {0}")]
    PixelToRay(String),
    #[error("Point to pixel failed: {0}")]
    PointToPixel(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Trait defining the core functionality for camera models.
///
/// Pixels are `(column, row)` coordinates. Rays, centers and poses are
/// expressed in the global Cartesian frame the camera was placed in.
pub trait CameraModel {
    /// Unit direction of the ray observed by `pixel`.
    fn pixel_to_vector(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError>;

    /// Pixel whose ray passes through `point`.
    fn point_to_pixel(&self, point: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Camera position at the instant `pixel` was exposed.
    fn camera_center(&self, pixel: &Vector2<f64>) -> Vector3<f64>;

    /// Camera attitude at the instant `pixel` was exposed.
    fn camera_pose(&self, pixel: &Vector2<f64>) -> UnitQuaternion<f64>;

    /// Load camera parameters from a camera file.
    fn read(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Save camera parameters to a camera file.
    fn write(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validate camera parameters.
    fn validate_params(&self) -> Result<(), CameraModelError>;

    /// Sensor resolution.
    fn get_resolution(&self) -> Resolution;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_positive(name: &str, value: f64) -> Result<(), CameraModelError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(CameraModelError::InvalidParams(format!(
                "{name} must be positive and finite, got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_finite(name: &str, values: &[f64]) -> Result<(), CameraModelError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CameraModelError::InvalidParams(format!(
                "{name} must be finite, got {values:?}"
            )));
        }
        Ok(())
    }

    /// The scan timing divides by `width - 1`, so a single column sensor is rejected.
    pub fn validate_resolution(resolution: &Resolution) -> Result<(), CameraModelError> {
        if resolution.width <= 1 || resolution.height == 0 {
            return Err(CameraModelError::InvalidParams(format!(
                "image size must be at least 2x1, got {}x{}",
                resolution.width, resolution.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    #[test]
    fn test_validate_resolution() {
        assert!(validate_resolution(&Resolution {
            width: 2,
            height: 1
        })
        .is_ok());
        assert!(matches!(
            validate_resolution(&Resolution {
                width: 1,
                height: 500
            }),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("f", 0.5).is_ok());
        assert!(validate_positive("f", 0.0).is_err());
        assert!(validate_positive("f", f64::NAN).is_err());
        assert!(validate_positive("f", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = CameraModelError::MissingField("scan rate");
        assert_eq!(
            err.to_string(),
            "Could not read the scan rate from the camera file"
        );
    }
}
