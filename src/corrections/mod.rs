//! Physical corrections applied to camera rays.
//!
//! Both corrections take the uncorrected ray leaving the camera and return
//! the straight-line direction from the camera to the ground point that was
//! actually imaged. They are generic over [`RealField`] so they can sit inside
//! the automatically differentiated inverse projection.

use nalgebra::{RealField, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModelError;
use crate::geometry::{lift, lift_vector3};

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Earth sidereal rotation rate about +Z (rad/s).
pub const EARTH_ROTATION_RATE: f64 = 7.292_115_0e-5;

/// Refraction constant of a standard atmosphere at sea level (60.4 arcsec).
pub const REFRACTION_CONSTANT: f64 = 60.4 / 3600.0 * std::f64::consts::PI / 180.0;

/// Density scale height of a standard atmosphere (m).
pub const ATMOSPHERE_SCALE_HEIGHT: f64 = 8434.0;

/// Switches for the optional ray corrections.
///
/// Camera files do not carry these; they default to off, which yields the
/// purely geometric ray.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionFlags {
    /// Bend rays toward nadir to undo atmospheric refraction.
    pub apply_atmospheric_refraction: bool,
    /// Remove the apparent shift caused by the platform velocity.
    pub apply_velocity_aberration: bool,
}

/// Removes atmospheric refraction from `ray`.
///
/// Light travelling down to the surface bends toward the local vertical, so
/// the imaged ground point lies closer to nadir than the observed ray
/// suggests. The refraction angle at the ground follows a standard
/// atmosphere, `K * exp(-h / H) * tan(z)`, and is seen from the camera scaled
/// by `H / D` where `D` is the slant range to the datum.
///
/// Rays that do not hit the datum sphere, and rays exactly at nadir, are
/// returned unchanged.
///
/// # Errors
///
/// [`CameraModelError::PixelToRay`] if the camera is not above the datum.
pub fn apply_atmospheric_refraction_correction<T: RealField>(
    camera_center: &Vector3<T>,
    earth_radius: f64,
    surface_elevation: f64,
    ray: &Vector3<T>,
) -> Result<Vector3<T>, CameraModelError> {
    let datum_radius: T = lift(earth_radius + surface_elevation);
    let center_norm = camera_center.norm();
    if center_norm <= datum_radius {
        return Err(CameraModelError::PixelToRay(format!(
            "atmospheric refraction needs the camera above the datum, camera radius {} <= {}",
            center_norm,
            earth_radius + surface_elevation
        )));
    }

    let nadir = -camera_center.clone() / center_norm.clone();
    let cos_nadir = ray.dot(&nadir);
    if cos_nadir <= T::zero() {
        return Ok(ray.clone());
    }

    let axis = ray.cross(&nadir);
    let sin_nadir = axis.norm();
    if sin_nadir < lift(1e-12) {
        return Ok(ray.clone());
    }

    // Law of sines in the triangle earth center, camera, ground point.
    let sin_zenith = center_norm.clone() * sin_nadir.clone() / datum_radius.clone();
    if sin_zenith >= T::one() {
        return Ok(ray.clone());
    }
    let tan_zenith = sin_zenith.clone() / (T::one() - sin_zenith.clone() * sin_zenith).sqrt();

    // Slant range to the datum along the ray.
    let along = camera_center.dot(ray);
    let discriminant = along.clone() * along.clone() - center_norm.clone() * center_norm
        + datum_radius.clone() * datum_radius;
    if discriminant < T::zero() {
        return Ok(ray.clone());
    }
    let slant_range = -along - discriminant.sqrt();
    if slant_range <= T::zero() {
        return Ok(ray.clone());
    }

    let density: T = lift((-surface_elevation / ATMOSPHERE_SCALE_HEIGHT).exp());
    let ground_angle = lift::<T>(REFRACTION_CONSTANT) * density * tan_zenith;
    let camera_angle = ground_angle * lift(ATMOSPHERE_SCALE_HEIGHT) / slant_range;

    // Rotate about `axis` toward nadir. The axis is perpendicular to the ray,
    // so Rodrigues' formula reduces to two terms.
    let axis = axis / sin_nadir;
    let toward_nadir = axis.cross(ray);
    let corrected = ray * camera_angle.clone().cos() + toward_nadir * camera_angle.sin();
    Ok(corrected.normalize())
}

/// Removes velocity aberration from `ray`.
///
/// The relative velocity between camera and ground is the platform velocity
/// minus the Earth-rotation velocity of the sub-camera point on the sphere of
/// radius `earth_radius`. To first order the observed direction is shifted by
/// `v / c`, which is subtracted here.
///
/// # Errors
///
/// [`CameraModelError::PixelToRay`] if the camera is not above `earth_radius`.
pub fn apply_velocity_aberration_correction<T: RealField>(
    camera_center: &Vector3<T>,
    velocity: &Vector3<f64>,
    earth_radius: f64,
    ray: &Vector3<T>,
) -> Result<Vector3<T>, CameraModelError> {
    let radius: T = lift(earth_radius);
    let center_norm = camera_center.norm();
    if center_norm <= radius {
        return Err(CameraModelError::PixelToRay(format!(
            "velocity aberration needs the camera above the earth surface, camera radius {} <= {}",
            center_norm, earth_radius
        )));
    }

    let ground_point = camera_center * (radius / center_norm);
    let earth_spin = Vector3::new(T::zero(), T::zero(), lift(EARTH_ROTATION_RATE));
    let ground_velocity = earth_spin.cross(&ground_point);
    let relative_velocity = lift_vector3::<T>(velocity) - ground_velocity;

    let shift = relative_velocity / lift::<T>(SPEED_OF_LIGHT);
    Ok((ray - shift).normalize())
}
