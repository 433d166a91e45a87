//! Objective for projecting a 3D point into an optical bar image.
//!
//! For a candidate pixel the residual is the difference between the ray the
//! pixel observes and the direction from that pixel's camera center to the
//! point. Both depend on the pixel through the scan timing, so there is no
//! closed form and the residual is handed to a nonlinear solver.

use nalgebra::{DVector, RealField, Vector2, Vector3};

use crate::camera::{CameraModelError, OpticalBarModel};
use crate::geometry::{lift, lift_vector3};
use crate::optimization::ResidualObjective;

/// Residual reported where the forward model is undefined.
const FAILED_RESIDUAL: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct PointToPixelObjective {
    model: OpticalBarModel,
    point: Vector3<f64>,
    /// Converts ray differences to roughly pixel sized units.
    scale: f64,
}

impl PointToPixelObjective {
    pub const RESIDUAL_DIM: usize = 3;

    pub fn new(model: OpticalBarModel, point: Vector3<f64>) -> Self {
        let scale = model.focal_length / model.pixel_size;
        PointToPixelObjective {
            model,
            point,
            scale,
        }
    }

    fn residual_checked<T: RealField>(
        &self,
        pixel: &Vector2<T>,
    ) -> Result<Vector3<T>, CameraModelError> {
        let ray = self.model.pixel_to_vector_generic(pixel)?;
        let center = self.model.camera_center_generic(pixel);
        let to_point = lift_vector3::<T>(&self.point) - center;
        if to_point.norm() <= T::zero() {
            return Err(CameraModelError::PointToPixel(
                "point coincides with the camera center".to_string(),
            ));
        }
        Ok((ray - to_point.normalize()) * lift::<T>(self.scale))
    }

    /// Residual at `pixel`, reporting forward projection failures.
    pub fn evaluate(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        self.residual_checked(pixel)
    }
}

impl ResidualObjective for PointToPixelObjective {
    fn residual_dim(&self) -> usize {
        Self::RESIDUAL_DIM
    }

    fn residual<T: RealField>(&self, params: &DVector<T>) -> DVector<T> {
        let pixel = Vector2::new(params[0].clone(), params[1].clone());
        match self.residual_checked(&pixel) {
            Ok(r) => DVector::from_column_slice(r.as_slice()),
            Err(_) => DVector::from_element(Self::RESIDUAL_DIM, lift(FAILED_RESIDUAL)),
        }
    }
}
