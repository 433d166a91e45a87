//! Rotation and scalar helpers shared by the camera models.
//!
//! The projection code is generic over [`RealField`] so that the same
//! geometry can be evaluated with plain `f64` or with dual numbers during
//! optimization. The helpers here lift constant `f64` parameters into that
//! field and build the few rotations the models need.

use nalgebra::{Matrix3, RealField, Rotation3, UnitQuaternion, Vector2, Vector3};

/// Lifts a constant `f64` into the real field `T`.
#[inline]
pub fn lift<T: RealField>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Lifts a constant 2-vector into the real field `T`.
pub fn lift_vector2<T: RealField>(v: &Vector2<f64>) -> Vector2<T> {
    v.map(lift::<T>)
}

/// Lifts a constant 3-vector into the real field `T`.
pub fn lift_vector3<T: RealField>(v: &Vector3<f64>) -> Vector3<T> {
    v.map(lift::<T>)
}

/// Lifts a constant 3x3 matrix into the real field `T`.
pub fn lift_matrix3<T: RealField>(m: &Matrix3<f64>) -> Matrix3<T> {
    m.map(lift::<T>)
}

/// Rotation of `angle` radians about the x axis.
///
/// ```text
/// | 1    0       0    |
/// | 0  cos(a) -sin(a) |
/// | 0  sin(a)  cos(a) |
/// ```
pub fn rotation_x_axis(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Converts an axis-angle vector (axis scaled by the angle) to a unit quaternion.
pub fn axis_angle_to_quaternion(axis_angle: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*axis_angle)
}

/// Converts a unit quaternion back to its axis-angle vector.
pub fn quaternion_to_axis_angle(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    q.scaled_axis()
}

/// Converts a 3x3 rotation matrix to a unit quaternion.
///
/// The matrix is projected onto the closest rotation first, so text round
/// trips that lose the last bit of orthonormality still produce a valid pose.
pub fn matrix_to_quaternion(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let rotation = Rotation3::from_matrix(m);
    UnitQuaternion::from_rotation_matrix(&rotation)
}

/// Returns `true` when `m` is orthonormal with determinant +1 within `tolerance`.
pub fn is_rotation_matrix(m: &Matrix3<f64>, tolerance: f64) -> bool {
    let should_be_identity = m.transpose() * m;
    (should_be_identity - Matrix3::identity()).abs().max() < tolerance
        && (m.determinant() - 1.0).abs() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_rotation_x_axis_quarter_turn() {
        let m = rotation_x_axis(FRAC_PI_2);
        let rotated = m * Vector3::new(0.0, 1.0, 0.0);
        assert_relative_eq!(rotated, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert!(is_rotation_matrix(&m, 1e-12));
    }

    #[test]
    fn test_axis_angle_matrix_round_trip() {
        let axis_angle = Vector3::new(0.1, -0.4, 0.25);
        let q = axis_angle_to_quaternion(&axis_angle);
        let m = q.to_rotation_matrix().into_inner();

        let recovered = quaternion_to_axis_angle(&matrix_to_quaternion(&m));
        assert_relative_eq!(recovered, axis_angle, epsilon = 1e-12);
    }

    #[test]
    fn test_lift_preserves_values() {
        let v = Vector3::new(1.5, -2.0, 7.0e6);
        let lifted: Vector3<f64> = lift_vector3(&v);
        assert_eq!(lifted, v);
        assert_eq!(lift::<f64>(0.25), 0.25);
    }

    #[test]
    fn test_is_rotation_matrix_rejects_scaled() {
        let m = Matrix3::identity() * 2.0;
        assert!(!is_rotation_matrix(&m, 1e-9));
    }
}
