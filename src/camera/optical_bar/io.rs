//! Text camera file for the optical bar model.
//!
//! The format is line oriented and strictly ordered, one `key = value` per
//! line after a version tag and the camera type:
//!
//! ```text
//! VERSION_4
//! OPTICAL_BAR
//! image_size = 1000 500
//! image_center = 500 250
//! pitch = 1.0000000000000001e-05
//! f = 0.5
//! scan_angle = 0.10000000000000001
//! scan_rate = 0.050000000000000003
//! forward_tilt = 0
//! iC = 7000000 0 0
//! iR = 1 0 0 0 1 0 0 0 1
//! speed = 7500
//! mean_earth_radius = 6371000
//! mean_surface_elevation = 0
//! use_motion_compensation = 0
//! scan_dir = left
//! ```
//!
//! The orientation is stored as a row-major rotation matrix so files stay
//! readable by tools that share the pinhole `.tsai` layout. `scan_dir = right`
//! means the sweep travels rightward (left to right); a missing or unknown
//! `scan_dir` line is read as rightward.

use std::fs;
use std::io::Write;
use std::str::FromStr;

use log::info;
use nalgebra::{Matrix3, Vector2, Vector3};

use crate::camera::{CameraModel, CameraModelError, Resolution};
use crate::corrections::CorrectionFlags;
use crate::geometry::{matrix_to_quaternion, quaternion_to_axis_angle};

use super::OpticalBarModel;

/// Oldest camera file version this reader accepts.
pub const MIN_SUPPORTED_VERSION: i64 = 4;

/// Version tag written by [`write_optical_bar`].
pub const CURRENT_VERSION: i64 = 4;

/// Digits needed for a `f64` to survive a text round trip.
const ACCURATE_DIGITS: usize = 17;

/// Sequential reader over the lines of a camera file.
struct FieldReader<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> FieldReader<'a> {
    fn new(contents: &'a str) -> Self {
        FieldReader {
            lines: contents.lines(),
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        self.lines.next()
    }

    /// Parses the next line as `key = v1 v2 ...` with exactly `N` leading values.
    ///
    /// Extra trailing tokens are ignored. Any other mismatch reports `field`.
    fn values<T: FromStr, const N: usize>(
        &mut self,
        key: &str,
        field: &'static str,
    ) -> Result<[T; N], CameraModelError> {
        let line = self
            .next_line()
            .ok_or(CameraModelError::MissingField(field))?;
        let rest = line
            .trim_start()
            .strip_prefix(key)
            .and_then(|rest| rest.trim_start().strip_prefix('='))
            .ok_or(CameraModelError::MissingField(field))?;

        let mut tokens = rest.split_whitespace();
        let mut parsed = Vec::with_capacity(N);
        for _ in 0..N {
            let value = tokens
                .next()
                .and_then(|token| token.parse::<T>().ok())
                .ok_or(CameraModelError::MissingField(field))?;
            parsed.push(value);
        }
        parsed
            .try_into()
            .map_err(|_| CameraModelError::MissingField(field))
    }

    fn value<T: FromStr>(&mut self, key: &str, field: &'static str) -> Result<T, CameraModelError> {
        let [value] = self.values::<T, 1>(key, field)?;
        Ok(value)
    }
}

/// Parses the text of an optical bar camera file.
///
/// # Errors
///
/// * [`CameraModelError::MissingField`] naming the first field that is missing,
///   malformed or out of order.
/// * [`CameraModelError::UnsupportedVersion`] for versions below 4.
/// * [`CameraModelError::WrongCameraType`] if the type line is not `OPTICAL_BAR`.
/// * Errors from `validate_params` if the stored parameters are invalid.
pub fn parse_optical_bar(contents: &str) -> Result<OpticalBarModel, CameraModelError> {
    let mut reader = FieldReader::new(contents);

    let version_line = reader
        .next_line()
        .filter(|line| line.contains("VERSION"))
        .ok_or(CameraModelError::MissingField("version"))?;
    let version = version_line
        .trim()
        .strip_prefix("VERSION_")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or(CameraModelError::MissingField("version"))?;
    if version < MIN_SUPPORTED_VERSION {
        return Err(CameraModelError::UnsupportedVersion(version));
    }

    let type_line = reader.next_line().unwrap_or_default();
    if !type_line.contains("OPTICAL_BAR") {
        return Err(CameraModelError::WrongCameraType(type_line.trim().to_string()));
    }

    let [width, height] = reader.values::<u32, 2>("image_size", "image size")?;
    let [cx, cy] = reader.values::<f64, 2>("image_center", "image center")?;
    let pixel_size = reader.value::<f64>("pitch", "pixel pitch")?;
    let focal_length = reader.value::<f64>("f", "focal length")?;
    let scan_angle_radians = reader.value::<f64>("scan_angle", "scan angle")?;
    let scan_rate_radians = reader.value::<f64>("scan_rate", "scan rate")?;
    let forward_tilt_radians = reader.value::<f64>("forward_tilt", "forward tilt angle")?;
    let [x, y, z] = reader.values::<f64, 3>("iC", "initial position")?;
    let r = reader.values::<f64, 9>("iR", "rotation matrix")?;
    let speed = reader.value::<f64>("speed", "speed")?;
    let mean_earth_radius = reader.value::<f64>("mean_earth_radius", "mean earth radius")?;
    let mean_surface_elevation =
        reader.value::<f64>("mean_surface_elevation", "mean surface elevation")?;
    let use_motion_compensation =
        reader.value::<i64>("use_motion_compensation", "use motion compensation")?;
    let scan_left_to_right = !reader
        .next_line()
        .is_some_and(|line| line.contains("scan_dir = left"));

    let rotation = Matrix3::from_row_slice(&r);
    let initial_orientation = quaternion_to_axis_angle(&matrix_to_quaternion(&rotation));

    let model = OpticalBarModel {
        resolution: Resolution { width, height },
        center_loc_pixels: Vector2::new(cx, cy),
        pixel_size,
        focal_length,
        scan_angle_radians,
        scan_rate_radians,
        forward_tilt_radians,
        initial_position: Vector3::new(x, y, z),
        initial_orientation,
        speed,
        mean_earth_radius,
        mean_surface_elevation,
        use_motion_compensation: use_motion_compensation != 0,
        scan_left_to_right,
        corrections: CorrectionFlags::default(),
    };
    model.validate_params()?;
    Ok(model)
}

/// Formats `model` as the text of an optical bar camera file.
///
/// The rotation is taken from the pose at pixel (0, 0). The pose does not vary
/// across the image, so this equals `initial_orientation`.
pub fn format_optical_bar(model: &OpticalBarModel) -> String {
    let p = ACCURATE_DIGITS - 1;
    let num = |v: f64| format_accurate(v, p);
    let rot = model
        .camera_pose(&Vector2::new(0.0, 0.0))
        .to_rotation_matrix()
        .into_inner();

    let mut out = String::new();
    out.push_str(&format!("VERSION_{CURRENT_VERSION}\n"));
    out.push_str("OPTICAL_BAR\n");
    out.push_str(&format!(
        "image_size = {} {}\n",
        model.resolution.width, model.resolution.height
    ));
    out.push_str(&format!(
        "image_center = {} {}\n",
        num(model.center_loc_pixels.x),
        num(model.center_loc_pixels.y)
    ));
    out.push_str(&format!("pitch = {}\n", num(model.pixel_size)));
    out.push_str(&format!("f = {}\n", num(model.focal_length)));
    out.push_str(&format!("scan_angle = {}\n", num(model.scan_angle_radians)));
    out.push_str(&format!("scan_rate = {}\n", num(model.scan_rate_radians)));
    out.push_str(&format!("forward_tilt = {}\n", num(model.forward_tilt_radians)));
    out.push_str(&format!(
        "iC = {} {} {}\n",
        num(model.initial_position.x),
        num(model.initial_position.y),
        num(model.initial_position.z)
    ));
    let rows: Vec<String> = (0..3)
        .flat_map(|i| (0..3).map(move |j| (i, j)))
        .map(|(i, j)| num(rot[(i, j)]))
        .collect();
    out.push_str(&format!("iR = {}\n", rows.join(" ")));
    out.push_str(&format!("speed = {}\n", num(model.speed)));
    out.push_str(&format!(
        "mean_earth_radius = {}\n",
        num(model.mean_earth_radius)
    ));
    out.push_str(&format!(
        "mean_surface_elevation = {}\n",
        num(model.mean_surface_elevation)
    ));
    out.push_str(&format!(
        "use_motion_compensation = {}\n",
        u8::from(model.use_motion_compensation)
    ));
    if model.scan_left_to_right {
        out.push_str("scan_dir = right\n");
    } else {
        out.push_str("scan_dir = left\n");
    }
    out
}

/// Formats `value` with `precision + 1` significant digits, dropping
/// trailing zeros, like `%.17g`.
fn format_accurate(value: f64, precision: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let exponent = value.abs().log10().floor() as i32;
    if exponent < -4 || exponent > precision as i32 {
        let text = format!("{value:.precision$e}");
        match text.split_once('e') {
            Some((mantissa, exp)) => {
                let mantissa = trim_fraction(mantissa);
                let exp: i32 = exp.parse().unwrap_or(0);
                format!("{mantissa}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
            }
            None => text,
        }
    } else {
        let decimals = (precision as i32 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Reads an optical bar camera file.
pub fn read_optical_bar(path: &str) -> Result<OpticalBarModel, CameraModelError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CameraModelError::IOError(format!("Could not open camera file {path}: {e}"))
    })?;
    let model = parse_optical_bar(&contents)?;
    info!("Loaded optical bar camera from {path}");
    Ok(model)
}

/// Writes an optical bar camera file, replacing any existing file.
///
/// The file is written in place; a failure part way through can leave a
/// truncated file behind.
pub fn write_optical_bar(model: &OpticalBarModel, path: &str) -> Result<(), CameraModelError> {
    let mut file = fs::File::create(path).map_err(|e| {
        CameraModelError::IOError(format!("Could not open camera file {path}: {e}"))
    })?;
    file.write_all(format_optical_bar(model).as_bytes())?;
    info!("Wrote optical bar camera to {path}");
    Ok(())
}
