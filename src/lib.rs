//! Optical Bar Camera Library
//!
//! A Rust library for the optical bar camera, the panoramic film camera of
//! early reconnaissance satellites. A lens rotates about the flight axis and
//! sweeps the image across curved film one column at a time, so every column
//! is exposed from a different position. This library provides:
//! - Forward projection from pixels to rays in the global frame
//! - Inverse projection from 3D points to pixels through a nonlinear solver
//! - Optional atmospheric refraction and velocity aberration corrections
//! - Reading and writing the `.tsai` camera file format
//! - Re-posing a camera with a similarity transform
//!
//! Inverse projection uses the Levenberg-Marquardt optimizer of the
//! tiny-solver framework.

pub mod camera;
pub mod config;
pub mod corrections;
pub mod geometry;
pub mod optimization;
pub mod util;

// Re-export commonly used types
pub use camera::{CameraModel, CameraModelError, OpticalBarModel, Resolution};
pub use config::ProjectionConfig;
pub use corrections::CorrectionFlags;
pub use optimization::{LevenbergMarquardt, NonlinearSolver, SolverSettings};
