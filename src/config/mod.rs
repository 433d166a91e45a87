//! Projection settings that live outside the camera file.
//!
//! Camera files describe the sensor and platform only. Which physical
//! corrections to apply and how hard to work on inverse projection are chosen
//! per run through a small YAML file:
//!
//! ```yaml
//! corrections:
//!   apply_atmospheric_refraction: true
//!   apply_velocity_aberration: false
//! solver:
//!   max_iterations: 500
//!   max_residual: 0.01
//! ```
//!
//! Every key is optional and falls back to its default.

use std::fs;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::camera::{CameraModelError, OpticalBarModel};
use crate::corrections::CorrectionFlags;
use crate::optimization::SolverSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub corrections: CorrectionFlags,
    pub solver: SolverSettings,
}

impl ProjectionConfig {
    /// Loads a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`] if the file cannot be read.
    /// * [`CameraModelError::YamlError`] if the content is not a valid configuration.
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, CameraModelError> {
        let config: ProjectionConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a YAML file.
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        let s = &self.solver;
        if s.max_iterations == 0 {
            return Err(CameraModelError::InvalidParams(
                "solver max_iterations must be at least 1".to_string(),
            ));
        }
        if [s.abs_tolerance, s.rel_tolerance, s.min_error, s.max_residual]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(CameraModelError::InvalidParams(
                "solver tolerances must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Copies the correction switches onto `model`.
    pub fn apply_to(&self, model: &mut OpticalBarModel) {
        model.corrections = self.corrections;
    }
}
