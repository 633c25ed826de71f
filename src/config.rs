//! Engine configuration injected into deformers at construction.

use std::path::Path;

use anyhow::Context;

use crate::foundation::error::{DeformError, DeformResult};

/// Physics integration limits shared by every chain driver.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Upper bound on simulated seconds integrated by a single `step` call.
    pub max_catch_up_secs: f64,
    /// Fixed sub-step length in seconds.
    pub sub_step: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_catch_up_secs: 10.0,
            sub_step: 0.01,
        }
    }
}

/// Tunables for the deformation engine.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let cfg = marionette::EngineConfig::from_json_str(r#"{ "debug_trace": true }"#).unwrap();
/// assert!(cfg.debug_trace);
/// assert_eq!(cfg.invalid_disable_threshold, 10);
/// ```
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit per-index `debug!` traces for every invalid value, not only the first of a streak.
    pub debug_trace: bool,
    /// A physics driver is disabled once more than this many consecutive frames were invalid.
    pub invalid_disable_threshold: u32,
    /// Brute-force resolution of the closest-point projection on curves.
    pub closest_point_samples: usize,
    /// Chain physics limits.
    pub physics: PhysicsConfig,
    /// Offsets whose largest component exceeds this value emit a warning.
    pub large_offset_warning: f64,
    /// Largest mesh-group ownership mask, in cells. Bigger meshes look owners up per triangle.
    pub max_mask_cells: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug_trace: false,
            invalid_disable_threshold: 10,
            closest_point_samples: 100,
            physics: PhysicsConfig::default(),
            large_offset_warning: 10.0,
            max_mask_cells: 1 << 22,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(s: &str) -> DeformResult<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> DeformResult<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read engine config '{}'", path.display()))
            .map_err(DeformError::from)?;
        Self::from_json_str(&s)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> DeformResult<()> {
        if self.closest_point_samples == 0 {
            return Err(DeformError::validation(
                "closest_point_samples must be > 0",
            ));
        }
        if !(self.physics.sub_step.is_finite() && self.physics.sub_step > 0.0) {
            return Err(DeformError::validation("physics.sub_step must be > 0"));
        }
        if !(self.physics.max_catch_up_secs.is_finite() && self.physics.max_catch_up_secs >= 0.0) {
            return Err(DeformError::validation(
                "physics.max_catch_up_secs must be finite and >= 0",
            ));
        }
        if !self.large_offset_warning.is_finite() {
            return Err(DeformError::validation(
                "large_offset_warning must be finite",
            ));
        }
        if self.max_mask_cells == 0 {
            return Err(DeformError::validation("max_mask_cells must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
