//! Preview configuration
//!
//! Everything a host may reasonably want to tune without recompiling.
//! Stored as JSON; missing fields fall back to defaults so old config files
//! keep loading. Edge thresholds and rate smoothing are not here:
//! they are fixed constants of the pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// GPU adapter selection
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    /// Prefer the discrete GPU when there is one
    #[default]
    HighPerformance,
    /// Prefer the integrated GPU (battery-powered hosts)
    LowPower,
}

/// Settings used when the crate creates its own wgpu device
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    pub power_preference: PowerPreference,

    /// Accept a software adapter (useful on CI machines without a GPU)
    pub force_fallback_adapter: bool,

    /// Debug label attached to the device
    pub label: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: "Edge Preview Device".to_string(),
        }
    }
}

/// All tunables for one preview instance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    /// RGBA clear color painted behind the quad every frame
    pub clear_color: [f32; 4],

    pub gpu: GpuConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            // Dark grey, so an empty preview is distinguishable from an all-black edge map
            clear_color: [0.2, 0.2, 0.2, 1.0],
            gpu: GpuConfig::default(),
        }
    }
}

impl PreviewConfig {
    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file on disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write to a JSON file on disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
