//! Engine configuration.
//!
//! Loaded from JSON, with a handful of environment overrides that match the
//! variables the playback application has always honored.

use crate::error::{IpError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var that disables LUT reuse between nodes when set.
pub const ENV_NO_LUT_REUSE: &str = "RV_NO_LUT_REUSE";

/// Env var holding a `:`-separated LUT search path.
pub const ENV_LUT_PATH: &str = "RV_LUT_PATH";

/// GPU budgets used when deciding whether images can share a shader pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_buffers: usize,
    pub max_coords: usize,
    pub max_fetches: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_buffers: 8,
            max_coords: 8,
            max_fetches: 81,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LutConfig {
    /// Share parsed LUT data between nodes loading the same file.
    pub reuse: bool,
    /// Directories searched for relative LUT file names.
    pub search_path: Vec<PathBuf>,
    /// Resolution of the pre-LUT channel tables.
    pub prelut_size: usize,
}

impl Default for LutConfig {
    fn default() -> Self {
        Self {
            reuse: true,
            search_path: Vec::new(),
            prelut_size: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Whether the renderer accepts float textures for LUT data.
    pub float_textures: bool,
    /// Frame rate used by `context_for_frame` when nothing else is known.
    pub default_fps: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            float_textures: true,
            default_fps: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Top-level configuration shared by every node through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resources: ResourceLimits,
    pub lut: LutConfig,
    pub render: RenderConfig,
    pub audio: AudioConfig,
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `RV_NO_LUT_REUSE` and `RV_LUT_PATH`.
    pub fn apply_env(&mut self) {
        if std::env::var_os(ENV_NO_LUT_REUSE).is_some() {
            debug!("{} set, LUT reuse disabled", ENV_NO_LUT_REUSE);
            self.lut.reuse = false;
        }
        if let Ok(path) = std::env::var(ENV_LUT_PATH) {
            self.lut.search_path = path
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
            debug!("LUT search path: {:?}", self.lut.search_path);
        }
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| IpError::Serialization(format!("invalid engine config: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| IpError::Serialization(format!("failed to write engine config: {}", e)))
    }

    /// Read a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&data)?;
        debug!("loaded engine config from {}", path.display());
        config.apply_env();
        Ok(config)
    }
}
