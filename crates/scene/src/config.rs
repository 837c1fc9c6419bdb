use crate::error::ConfigError;
use glam::Vec3;
use rasterscene_common::FilteringMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How an object's vertices reach clip space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformStrategy {
    /// The vertex stage multiplies by the uploaded world-view-projection.
    #[default]
    GpuMatrices,
    /// Vertices are transformed on the CPU and re-uploaded every frame.
    CpuBake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub origin: Vec3,
    pub near: f32,
    pub far: f32,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per mouse count.
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            origin: Vec3::new(0.0, 0.0, -50.0),
            near: 0.1,
            far: 100.0,
            move_speed: 13.0,
            mouse_sensitivity: 0.006,
        }
    }
}

/// Scene settings, usually loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub camera: CameraConfig,
    pub clear_color: [f32; 4],
    /// Auto-rotation speed in radians per second.
    pub rotation_speed: f32,
    pub transform_strategy: TransformStrategy,
    /// Filtering tier every material starts in.
    pub filtering: FilteringMethod,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            clear_color: [0.0, 0.0, 0.3, 1.0],
            rotation_speed: 1.0,
            transform_strategy: TransformStrategy::default(),
            filtering: FilteringMethod::default(),
        }
    }
}

impl SceneConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(?path, "loaded scene config");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_degrees must lie in (0, 180), got {}",
                camera.fov_degrees
            )));
        }
        if !camera.near.is_finite() || !camera.far.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "camera planes must be finite, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if !(camera.near > 0.0 && camera.near < camera.far) {
            return Err(ConfigError::Invalid(format!(
                "camera planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if !camera.origin.is_finite() {
            return Err(ConfigError::Invalid("camera.origin must be finite".into()));
        }
        for (name, value) in [
            ("camera.move_speed", camera.move_speed),
            ("camera.mouse_sensitivity", camera.mouse_sensitivity),
            ("rotation_speed", self.rotation_speed),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }
        Ok(())
    }
}

/// Size of the render target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; 1.0 while the target is degenerate.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}
