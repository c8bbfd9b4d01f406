//! Session configuration, read once at startup from a TOML settings file.
//!
//! Every section uses `#[serde(default)]`, so a partial file (say, only a
//! `[sensitivity]` table) resolves all missing names to their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::controller::KeyBindings;
use crate::error::ConfigError;

/// Projection and default-view parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Tilt applied by a view reset.
    pub default_pitch_degrees: f32,
    /// Distance of the model from the eye after a reset.
    pub default_distance: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            default_pitch_degrees: 30.0,
            default_distance: 4.0,
        }
    }
}

/// Input-to-motion factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivitySettings {
    /// Keyboard motion, units (or radians) per second.
    pub movement: f32,
    /// Multiplier applied by `SpeedUp`, divisor applied by `SlowDown`.
    pub modifier_factor: f32,
    /// Left-drag yaw, degrees per pixel.
    pub x_rotate: f32,
    /// Left-drag pitch, degrees per pixel.
    pub y_rotate: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    /// Relative scale change per wheel line.
    pub zoom: f32,
    /// Window height at which pan speed is unadjusted.
    pub reference_height: f32,
    /// Field of view at which pan speed is unadjusted.
    pub reference_fov: f32,
}

impl Default for SensitivitySettings {
    fn default() -> Self {
        Self {
            movement: 1.0,
            modifier_factor: 3.0,
            x_rotate: 1.0,
            y_rotate: 1.0,
            pan_x: 0.01,
            pan_y: 0.01,
            zoom: 0.1,
            reference_height: 480.0,
            reference_fov: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("assets/shaders/ads.vert.wgsl"),
            fragment: PathBuf::from("assets/shaders/ads.frag.wgsl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory primitive shapes are loaded from by name.
    pub primitives: PathBuf,
    /// Directory screenshots are written to.
    pub screenshots: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            primitives: PathBuf::from("assets/primitives"),
            screenshots: PathBuf::from("screenshots"),
        }
    }
}

/// Ambient/diffuse/specular material and light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingSettings {
    pub light_position: [f32; 3],
    pub ka: f32,
    pub kd: f32,
    pub ks: f32,
    /// Ambient/diffuse colour; also the constant colour of meshes without
    /// per-vertex colours.
    pub ad_color: [f32; 4],
    pub specular_color: [f32; 4],
    pub shininess: f32,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            light_position: [1.0, 1.0, -1.0],
            ka: 0.30,
            kd: 0.40,
            ks: 0.35,
            ad_color: [0.0, 1.0, 0.0, 1.0],
            specular_color: [1.0, 1.0, 1.0, 1.0],
            shininess: 1.0,
        }
    }
}

/// Free-form values forwarded to every custom shader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserUniforms {
    pub mat4: [[f32; 4]; 4],
    pub vec3: [f32; 3],
    pub vec4: [f32; 4],
    pub float: f32,
    pub int: i32,
}

impl Default for UserUniforms {
    fn default() -> Self {
        Self {
            mat4: glam::Mat4::IDENTITY.to_cols_array_2d(),
            vec3: [0.5, 0.5, 0.0],
            vec4: [1.0, 1.0, 1.0, 1.0],
            float: 0.0,
            int: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title: "Model Viewer".to_string(),
        }
    }
}

/// Immutable per-session configuration. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraSettings,
    pub sensitivity: SensitivitySettings,
    pub keys: KeyBindings,
    pub shaders: ShaderSettings,
    pub paths: PathSettings,
    pub lighting: LightingSettings,
    pub user_uniforms: UserUniforms,
    pub window: WindowSettings,
}

impl ViewerConfig {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: ViewerConfig = toml::from_str(text)?;
        config.keys.rebuild();
        Ok(config)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load settings, falling back to defaults when the file is absent or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("loaded settings from {:?}", path);
                config
            }
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no settings file at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::LogicalKey;

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config = ViewerConfig::from_toml(
            r#"
            [sensitivity]
            movement = 4.0

            [camera]
            fov_degrees = 60.0
            "#,
        )
        .unwrap();

        assert_eq!(config.sensitivity.movement, 4.0);
        assert_eq!(config.sensitivity.pan_x, 0.01);
        assert_eq!(config.camera.fov_degrees, 60.0);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.lighting, LightingSettings::default());
    }

    #[test]
    fn test_rebinding_one_key_keeps_the_others() {
        let config = ViewerConfig::from_toml(
            r#"
            [keys.bindings]
            StrafeLeft = "KeyJ"
            "#,
        )
        .unwrap();

        assert_eq!(config.keys.resolve("KeyJ"), Some(LogicalKey::StrafeLeft));
        assert_eq!(config.keys.resolve("KeyA"), None);
        assert_eq!(config.keys.resolve("KeyD"), Some(LogicalKey::StrafeRight));
        assert_eq!(config.keys.physical(LogicalKey::StrafeLeft), Some("KeyJ"));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let err = ViewerConfig::from_toml("[camera\nfov_degrees = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load_or_default(&dir.path().join("viewer.toml"));
        assert_eq!(config, ViewerConfig::default());
    }
}
