//! 从 TOML 读取的渲染配置
//!
//! ```toml
//! frames_in_flight = 2
//! log_level = "debug"
//!
//! [frame]
//! width = 1280
//! height = 720
//! color_format = "R8G8B8A8_UNORM"
//! depth_format = "D32_SFLOAT"
//!
//! [descriptor_pool]
//! max_sets = 64
//! ```
//! 没有出现的字段使用默认值。

use std::fs;
use std::path::{Path, PathBuf};

use ash::vk;
use serde::{Deserialize, Serialize};

use vela_gfx::foundation::device::GfxDescriptorPoolSizes;

use crate::frame_counter::FrameCounter;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// 离屏渲染目标的尺寸与格式
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub width: u32,
    pub height: u32,
    /// Vulkan 格式名，去掉 `VK_FORMAT_` 前缀，例如 `R8G8B8A8_UNORM`
    pub color_format: String,
    pub depth_format: String,
}
impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            color_format: "R8G8B8A8_UNORM".to_string(),
            depth_format: "D32_SFLOAT".to_string(),
        }
    }
}
impl FrameSettings {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    pub fn color_format(&self) -> Result<vk::Format, SettingsError> {
        parse_format(&self.color_format)
    }

    pub fn depth_format(&self) -> Result<vk::Format, SettingsError> {
        parse_format(&self.depth_format)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub frames_in_flight: usize,
    pub log_level: String,
    pub frame: FrameSettings,
    pub descriptor_pool: GfxDescriptorPoolSizes,
}
impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            log_level: "info".to_string(),
            frame: FrameSettings::default(),
            descriptor_pool: GfxDescriptorPoolSizes::default(),
        }
    }
}
// new & init
impl RenderSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        log::info!("render settings loaded from {path:?}");
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
// tools
impl RenderSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fif_range = FrameCounter::MIN_FIF_COUNT..=FrameCounter::MAX_FIF_COUNT;
        if !fif_range.contains(&self.frames_in_flight) {
            return Err(SettingsError::Invalid(format!(
                "frames_in_flight must be in {fif_range:?}, got {}",
                self.frames_in_flight
            )));
        }
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(SettingsError::Invalid(format!(
                "frame extent {}x{} is empty",
                self.frame.width, self.frame.height
            )));
        }
        if self.descriptor_pool.max_sets == 0 {
            return Err(SettingsError::Invalid("descriptor_pool.max_sets is zero".to_string()));
        }
        self.frame.color_format()?;
        self.frame.depth_format()?;
        self.log_level.parse::<log::LevelFilter>().map_err(|_| {
            SettingsError::Invalid(format!("unknown log level `{}`", self.log_level))
        })?;
        Ok(())
    }

    #[inline]
    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// 只支持渲染目标常用的格式
pub fn parse_format(name: &str) -> Result<vk::Format, SettingsError> {
    let format = match name.trim().trim_start_matches("VK_FORMAT_").to_ascii_uppercase().as_str() {
        "R8G8B8A8_UNORM" => vk::Format::R8G8B8A8_UNORM,
        "R8G8B8A8_SRGB" => vk::Format::R8G8B8A8_SRGB,
        "B8G8R8A8_UNORM" => vk::Format::B8G8R8A8_UNORM,
        "B8G8R8A8_SRGB" => vk::Format::B8G8R8A8_SRGB,
        "A2B10G10R10_UNORM_PACK32" => vk::Format::A2B10G10R10_UNORM_PACK32,
        "R16G16B16A16_SFLOAT" => vk::Format::R16G16B16A16_SFLOAT,
        "R32G32B32A32_SFLOAT" => vk::Format::R32G32B32A32_SFLOAT,
        "D16_UNORM" => vk::Format::D16_UNORM,
        "D32_SFLOAT" => vk::Format::D32_SFLOAT,
        "D24_UNORM_S8_UINT" => vk::Format::D24_UNORM_S8_UINT,
        "D32_SFLOAT_S8_UINT" => vk::Format::D32_SFLOAT_S8_UINT,
        _ => return Err(SettingsError::Invalid(format!("unsupported format `{name}`"))),
    };
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = RenderSettings::from_toml_str(
            r#"
            frames_in_flight = 3

            [frame]
            width = 64
            color_format = "VK_FORMAT_B8G8R8A8_SRGB"

            [descriptor_pool]
            max_sets = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.frame.extent(), vk::Extent2D { width: 64, height: 720 });
        assert_eq!(settings.frame.color_format().unwrap(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(settings.descriptor_pool.max_sets, 8);
        assert_eq!(settings.descriptor_pool.uniform_buffers, GfxDescriptorPoolSizes::default().uniform_buffers);
        assert_eq!(settings.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_invalid_settings() {
        let err = RenderSettings::from_toml_str("frames_in_flight = 4").err().unwrap();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = RenderSettings::from_toml_str("[frame]\ndepth_format = \"ASTC\"").err().unwrap();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = RenderSettings::from_toml_str("frames_in_flight = \"two\"").err().unwrap();
        assert!(matches!(err, SettingsError::Parse(_)));

        let err = RenderSettings::from_file("/nonexistent/vela.toml").err().unwrap();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = RenderSettings {
            log_level: "trace".to_string(),
            ..Default::default()
        };
        let text = settings.to_toml_string().unwrap();
        assert_eq!(RenderSettings::from_toml_str(&text).unwrap(), settings);
    }
}
