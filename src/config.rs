// =============================================================================
// CONFIGURATION - Load settings from swaploop.toml
// =============================================================================
//
// This module handles loading and parsing configuration from swaploop.toml.
// A missing file means defaults; every section and key is optional.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::context::ContextInfo;
use crate::frame_loop::FRAMES_IN_FLIGHT;
use crate::logging::LogSettings;

pub const DEFAULT_PATH: &str = "swaploop.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "swaploop".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            frames_in_flight: FRAMES_IN_FLIGHT,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub layers: Vec<String>,
    pub log_verbose: bool,
    pub log_quiet: bool,
    pub log_to_file: bool,
    pub log_file: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            log_verbose: false,
            log_quiet: false,
            log_to_file: false,
            log_file: LogSettings::default().file,
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            verbose: self.debug.log_verbose,
            quiet: self.debug.log_quiet,
            to_file: self.debug.log_to_file,
            file: self.debug.log_file.clone(),
        }
    }

    /// Build a context description; `extensions` come from the window system.
    pub fn context_info(&self, extensions: Vec<CString>) -> Result<ContextInfo> {
        let layers = self
            .debug
            .layers
            .iter()
            .map(|l| CString::new(l.as_str()).with_context(|| format!("Invalid layer name {:?}", l)))
            .collect::<Result<Vec<_>>>()?;

        Ok(ContextInfo {
            extensions,
            layers,
            enable_validation: self.debug.validation_layers,
            log: self.log_settings(),
            frames_in_flight: self.graphics.frames_in_flight,
            preferred_present_mode: self.present_mode(),
            clear_color: self.graphics.clear_color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.graphics.frames_in_flight, 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "FIFO"
            frames_in_flight = 3

            [debug]
            log_verbose = true
            layers = []
            "#,
        )
        .unwrap();

        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.1, 0.1, 0.1, 1.0]);

        let info = config.context_info(Vec::new()).unwrap();
        assert_eq!(info.frames_in_flight, 3);
        assert!(info.layers.is_empty());
        assert!(info.log.verbose);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let mut config = Config::default();
        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn layer_names_with_nul_are_rejected() {
        let mut config = Config::default();
        config.debug.layers = vec!["bad\0layer".to_string()];
        assert!(config.context_info(Vec::new()).is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.title, "swaploop");
    }
}
