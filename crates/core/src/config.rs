//! Renderer configuration.
//!
//! Configuration is a plain struct read once at startup. The only external
//! source is the process environment (`VISTA_*` variables); anything that
//! parses files lives outside the renderer and pushes values in.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Error, Result};

/// Smallest window the renderer accepts.
pub const MIN_WINDOW_WIDTH: u32 = 640;
pub const MIN_WINDOW_HEIGHT: u32 = 480;

/// How the renderer reacts to a failure while a frame is being recorded.
///
/// Once recording starts, the frame is always closed and submitted; the
/// policy only decides what the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and keep going with a degraded frame.
    #[default]
    Lenient,
    /// Log the failure, finish the frame, then return the first error from `end_frame`.
    Strict,
    /// Log the failure and panic on the spot.
    Trap,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            "trap" => Ok(Self::Trap),
            other => Err(Error::Config(format!("unknown failure policy '{other}'"))),
        }
    }
}

/// Startup configuration for the window and renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Initial window width in pixels.
    pub width: u32,
    /// Initial window height in pixels.
    pub height: u32,
    /// Number of frame slots (2 or 3).
    pub frames_in_flight: usize,
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
    /// MSAA sample count; 1 disables multisampling.
    pub msaa_samples: u32,
    /// Enable the graphics API validation layer.
    pub debug_validation: bool,
    /// Reaction to mid-frame failures.
    pub failure_policy: FailurePolicy,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames_in_flight: 3,
            vsync: true,
            msaa_samples: 1,
            debug_validation: cfg!(debug_assertions),
            failure_policy: FailurePolicy::default(),
            shader_dir: PathBuf::from("shaders/spirv"),
        }
    }
}

impl RendererConfig {
    /// Defaults with `VISTA_*` environment overrides applied, then validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup.
    ///
    /// Recognized keys: `VISTA_WIDTH`, `VISTA_HEIGHT`, `VISTA_FRAMES_IN_FLIGHT`,
    /// `VISTA_VSYNC`, `VISTA_MSAA`, `VISTA_VALIDATION`, `VISTA_FAILURE_POLICY`,
    /// `VISTA_SHADER_DIR`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VISTA_WIDTH") {
            self.width = parse_number("VISTA_WIDTH", &v)?;
        }
        if let Some(v) = lookup("VISTA_HEIGHT") {
            self.height = parse_number("VISTA_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("VISTA_FRAMES_IN_FLIGHT") {
            self.frames_in_flight = parse_number("VISTA_FRAMES_IN_FLIGHT", &v)?;
        }
        if let Some(v) = lookup("VISTA_VSYNC") {
            self.vsync = parse_flag("VISTA_VSYNC", &v)?;
        }
        if let Some(v) = lookup("VISTA_MSAA") {
            self.msaa_samples = parse_number("VISTA_MSAA", &v)?;
        }
        if let Some(v) = lookup("VISTA_VALIDATION") {
            self.debug_validation = parse_flag("VISTA_VALIDATION", &v)?;
        }
        if let Some(v) = lookup("VISTA_FAILURE_POLICY") {
            self.failure_policy = v.parse()?;
        }
        if let Some(v) = lookup("VISTA_SHADER_DIR") {
            self.shader_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Clamp the window size and reject values the renderer cannot honor.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an unsupported frame count or sample count.
    pub fn validate(&mut self) -> Result<()> {
        if self.width < MIN_WINDOW_WIDTH || self.height < MIN_WINDOW_HEIGHT {
            warn!(
                "Window size {}x{} below minimum, clamping to at least {}x{}",
                self.width, self.height, MIN_WINDOW_WIDTH, MIN_WINDOW_HEIGHT
            );
            self.width = self.width.max(MIN_WINDOW_WIDTH);
            self.height = self.height.max(MIN_WINDOW_HEIGHT);
        }

        if !(2..=3).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be 2 or 3, got {}",
                self.frames_in_flight
            )));
        }

        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(Error::Config(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.msaa_samples
            )));
        }

        Ok(())
    }

    /// Whether multisampling is requested.
    pub fn msaa_enabled(&self) -> bool {
        self.msaa_samples > 1
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: '{value}' is not a valid number")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(Error::Config(format!("{key}: '{value}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        let mut config = RendererConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(!config.msaa_enabled());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = RendererConfig::default();
        config
            .apply_overrides(lookup(&[
                ("VISTA_WIDTH", "1920"),
                ("VISTA_FRAMES_IN_FLIGHT", "2"),
                ("VISTA_VSYNC", "off"),
                ("VISTA_MSAA", "4"),
                ("VISTA_FAILURE_POLICY", "Strict"),
            ]))
            .unwrap();

        assert_eq!(config.width, 1920);
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert!(config.msaa_enabled());
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = RendererConfig::default();
        assert!(config.apply_overrides(lookup(&[("VISTA_VSYNC", "maybe")])).is_err());
        assert!(config.apply_overrides(lookup(&[("VISTA_WIDTH", "wide")])).is_err());
        assert!(
            config
                .apply_overrides(lookup(&[("VISTA_FAILURE_POLICY", "panic")]))
                .is_err()
        );
    }

    #[test]
    fn test_small_window_clamped() {
        let mut config = RendererConfig {
            width: 320,
            height: 200,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!((config.width, config.height), (640, 480));
    }

    #[test]
    fn test_invalid_counts_rejected() {
        let mut config = RendererConfig {
            frames_in_flight: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = RendererConfig {
            msaa_samples: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
