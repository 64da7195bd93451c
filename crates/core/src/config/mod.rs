use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{PiLitesError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory of the play/channel document store.
    pub data_dir: PathBuf,
    /// Target frame rate for preview and live sessions.
    pub fps_target: u32,
    /// Drive the in-memory sink instead of real LED hardware.
    pub mock_hardware: bool,
    pub hardware_test_timeout_sec: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/pilites"),
            fps_target: 30,
            mock_hardware: false,
            hardware_test_timeout_sec: 30,
        }
    }
}

impl AppConfig {
    /// Reads a JSON config file. Fields missing from the file keep their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PILITES_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("PILITES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(fps) = lookup("PILITES_FPS_TARGET") {
            self.fps_target = fps
                .trim()
                .parse()
                .map_err(|_| PiLitesError::config(format!("PILITES_FPS_TARGET `{fps}` is not a number")))?;
        }
        if let Some(mock) = lookup("PILITES_MOCK_HARDWARE") {
            self.mock_hardware = matches!(
                mock.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps_target == 0 {
            return Err(PiLitesError::config("fps_target must be at least 1"));
        }
        Ok(())
    }

    /// Time budget for a single frame at the configured rate.
    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.fps_target)
    }
}

pub(crate) fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}
