// SPDX-License-Identifier: MPL-2.0-only

use std::{fs::File, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use xdg::BaseDirectories;

/// Hard ceiling on the number of workspaces, whatever the host allows
pub const MAX_WORKSPACES: usize = 36;

/// The isolator never runs with fewer workspaces than this: main plus one spare
pub const MIN_WORKSPACES: usize = 2;

static CONFIG_PATH: &str = "fullscreen-isolator/config.ron";

/// Config structure for the fullscreen isolator
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct IsolatorConfig {
    /// whether fullscreen windows are isolated at all
    pub enabled: bool,
    /// host reclaims empty workspaces on its own
    pub dynamic_workspaces: bool,
    /// workspace limit of the host
    pub max_workspaces: usize,
    /// debounce before isolating a window that entered fullscreen
    pub isolate_delay_ms: u64,
    /// delay before moving a window back after it left fullscreen
    pub restore_delay_ms: u64,
    /// debounce before reclaiming empty workspaces
    pub cleanup_delay_ms: u64,
}

impl Default for IsolatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dynamic_workspaces: true,
            max_workspaces: MAX_WORKSPACES,
            isolate_delay_ms: 600,
            restore_delay_ms: 600,
            cleanup_delay_ms: 600,
        }
    }
}

impl IsolatorConfig {
    /// load the config from the xdg config directories
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            match BaseDirectories::new().map(|dirs| dirs.find_config_file(CONFIG_PATH)) {
                Ok(Some(path)) => path,
                _ => anyhow::bail!("Failed to find config file"),
            };
        Self::load_from(&config_path)
    }

    /// load the config from an explicit path
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        let file = match File::open(config_path) {
            Ok(file) => file,
            Err(err) => {
                anyhow::bail!("Failed to open '{}': {}", config_path.display(), err);
            },
        };

        match ron::de::from_reader::<_, Self>(file) {
            Ok(config) => Ok(config),
            Err(err) => {
                anyhow::bail!("Failed to parse '{}': {}", config_path.display(), err);
            },
        }
    }

    /// path of the config file, creating its parent directory if needed
    pub fn path() -> anyhow::Result<PathBuf> {
        let xdg = BaseDirectories::new()?;
        Ok(xdg.place_config_file(CONFIG_PATH)?)
    }

    /// write config to config file
    pub fn write(&self) -> anyhow::Result<()> {
        self.write_to(&Self::path()?)
    }

    /// write config to an explicit path
    pub fn write_to(&self, config_path: &Path) -> anyhow::Result<()> {
        let f = File::create(config_path)?;
        ron::ser::to_writer_pretty(&f, self, ron::ser::PrettyConfig::default())?;
        Ok(())
    }

    /// effective workspace ceiling
    pub fn workspace_ceiling(&self) -> usize {
        self.max_workspaces.clamp(MIN_WORKSPACES, MAX_WORKSPACES)
    }

    pub fn isolate_delay(&self) -> Duration {
        Duration::from_millis(self.isolate_delay_ms)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}
