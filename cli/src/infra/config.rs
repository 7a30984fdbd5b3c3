//! Infrastructure implementation of the `ConfigStore` port.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::application::ports::ConfigStore;
use crate::domain::config::{AppConfig, FlotillaConfig};

/// Environment variable overriding the user config path.
pub const CONFIG_PATH_ENV: &str = "FLOTILLA_CONFIG";
/// Environment variable overriding `api.token`.
pub const API_TOKEN_ENV: &str = "FLOTILLA_API_TOKEN";

/// Production implementation of `ConfigStore` that uses a YAML file on disk.
pub struct YamlConfigStore;

impl YamlConfigStore {
    /// Load the config file as written, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_file(&self) -> Result<FlotillaConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(FlotillaConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }
}

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<FlotillaConfig> {
        let mut config = self.load_file()?;
        if let Ok(token) = std::env::var(API_TOKEN_ENV)
            && !token.is_empty()
        {
            config.api.token = Some(token);
        }
        Ok(config)
    }

    fn save(&self, config: &FlotillaConfig) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("cannot serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("cannot set permissions on {}", path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".flotilla").join("config.yaml"))
    }

    fn load_app(&self, path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }
}
