//! Configuration and session storage locations

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::popup::{PopupGeometry, PopupSettings};

const ENV_BACKEND: &str = "EBAY_DASHBOARD_BACKEND";
const ENV_ORIGIN: &str = "EBAY_DASHBOARD_ORIGIN";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL (auth and inventory endpoints)
    pub backend_base: String,
    /// Origin the authorization callback page must present
    pub app_origin: String,
    /// Local address the authorization callback page posts to
    pub callback_addr: String,
    /// Listings per page
    pub page_size: u32,
    /// Screen size used to center the authorization window
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_base: "http://localhost:3001".to_string(),
            app_origin: "http://localhost:3000".to_string(),
            callback_addr: "127.0.0.1:8765".to_string(),
            page_size: 20,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "ebay-dashboard", "ebay-dashboard")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Session store file (tokens and signed-in user)
    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().join("session.json"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .context("Failed to set config permissions")?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(base) = var(ENV_BACKEND).filter(|v| !v.is_empty()) {
            self.backend_base = base;
        }
        if let Some(origin) = var(ENV_ORIGIN).filter(|v| !v.is_empty()) {
            self.app_origin = origin;
        }
    }

    pub fn popup_settings(&self) -> PopupSettings {
        PopupSettings {
            backend_base: self.backend_base.clone(),
            app_origin: self.app_origin.clone(),
            geometry: PopupGeometry::centered(self.screen_width, self.screen_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            backend_base = "https://api.example.com"
            page_size = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.backend_base, "https://api.example.com");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.app_origin, Config::default().app_origin);
        assert_eq!(config.callback_addr, "127.0.0.1:8765");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_BACKEND => Some("https://backend.example.com".to_string()),
            ENV_ORIGIN => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.backend_base, "https://backend.example.com");
        assert_eq!(config.app_origin, "http://localhost:3000");
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = Config {
            page_size: 10,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn test_popup_settings_centered() {
        let settings = Config::default().popup_settings();
        assert_eq!(settings.geometry, PopupGeometry::centered(1920, 1080));
        assert_eq!(settings.app_origin, "http://localhost:3000");
    }
}
