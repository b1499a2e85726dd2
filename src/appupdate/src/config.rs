//! Update configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UpdateError, UpdateResult};
use crate::tier::{MID_MIN_VERSION, PlatformTier};

/// Default artifact file name inside the downloads directory.
pub const DEFAULT_ARTIFACT_NAME: &str = "app.apk";

/// Default id of the download-service provider package.
pub const DEFAULT_PROVIDER_ID: &str = "downloads";

/// User configuration for updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Identifier of the package being kept up to date
    #[serde(default = "default_package_id")]
    pub package_id: String,

    /// Version ordinal of the currently installed package
    #[serde(default)]
    pub installed_version_code: u64,

    /// File name of the downloaded artifact
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,

    /// Directory the artifact is downloaded into (defaults to the app's data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,

    /// File-sharing authority used on the scoped-storage tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_authority: Option<String>,

    /// Download-service provider whose enabled state gates enqueueing
    #[serde(default = "default_provider_id")]
    pub provider_id: String,

    /// Host platform version the tier is inferred from. On the scoped-storage
    /// tier (24 and up) the installer receives a `content://` reference, so
    /// `install_command` must be able to open one.
    #[serde(default = "default_host_version")]
    pub host_version: u32,

    /// Title attached to the download request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_title: Option<String>,

    /// Description attached to the download request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_description: Option<String>,

    /// Installer command; `{}` is replaced by the artifact location
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    /// Settings command; `{}` is replaced by the provider id
    #[serde(default)]
    pub settings_command: Vec<String>,

    /// Whether the built-in download service is enabled
    #[serde(default = "default_true")]
    pub service_enabled: bool,
}

fn default_package_id() -> String {
    "com.example.app".to_string()
}

fn default_artifact_name() -> String {
    DEFAULT_ARTIFACT_NAME.to_string()
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

// Mid tier hands the installer a plain path, which desktop openers accept.
fn default_host_version() -> u32 {
    MID_MIN_VERSION
}

fn default_install_command() -> Vec<String> {
    vec!["xdg-open".to_string(), "{}".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            package_id: default_package_id(),
            installed_version_code: 0,
            artifact_name: default_artifact_name(),
            downloads_dir: None,
            share_authority: None,
            provider_id: default_provider_id(),
            host_version: default_host_version(),
            download_title: None,
            download_description: None,
            install_command: default_install_command(),
            settings_command: Vec::new(),
            service_enabled: true,
        }
    }
}

impl UpdateConfig {
    /// Path of the standard config file (~/.appupdate/update.json).
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".appupdate").join("update.json"))
    }

    /// Load config from the standard location.
    pub fn load() -> Self {
        Self::config_path()
            .filter(|p| p.exists())
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from a file, falling back to defaults if it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring invalid update config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save config to the standard location.
    pub fn save(&self) -> UpdateResult<()> {
        let path = Self::config_path().ok_or_else(|| UpdateError::ConfigError {
            message: "No home directory".to_string(),
        })?;
        self.save_to(&path)
    }

    /// Save config to a specific file.
    pub fn save_to(&self, path: &Path) -> UpdateResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Directory holding the downloaded artifact.
    pub fn downloads_dir(&self) -> PathBuf {
        match &self.downloads_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(&self.package_id)
                .join("Downloads"),
        }
    }

    /// Fixed location of the downloaded artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.downloads_dir().join(&self.artifact_name)
    }

    /// Authority name for shareable references.
    pub fn share_authority(&self) -> String {
        self.share_authority
            .clone()
            .unwrap_or_else(|| format!("{}.fileProvider", self.package_id))
    }

    /// Capability tier of the configured host.
    pub fn tier(&self) -> PlatformTier {
        PlatformTier::from_host_version(self.host_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UpdateConfig::default();
        assert_eq!(config.artifact_name, "app.apk");
        assert_eq!(config.provider_id, "downloads");
        assert_eq!(config.tier(), PlatformTier::Mid);
        assert_eq!(config.share_authority(), "com.example.app.fileProvider");
    }

    #[test]
    fn test_default_tier_needs_no_grants() {
        let config = UpdateConfig::default();
        assert!(!config.tier().requires_grants());

        let config = UpdateConfig {
            host_version: 24,
            ..Default::default()
        };
        assert!(config.tier().requires_grants());
    }

    #[test]
    fn test_artifact_path_uses_downloads_dir() {
        let config = UpdateConfig {
            downloads_dir: Some(PathBuf::from("/data/app/files/Downloads")),
            ..Default::default()
        };
        assert_eq!(
            config.artifact_path(),
            PathBuf::from("/data/app/files/Downloads/app.apk")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("update.json");

        let config = UpdateConfig {
            package_id: "org.sample.reader".to_string(),
            installed_version_code: 12,
            host_version: 21,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = UpdateConfig::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.tier(), PlatformTier::Legacy);
    }

    #[test]
    fn test_load_partial_and_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.json");

        std::fs::write(&path, r#"{"package_id": "org.sample.reader"}"#).unwrap();
        let loaded = UpdateConfig::load_from(&path);
        assert_eq!(loaded.package_id, "org.sample.reader");
        assert_eq!(loaded.artifact_name, DEFAULT_ARTIFACT_NAME);
        assert!(loaded.service_enabled);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(UpdateConfig::load_from(&path), UpdateConfig::default());
    }
}
