//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("worn.db"),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("WORN_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for worn.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("worn"))
}

/// Returns the platform-specific data directory for worn.
///
/// On Linux: `~/.local/share/worn`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("worn"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_path_returns_some() {
        assert!(dirs_data_path().is_some());
    }

    #[test]
    fn data_path_ends_with_worn() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "worn");
    }

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("worn.db"));
    }

    #[test]
    fn explicit_config_file_overrides_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("worn.toml");
        std::fs::write(&file, "database_path = \"/tmp/elsewhere.db\"").unwrap();

        let config = Config::load_from(Some(&file)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/elsewhere.db"));
    }
}
