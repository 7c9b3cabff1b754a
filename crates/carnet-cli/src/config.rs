//! Runtime configuration for the `carnet` binary.
//!
//! Values come from the environment (after `.env` is loaded) and can be
//! overridden by command-line flags.

use std::env;
use std::path::PathBuf;

use carnet_core::defaults::{IMPORT_OUT_DIR, TAGS_TABLE_LOCATOR};

/// Vault root. Every note locator is relative to it.
pub const ENV_VAULT_DIR: &str = "CARNET_VAULT_DIR";
/// Directory locator for notes created by an import.
pub const ENV_IMPORT_DIR: &str = "CARNET_IMPORT_DIR";
/// Locator of the note holding the local tags table.
pub const ENV_TAGS_TABLE: &str = "CARNET_TAGS_TABLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub vault_dir: PathBuf,
    pub import_dir: String,
    pub tags_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_dir: PathBuf::from("."),
            import_dir: IMPORT_OUT_DIR.to_string(),
            tags_table: TAGS_TABLE_LOCATOR.to_string(),
        }
    }
}

impl Config {
    /// Read the configuration from the environment.
    ///
    /// - `CARNET_VAULT_DIR` (default: `.`)
    /// - `CARNET_IMPORT_DIR` (default: `NEW`)
    /// - `CARNET_TAGS_TABLE` (default: `wp_tags/ob_tags_table.md`)
    ///
    /// Blank values count as unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            vault_dir: non_blank_env(ENV_VAULT_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.vault_dir),
            import_dir: non_blank_env(ENV_IMPORT_DIR).unwrap_or(defaults.import_dir),
            tags_table: non_blank_env(ENV_TAGS_TABLE).unwrap_or(defaults.tags_table),
        }
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_vault_dir(mut self, vault_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = vault_dir {
            self.vault_dir = dir;
        }
        self
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var(ENV_VAULT_DIR);
        env::remove_var(ENV_IMPORT_DIR);
        env::remove_var(ENV_TAGS_TABLE);
    }

    #[test]
    fn test_defaults_when_unset() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::from_env();
        assert_eq!(config, Config::default());
        assert_eq!(config.import_dir, "NEW");
        assert_eq!(config.tags_table, "wp_tags/ob_tags_table.md");
    }

    #[test]
    fn test_env_values_and_blank_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var(ENV_VAULT_DIR, "/srv/vault");
        env::set_var(ENV_IMPORT_DIR, "Inbox");
        env::set_var(ENV_TAGS_TABLE, "  ");

        let config = Config::from_env();
        assert_eq!(config.vault_dir, PathBuf::from("/srv/vault"));
        assert_eq!(config.import_dir, "Inbox");
        assert_eq!(config.tags_table, TAGS_TABLE_LOCATOR);

        clear_env();
    }

    #[test]
    fn test_flag_overrides_env() {
        let config = Config::default().with_vault_dir(Some(PathBuf::from("/tmp/v")));
        assert_eq!(config.vault_dir, PathBuf::from("/tmp/v"));

        let config = Config::default().with_vault_dir(None);
        assert_eq!(config.vault_dir, PathBuf::from("."));
    }
}
