use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Base URL the join links sent to invitees point at.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl AppConfig {
    const CONFIG_ENV: &'static str = "TABSHARE_CONFIG_FILE";
    const DATABASE_PATH_ENV: &'static str = "TABSHARE_DATABASE_PATH";
    const FRONTEND_URL_ENV: &'static str = "TABSHARE_FRONTEND_URL";

    /// Load configuration from defaults layered with optional config files and
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    pub fn load_with(config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::resolve_config_path(config_path)? {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let file_config: Self = toml::from_str(&contents)
                .with_context(|| format!("invalid config file: {}", path.display()))?;

            config = file_config;
        }

        if let Ok(path) = env::var(Self::DATABASE_PATH_ENV) {
            config.database_path = path;
        }

        if let Ok(url) = env::var(Self::FRONTEND_URL_ENV) {
            config.frontend_url = trim_trailing_slash(url);
        }

        Ok(config)
    }

    fn resolve_config_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            return Self::validate_path(path);
        }

        if let Ok(path) = env::var(Self::CONFIG_ENV) {
            return Self::validate_path(PathBuf::from(path));
        }

        let mut candidates = vec![PathBuf::from("tabshare.toml")];
        if let Some(dir) = Self::default_config_dir() {
            candidates.push(dir.join("config.toml"));
        }

        for candidate in candidates {
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    fn validate_path(path: PathBuf) -> Result<Option<PathBuf>> {
        if path.exists() {
            Ok(Some(path))
        } else {
            Err(anyhow!(
                "configuration file does not exist: {}",
                path.display()
            ))
        }
    }

    fn default_config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".tabshare"))
    }
}

fn default_database_path() -> String {
    "./data/tabshare.db".to_owned()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_owned()
}

fn trim_trailing_slash(mut input: String) -> String {
    while input.ends_with('/') && input.len() > 1 {
        input.pop();
    }
    input
}

fn home_dir() -> Option<PathBuf> {
    if let Some(path) = env::var_os("HOME") {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = env::var_os("USERPROFILE") {
        return Some(PathBuf::from(path));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.database_path, "./data/tabshare.db");
        assert_eq!(config.frontend_url, "http://localhost:3000");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(
            trim_trailing_slash("http://localhost:3000///".to_owned()),
            "http://localhost:3000"
        );
    }
}
