use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use smart_inspector::{
    FileSessionStore, InspectorConfig, MemorySessionStore, SessionStore, StorageBackend,
};

use crate::cli::OutputFormat;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    pub server: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub format: Option<String>,
}

impl ProfileConfig {
    pub const KEYS: &'static str = "server, client_id, redirect_uri, scope, format";

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let slot = match key {
            "server" => &mut self.server,
            "client_id" => &mut self.client_id,
            "redirect_uri" => &mut self.redirect_uri,
            "scope" => &mut self.scope,
            "format" => {
                if !matches!(value, "json" | "table") {
                    anyhow::bail!("Invalid format: {value}. Expected json or table");
                }
                &mut self.format
            }
            other => anyhow::bail!("Unknown config key: {other}. Valid keys: {}", Self::KEYS),
        };
        *slot = Some(value.to_string());
        Ok(())
    }

    pub fn output_format(&self) -> OutputFormat {
        match self.format.as_deref() {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".smart-inspector");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

fn save_profile_to(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all_from(path)?;
    all.insert(profile.to_string(), config.clone());
    fs::write(path, toml::to_string_pretty(&all)?)?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    let mut all = load_all_from(&config_path()?)?;
    Ok(all.remove(profile).unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    save_profile_to(&config_path()?, profile, config)
}

/// Server URL: `--server` / env first, then the profile.
pub fn resolve_server(cli_server: &Option<String>, profile: &ProfileConfig) -> Option<String> {
    cli_server.clone().or_else(|| profile.server.clone())
}

/// Loads the inspector config, applying `--session` on top.
pub fn load_inspector(path: Option<&str>, session: Option<&str>) -> Result<InspectorConfig> {
    let mut cfg = InspectorConfig::load(path.map(Path::new))?;
    if let Some(id) = session {
        cfg.storage.session_id = id.to_string();
        cfg.validate()?;
    }
    Ok(cfg)
}

/// Opens the session store selected by the config.
pub fn open_store(cfg: &InspectorConfig) -> Result<Arc<dyn SessionStore>> {
    match cfg.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        StorageBackend::File => {
            let dir = match &cfg.storage.directory {
                Some(dir) => dir.clone(),
                None => config_dir()?.join("sessions"),
            };
            let store = FileSessionStore::open(&dir, &cfg.storage.session_id)
                .with_context(|| format!("Cannot open session store in {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_set_known_keys() {
        let mut cfg = ProfileConfig::default();
        cfg.set("server", "https://launch.example.org/v/r4/fhir").unwrap();
        cfg.set("client_id", "inspector").unwrap();
        cfg.set("format", "json").unwrap();
        assert_eq!(cfg.client_id.as_deref(), Some("inspector"));
        assert!(matches!(cfg.output_format(), OutputFormat::Json));

        assert!(cfg.set("format", "yaml").is_err());
        let err = cfg.set("colour", "red").unwrap_err();
        assert!(err.to_string().contains("Unknown config key: colour"));
    }

    #[test]
    fn test_profiles_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let dev = ProfileConfig {
            server: Some("https://dev.example.org/fhir".into()),
            ..Default::default()
        };
        save_profile_to(&path, "dev", &dev).unwrap();
        save_profile_to(&path, "default", &ProfileConfig::default()).unwrap();

        let all = load_all_from(&path).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["dev"].server.as_deref(), Some("https://dev.example.org/fhir"));
    }

    #[test]
    fn test_resolve_server_prefers_flag() {
        let profile = ProfileConfig {
            server: Some("https://profile.example.org".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_server(&Some("https://flag.example.org".into()), &profile).as_deref(),
            Some("https://flag.example.org")
        );
        assert_eq!(
            resolve_server(&None, &profile).as_deref(),
            Some("https://profile.example.org")
        );
    }

    #[test]
    fn test_memory_store_from_config() {
        let mut cfg = InspectorConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        let store = open_store(&cfg).unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_uses_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = InspectorConfig::default();
        cfg.storage.directory = Some(dir.path().to_path_buf());
        cfg.storage.session_id = "tab-1".into();

        open_store(&cfg).unwrap().set("launchParams", "{}").unwrap();
        assert!(dir.path().join("session.tab-1.json").exists());
    }
}
