//! Typed configuration (SPEC_FULL.md §7.2), loaded from a TOML file with
//! environment-variable overrides in the teacher's `PMOMUSIC_CONFIG__`
//! shape (`pmoconfig::lib::ENV_PREFIX`) — `CUELINE_<SECTION>__<FIELD>` here,
//! applied to concrete typed fields rather than a dynamically-keyed value
//! tree behind a process-wide singleton.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const ENV_PREFIX: &str = "CUELINE_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub queue: QueueConfig,
    pub download: DownloadConfig,
    pub player: PlayerConfig,
    pub broadcast: BroadcastSettings,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("cueline.sqlite3"),
            queue: QueueConfig::default(),
            download: DownloadConfig::default(),
            player: PlayerConfig::default(),
            broadcast: BroadcastSettings::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Reserved for queue-scoped tunables; the priority ordering itself has no
/// configurable knobs today.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfig {}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub lookahead: usize,
    pub concurrency: usize,
    pub retry_base_ms: u64,
    pub retry_factor: u32,
    pub retry_max_attempts: u32,
    pub retry_cap_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let retry = cueline_download::RetryPolicy::default();
        Self {
            lookahead: 2,
            concurrency: 3,
            retry_base_ms: retry.base.as_millis() as u64,
            retry_factor: retry.factor,
            retry_max_attempts: retry.max_attempts,
            retry_cap_ms: retry.cap.as_millis() as u64,
        }
    }
}

impl DownloadConfig {
    pub fn retry_policy(&self) -> cueline_download::RetryPolicy {
        cueline_download::RetryPolicy {
            base: Duration::from_millis(self.retry_base_ms),
            factor: self.retry_factor,
            max_attempts: self.retry_max_attempts,
            cap: Duration::from_millis(self.retry_cap_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub seamless_executable: PathBuf,
    pub restart_executable: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            seamless_executable: PathBuf::from("/usr/local/bin/cueline-seamless-player"),
            restart_executable: PathBuf::from("/usr/local/bin/ffplay"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    pub debounce_ms: u64,
    pub startup_grace_ms: u64,
    pub heartbeat_secs: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        let defaults = cueline_server::BroadcastConfig::default();
        Self {
            debounce_ms: defaults.debounce_ms,
            startup_grace_ms: defaults.startup_grace_ms,
            heartbeat_secs: defaults.heartbeat_secs,
        }
    }
}

impl From<BroadcastSettings> for cueline_server::BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            debounce_ms: settings.debounce_ms,
            startup_grace_ms: settings.startup_grace_ms,
            heartbeat_secs: settings.heartbeat_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Reads `path` if it exists (an absent file just means "defaults"), then
/// applies `CUELINE_<SECTION>__<FIELD>` environment overrides before
/// deserializing into the typed `Config`.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let mut table: toml::Value = if text.trim().is_empty() {
        toml::Value::Table(toml::value::Table::new())
    } else {
        toml::from_str(&text)?
    };
    apply_env_overrides(&mut table);
    let config: Config = table.try_into()?;
    Ok(config)
}

fn apply_env_overrides(table: &mut toml::Value) {
    let toml::Value::Table(map) = table else { return };
    for (key, raw_value) in std::env::vars() {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else { continue };
        let Some((section, field)) = rest.split_once("__") else { continue };
        let section_key = section.to_lowercase();
        let field_key = field.to_lowercase();

        let entry = map
            .entry(section_key)
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
        if let toml::Value::Table(section_table) = entry {
            section_table.insert(field_key, parse_scalar(&raw_value));
        }
    }
}

fn parse_scalar(raw: &str) -> toml::Value {
    if let Ok(n) = raw.parse::<i64>() {
        return toml::Value::Integer(n);
    }
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    toml::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load(Path::new("/nonexistent/cueline.toml")).unwrap();
        assert_eq!(config.download.lookahead, 2);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8787");
    }

    /// Both env-var and on-disk-TOML overrides in one test: setting and
    /// reading process-wide environment variables races against other
    /// `#[test]` threads in this module if split across functions.
    #[test]
    fn env_and_file_overrides_are_applied() {
        std::env::set_var("CUELINE_DOWNLOAD__LOOKAHEAD", "5");
        let config = load(Path::new("/nonexistent/cueline.toml")).unwrap();
        std::env::remove_var("CUELINE_DOWNLOAD__LOOKAHEAD");
        assert_eq!(config.download.lookahead, 5);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cueline.toml");
        std::fs::write(&path, "[server]\nbind_addr = \"0.0.0.0:9000\"\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
    }
}
