use crate::cdx::paths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const INDEX_URL_ENV: &str = "CDXSUM_INDEX_URL";
const INDEX_DIR_ENV: &str = "CDXSUM_INDEX_DIR";
const RETRY_DELAY_ENV: &str = "CDXSUM_RETRY_DELAY_SECS";
const REQUEST_TIMEOUT_ENV: &str = "CDXSUM_REQUEST_TIMEOUT_SECS";
const MAX_ATTEMPTS_ENV: &str = "CDXSUM_MAX_ATTEMPTS";

/// Every `CDXSUM_*` variable the tool reads.
const KNOWN_ENV_KEYS: &[&str] = &[
    INDEX_URL_ENV,
    INDEX_DIR_ENV,
    RETRY_DELAY_ENV,
    REQUEST_TIMEOUT_ENV,
    MAX_ATTEMPTS_ENV,
    paths::HOME_ENV,
    paths::CONFIG_PATH_ENV,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub url: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    50
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 30,
            request_timeout_secs: 30,
            max_attempts: default_max_attempts(),
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CdxConfig {
    pub index: IndexConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCdxConfig {
    index: Option<IndexConfig>,
    fetch: Option<FetchConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_path(var: &str, fallback: Option<PathBuf>) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => fallback,
    }
}

fn unknown_env_keys<I: IntoIterator<Item = String>>(keys: I) -> Vec<String> {
    let mut unknown: Vec<String> = keys
        .into_iter()
        .filter(|k| k.starts_with("CDXSUM_"))
        .filter(|k| !KNOWN_ENV_KEYS.contains(&k.as_str()))
        .collect();
    unknown.sort();
    unknown
}

pub fn validate(cfg: &CdxConfig) -> Result<()> {
    let url = cfg.index.url.trim();
    if url.is_empty() {
        return Err(anyhow!("invalid index url: cannot be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!("invalid index url {url:?}: use http:// or https://"));
    }
    if cfg.fetch.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    if cfg.fetch.max_attempts == 0 {
        return Err(anyhow!("invalid max attempts: must be >= 1"));
    }
    Ok(())
}

fn merge_file_config(base: &mut CdxConfig) -> Result<()> {
    let Some(path) = paths::config_file() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialCdxConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse cdxsum config {}: {err}", path.display()))?;
    if let Some(index) = parsed.index {
        base.index = index;
    }
    if let Some(fetch) = parsed.fetch {
        base.fetch = fetch;
    }
    Ok(())
}

/// Defaults, then the config file, then `CDXSUM_*` environment overrides.
/// Command line flags are applied by the caller on top.
pub fn load_config() -> Result<CdxConfig> {
    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        log::warn!("ignoring unknown environment variable {key}");
    }

    let mut cfg = CdxConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.index.url = env_or_string(INDEX_URL_ENV, &cfg.index.url);
    cfg.index.dir = env_or_path(INDEX_DIR_ENV, cfg.index.dir.take());
    cfg.fetch.retry_delay_secs = env_or_u64(RETRY_DELAY_ENV, cfg.fetch.retry_delay_secs);
    cfg.fetch.request_timeout_secs =
        env_or_u64(REQUEST_TIMEOUT_ENV, cfg.fetch.request_timeout_secs);
    cfg.fetch.max_attempts = env_or_u32(MAX_ATTEMPTS_ENV, cfg.fetch.max_attempts);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&CdxConfig::default()).is_ok());
    }

    #[test]
    fn rejects_bad_url_and_zero_limits() {
        let mut cfg = CdxConfig::default();
        cfg.index.url = "ftp://cdx".into();
        assert!(validate(&cfg).is_err());

        let mut cfg = CdxConfig::default();
        cfg.fetch.max_attempts = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = CdxConfig::default();
        cfg.fetch.request_timeout_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_file_config_parses() {
        let parsed: PartialCdxConfig = toml::from_str(
            "[fetch]\nretry_delay_secs = 5\nrequest_timeout_secs = 10\n",
        )
        .unwrap();
        let fetch = parsed.fetch.unwrap();
        assert_eq!(fetch.retry_delay(), Duration::from_secs(5));
        assert_eq!(fetch.max_attempts, 50);
        assert!(parsed.index.is_none());
    }

    #[test]
    fn known_env_keys_are_not_reported() {
        let got = unknown_env_keys(vec![
            "CDXSUM_INDEX_URL".to_string(),
            "CDXSUM_INDEX_ULR".to_string(),
            "CDXSUM_HOME".to_string(),
            "PATH".to_string(),
        ]);
        assert_eq!(got, vec!["CDXSUM_INDEX_ULR".to_string()]);
    }
}
