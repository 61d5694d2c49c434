use std::env;
use std::path::PathBuf;

pub const HOME_ENV: &str = "CDXSUM_HOME";
pub const CONFIG_PATH_ENV: &str = "CDXSUM_CONFIG_PATH";

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn home_from(cdxsum_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    cdxsum_home.or_else(|| home_dir.map(|h| h.join(".cdxsum")))
}

/// `$CDXSUM_HOME`, else `~/.cdxsum`.
pub fn cdxsum_home() -> Option<PathBuf> {
    home_from(env_path(HOME_ENV), dirs::home_dir())
}

pub fn config_file() -> Option<PathBuf> {
    env_path(CONFIG_PATH_ENV).or_else(|| cdxsum_home().map(|h| h.join("config.toml")))
}

pub fn dotenv_file() -> Option<PathBuf> {
    cdxsum_home().map(|h| h.join(".env"))
}
