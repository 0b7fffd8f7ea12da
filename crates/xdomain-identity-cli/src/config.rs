//! Configuration and profile path resolution.

use std::path::PathBuf;

use xdomain_identity::TrackingConfig;

use crate::error::CliResult;

const CONFIG_ENV: &str = "XDOMAIN_CONFIG";
const PROFILE_ENV: &str = "XDOMAIN_PROFILE";
const CWD_CONFIG: &str = "xdomain.json";

/// Resolve the configuration file: explicit > env > `./xdomain.json`.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from(CWD_CONFIG);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    None
}

/// Load the configuration, falling back to the built-in three-site demo.
pub fn load_config(explicit: Option<&str>) -> CliResult<TrackingConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            Ok(TrackingConfig::from_file(&path)?)
        }
        None => {
            tracing::debug!("No config file found; using the demo sites");
            Ok(TrackingConfig::demo())
        }
    }
}

/// Resolve the browser profile directory.
pub fn resolve_profile_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(PROFILE_ENV) {
        return PathBuf::from(env_path);
    }

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(format!("{home}/.xdomain-identity/profile"))
}
