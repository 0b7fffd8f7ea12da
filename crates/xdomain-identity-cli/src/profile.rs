//! On-disk browser profile: isolated storage per origin.

use std::path::{Path, PathBuf};

use url::Url;
use xdomain_identity::StorageScopes;

use crate::error::{CliError, CliResult};

const SESSION_FILE: &str = "session.json";

/// A browser profile. Each origin gets its own directory, so origins never
/// see each other's storage.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    root: PathBuf,
}

impl BrowserProfile {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for an origin, e.g. `http_site-a.local_3001`.
    pub fn origin_key(url: &Url) -> String {
        let host = url.host_str().unwrap_or("unknown");
        let key = match url.port_or_known_default() {
            Some(port) => format!("{}_{host}_{port}", url.scheme()),
            None => format!("{}_{host}", url.scheme()),
        };
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect()
    }

    pub fn origin_dir(&self, url: &Url) -> PathBuf {
        self.root.join(Self::origin_key(url))
    }

    pub fn storage_for(&self, url: &Url) -> StorageScopes {
        StorageScopes::on_disk(&self.origin_dir(url))
    }

    /// Close the browser: every origin's session scope is discarded.
    /// Returns how many sessions ended.
    pub fn end_session(&self) -> CliResult<usize> {
        let mut ended = 0;
        for dir in self.origin_dirs()? {
            let session = dir.join(SESSION_FILE);
            if session.exists() {
                std::fs::remove_file(&session)?;
                ended += 1;
            }
        }
        tracing::info!("Ended {ended} browser sessions");
        Ok(ended)
    }

    /// Origin directories present in the profile.
    pub fn origin_dirs(&self) -> CliResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

/// Accept a full URL or a bare `host[:port]`.
pub fn parse_origin(input: &str) -> CliResult<Url> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}/")
    };
    Url::parse(&candidate).map_err(|e| CliError::InvalidUrl(input.to_string(), e))
}
