//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL without a trailing `/`.
    pub api_url: String,
    /// JSON file backing durable client storage.
    pub storage_path: PathBuf,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `INVOICER_API_URL`: backend base URL (falls back to `VITE_API_URL`,
    ///   then `http://localhost:8000`)
    /// - `INVOICER_STORAGE_PATH`: storage file (default
    ///   `<home>/.config/invoicer/storage.json`)
    #[must_use]
    pub fn from_env() -> Self {
        let api_url = env_non_empty("INVOICER_API_URL")
            .or_else(|| env_non_empty("VITE_API_URL"))
            .map_or_else(|| DEFAULT_API_URL.to_owned(), |url| normalize_api_url(&url));
        let storage_path = env_non_empty("INVOICER_STORAGE_PATH").map_or_else(default_storage_path, PathBuf::from);
        Self { api_url, storage_path }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { api_url: DEFAULT_API_URL.to_owned(), storage_path: default_storage_path() }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Trim whitespace and trailing slashes so paths can be appended directly.
#[must_use]
pub fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

/// `<home>/.config/invoicer/storage.json`, or `./.invoicer/storage.json`
/// when no home directory can be determined.
#[must_use]
pub fn default_storage_path() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from(".invoicer").join(STORAGE_FILE),
        |home| home.join(".config").join("invoicer").join(STORAGE_FILE),
    )
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
