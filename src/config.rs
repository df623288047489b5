//! Client configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `SCHOOL_DESK_*` environment overrides.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DeskError, Result};

pub const DEFAULT_API_URL: &str = "https://school-application-backend.onrender.com/api";
const DEFAULT_SITE_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_LOGO_PATH: &str = "/images/Pratibha-logo.png";
const DEFAULT_SCHOOL_NAME: &str = "Sri Pratibha U.P. School";
const DEFAULT_SCHOOL_ADDRESS: &str = "Vadisaleru, Andhra Pradesh";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_KEYRING_SERVICE: &str = "school-desk";

const ENV_CONFIG: &str = "SCHOOL_DESK_CONFIG";
const ENV_API_URL: &str = "SCHOOL_DESK_API_URL";
const ENV_SITE_ORIGIN: &str = "SCHOOL_DESK_SITE_ORIGIN";
const ENV_LOGO: &str = "SCHOOL_DESK_LOGO";
const ENV_DOWNLOAD_DIR: &str = "SCHOOL_DESK_DOWNLOAD_DIR";
const ENV_TIMEOUT: &str = "SCHOOL_DESK_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub site_origin: String,
    /// Either a path under `site_origin`, a local file, or a `data:` URL.
    pub logo_path: String,
    pub school_name: String,
    pub school_address: String,
    pub request_timeout_secs: u64,
    pub download_dir: PathBuf,
    pub keyring_service: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
            logo_path: DEFAULT_LOGO_PATH.to_string(),
            school_name: DEFAULT_SCHOOL_NAME.to_string(),
            school_address: DEFAULT_SCHOOL_ADDRESS.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            download_dir: PathBuf::from("."),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

/// Where the receipt logo comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoSource {
    Url(String),
    File(PathBuf),
    Inline(Vec<u8>),
}

impl AppConfig {
    /// Load configuration. `explicit` wins over `SCHOOL_DESK_CONFIG`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));

        let mut cfg = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.api_base_url = normalize_base_url(&cfg.api_base_url);
        cfg.site_origin = normalize_base_url(&cfg.site_origin);
        if cfg.request_timeout_secs == 0 {
            warn!("request_timeout_secs of 0 is not allowed, using default");
            cfg.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        debug!(api = %cfg.api_base_url, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| DeskError::validation(format!("Invalid config file {}: {e}", path.display())))
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_nonempty(ENV_API_URL) {
            self.api_base_url = v;
        }
        if let Some(v) = env_nonempty(ENV_SITE_ORIGIN) {
            self.site_origin = v;
        }
        if let Some(v) = env_nonempty(ENV_LOGO) {
            self.logo_path = v;
        }
        if let Some(v) = env_nonempty(ENV_DOWNLOAD_DIR) {
            self.download_dir = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty(ENV_TIMEOUT) {
            match v.parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => warn!(value = %v, "ignoring invalid {ENV_TIMEOUT}"),
            }
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn logo_source(&self) -> Result<LogoSource> {
        let raw = self.logo_path.trim();
        if let Some(encoded) = raw.strip_prefix("data:") {
            let (_, payload) = encoded
                .split_once(";base64,")
                .ok_or_else(|| DeskError::validation("Logo data URL must be base64 encoded"))?;
            let bytes = BASE64_STANDARD
                .decode(payload.trim())
                .map_err(|e| DeskError::validation(format!("Invalid logo data URL: {e}")))?;
            return Ok(LogoSource::Inline(bytes));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(LogoSource::Url(raw.to_string()));
        }
        let as_path = Path::new(raw);
        if as_path.is_file() {
            return Ok(LogoSource::File(as_path.to_path_buf()));
        }
        let path = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{raw}")
        };
        Ok(LogoSource::Url(format!("{}{path}", self.site_origin)))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalise a server URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url
}
