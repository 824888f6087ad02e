mod dotenv_utils;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::tasks::errors::TaskError;
use crate::tasks::provider::host_header_for;
use crate::tasks::variants::ToolVariant;

pub const ENV_API_KEY: &str = "TASKRELAY_PROVIDER_API_KEY";
pub const ENV_WEBAPP_ID: &str = "TASKRELAY_PROVIDER_WEBAPP_ID";
pub const ENV_BASE_URL: &str = "TASKRELAY_PROVIDER_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "TASKRELAY_PROVIDER_TIMEOUT_SECS";
pub const ENV_BIND: &str = "TASKRELAY_BACKEND_BIND";
pub const ENV_SETTINGS_PATH: &str = "TASKRELAY_SETTINGS";
pub const ENV_APP_ROOT: &str = "TASKRELAY_APP_ROOT";

pub const DEFAULT_BASE_URL: &str = "https://www.runninghub.cn";
pub const DEFAULT_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SETTINGS_REL_PATH: &str = "config/taskrelay.settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub webapp_id: Option<String>,
    pub base_url: Url,
    pub timeout: Duration,
    pub variant_webapp_ids: BTreeMap<ToolVariant, String>,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, webapp_id: Option<String>) -> Self {
        Self {
            api_key: non_empty(api_key),
            webapp_id: non_empty(webapp_id),
            base_url: default_base_url(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            variant_webapp_ids: BTreeMap::new(),
        }
    }

    pub fn api_key(&self) -> Result<&str, TaskError> {
        self.api_key.as_deref().ok_or_else(|| {
            TaskError::Configuration(format!("Provider API key is not configured ({ENV_API_KEY})"))
        })
    }

    /// Per-variant override first, then the global webapp id.
    pub fn webapp_id_for(&self, variant: ToolVariant) -> Result<&str, TaskError> {
        self.variant_webapp_ids
            .get(&variant)
            .or(self.webapp_id.as_ref())
            .map(String::as_str)
            .ok_or_else(|| {
                TaskError::Configuration(format!(
                    "Provider webapp id is not configured for '{variant}' ({ENV_WEBAPP_ID})"
                ))
            })
    }

    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.api_key.is_none() {
            out.push(ENV_API_KEY);
        }
        if self.webapp_id.is_none() {
            out.push(ENV_WEBAPP_ID);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub bind: String,
    pub provider: ProviderSettings,
}

/// Redacted view safe to print or log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSummary {
    pub bind: String,
    pub base_url: String,
    pub host_header: Option<String>,
    pub timeout_secs: u64,
    pub api_key_configured: bool,
    pub webapp_id_configured: bool,
    pub variant_overrides: Vec<String>,
    pub missing: Vec<&'static str>,
}

impl AppSettings {
    pub fn summary(&self) -> SettingsSummary {
        let provider = &self.provider;
        SettingsSummary {
            bind: self.bind.clone(),
            base_url: provider.base_url.to_string(),
            host_header: host_header_for(&provider.base_url),
            timeout_secs: provider.timeout.as_secs(),
            api_key_configured: provider.api_key.is_some(),
            webapp_id_configured: provider.webapp_id.is_some(),
            variant_overrides: provider
                .variant_webapp_ids
                .keys()
                .map(|variant| variant.as_str().to_string())
                .collect(),
            missing: provider.missing_required(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("invalid provider base URL '{value}': {message}")]
    InvalidBaseUrl { value: String, message: String },
    #[error("invalid provider timeout '{0}': expected whole seconds between 1 and 120")]
    InvalidTimeout(String),
    #[error("settings reference unknown tool variant '{0}'")]
    UnknownVariant(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    provider: ProviderSection,
    #[serde(default)]
    variants: BTreeMap<String, VariantSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderSection {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    webapp_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantSection {
    #[serde(default)]
    webapp_id: Option<String>,
}

pub fn default_app_root() -> PathBuf {
    std::env::var(ENV_APP_ROOT)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves settings with precedence: process env, `.env` in the app root,
/// TOML settings file, built-in defaults.
pub fn resolve_settings(app_root: &Path) -> Result<AppSettings, SettingsError> {
    let dotenv_path = app_root.join(".env");
    let dotenv =
        dotenv_utils::load_dotenv_file(dotenv_path.as_path()).map_err(|error| {
            SettingsError::ReadFile {
                path: dotenv_path.display().to_string(),
                message: error.to_string(),
            }
        })?;
    let lookup = |key: &str| {
        std::env::var(key)
            .ok()
            .or_else(|| dotenv.get(key).cloned())
    };

    let file = match settings_file_path(app_root, lookup(ENV_SETTINGS_PATH).as_deref()) {
        Some(path) => load_settings_file(path.as_path())?,
        None => SettingsFile::default(),
    };
    select_settings(lookup, file)
}

fn settings_file_path(app_root: &Path, explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        let candidate = PathBuf::from(path);
        return Some(if candidate.is_absolute() {
            candidate
        } else {
            app_root.join(candidate)
        });
    }
    let default_path = app_root.join(DEFAULT_SETTINGS_REL_PATH);
    default_path.is_file().then_some(default_path)
}

fn load_settings_file(path: &Path) -> Result<SettingsFile, SettingsError> {
    let raw = fs::read_to_string(path).map_err(|error| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_settings_toml(raw.as_str(), path.display().to_string().as_str())
}

fn parse_settings_toml(raw: &str, path: &str) -> Result<SettingsFile, SettingsError> {
    toml::from_str::<SettingsFile>(raw).map_err(|error| SettingsError::ParseToml {
        path: path.to_string(),
        message: error.to_string(),
    })
}

fn select_settings(
    lookup: impl Fn(&str) -> Option<String>,
    file: SettingsFile,
) -> Result<AppSettings, SettingsError> {
    let pick = |key: &str, fallback: Option<String>| non_empty(lookup(key)).or(non_empty(fallback));

    let base_url = match pick(ENV_BASE_URL, file.provider.base_url) {
        Some(raw) => parse_base_url(raw.as_str())?,
        None => default_base_url(),
    };

    let timeout_secs = match non_empty(lookup(ENV_TIMEOUT_SECS)) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| SettingsError::InvalidTimeout(raw.clone()))?,
        None => file.provider.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };
    if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
        return Err(SettingsError::InvalidTimeout(timeout_secs.to_string()));
    }

    let mut variant_webapp_ids = BTreeMap::new();
    for (slug, section) in file.variants {
        let variant = slug
            .parse::<ToolVariant>()
            .map_err(|_| SettingsError::UnknownVariant(slug.clone()))?;
        if let Some(webapp_id) = non_empty(section.webapp_id) {
            variant_webapp_ids.insert(variant, webapp_id);
        }
    }

    Ok(AppSettings {
        bind: pick(ENV_BIND, file.bind).unwrap_or_else(|| String::from(DEFAULT_BIND)),
        provider: ProviderSettings {
            api_key: non_empty(lookup(ENV_API_KEY)),
            webapp_id: pick(ENV_WEBAPP_ID, file.provider.webapp_id),
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            variant_webapp_ids,
        },
    })
}

fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw.trim()).map_err(|error| SettingsError::InvalidBaseUrl {
        value: raw.to_string(),
        message: error.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(SettingsError::InvalidBaseUrl {
            value: raw.to_string(),
            message: String::from("expected an http(s) URL with a host"),
        });
    }
    Ok(url)
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("default base URL is valid"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
