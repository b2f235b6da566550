use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use url::Url;
use workflow::settings::{RedirectTarget, WorkflowSettings};

pub const DEFAULT_CONFIG_PATH: &str = "newsletter.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("connector endpoint '{endpoint}' is not a valid URL: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("redirect path for {target} must be an absolute URL or start with '/': '{path}'")]
    InvalidRedirect { target: &'static str, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub site_key: Option<String>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost/civicrm/extern/rest.php".into(),
            api_key: None,
            site_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HoneypotSettings {
    pub enabled: bool,
    pub time_limit_seconds: u32,
}

impl Default for HoneypotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time_limit_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_bind: String,
    pub connector: ConnectorSettings,
    pub workflow: WorkflowSettings,
    /// Permissions held by anonymous visitors.
    pub granted_permissions: BTreeSet<String>,
    pub honeypot: HoneypotSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            connector: ConnectorSettings::default(),
            workflow: WorkflowSettings::default(),
            granted_permissions: BTreeSet::new(),
            honeypot: HoneypotSettings::default(),
        }
    }
}

impl Settings {
    pub fn connector_endpoint(&self) -> Result<Url, SettingsError> {
        Url::parse(self.connector.endpoint.trim()).map_err(|source| {
            SettingsError::InvalidEndpoint {
                endpoint: self.connector.endpoint.clone(),
                source,
            }
        })
    }
}

/// Defaults, then the TOML file (`NEWSLETTER_CONFIG` or `newsletter.toml`), then `APP__*` variables.
pub fn load_settings() -> Result<Settings, SettingsError> {
    let path = std::env::var("NEWSLETTER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let explicit = std::env::var_os("NEWSLETTER_CONFIG").is_some();
    load_settings_from(&path, explicit, |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_from(
    path: &Path,
    required: bool,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, SettingsError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(source) if required || source.kind() != io::ErrorKind::NotFound => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(_) => Settings::default(),
    };

    apply_env(&mut settings, env)?;
    validate(&settings)?;
    Ok(settings)
}

fn apply_env(
    settings: &mut Settings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__SERVER_BIND") {
        settings.server_bind = v;
    }

    if let Some(v) = env("APP__CONNECTOR__ENDPOINT") {
        settings.connector.endpoint = v;
    }
    if let Some(v) = env("APP__CONNECTOR__API_KEY") {
        settings.connector.api_key = Some(v);
    }
    if let Some(v) = env("APP__CONNECTOR__SITE_KEY") {
        settings.connector.site_key = Some(v);
    }

    let workflow = &mut settings.workflow;
    for (key, slot) in [
        ("APP__PREFERENCES_AUTOCONFIRM", &mut workflow.preferences_autoconfirm),
        ("APP__REDIRECT_DISABLE_MESSAGES", &mut workflow.redirect_disable_messages),
        ("APP__SINGLE_GROUP_HIDE", &mut workflow.single_group_hide),
        ("APP__PARENT_GROUPS_SELECTABLE", &mut workflow.parent_groups_selectable),
    ] {
        if let Some(v) = env(key) {
            *slot = parse_bool(key, &v)?;
        }
    }
    for target in RedirectTarget::ALL {
        let key = format!("APP__REDIRECT_PATHS__{}", target.as_str().to_uppercase());
        if let Some(v) = env(&key) {
            workflow.redirect_paths.set(target, Some(v));
        }
    }

    if let Some(v) = env("APP__GRANTED_PERMISSIONS") {
        settings.granted_permissions = v
            .split(',')
            .map(str::trim)
            .filter(|permission| !permission.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(v) = env("APP__HONEYPOT__ENABLED") {
        settings.honeypot.enabled = parse_bool("APP__HONEYPOT__ENABLED", &v)?;
    }
    if let Some(v) = env("APP__HONEYPOT__TIME_LIMIT_SECONDS") {
        settings.honeypot.time_limit_seconds =
            v.trim().parse().map_err(|_| SettingsError::InvalidValue {
                key: "APP__HONEYPOT__TIME_LIMIT_SECONDS".into(),
                value: v.clone(),
            })?;
    }

    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn validate(settings: &Settings) -> Result<(), SettingsError> {
    settings.connector_endpoint()?;
    for (target, path) in settings.workflow.redirect_paths.iter() {
        if !is_valid_redirect(path) {
            return Err(SettingsError::InvalidRedirect {
                target: target.as_str(),
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn is_valid_redirect(path: &str) -> bool {
    if path.starts_with("//") {
        return false;
    }
    path.starts_with('/') || Url::parse(path).is_ok_and(|url| url.has_host())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
