use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "feed.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub access_token: Option<String>,
    pub rollback_on_failure: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4000".into(),
            access_token: None,
            rollback_on_failure: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    access_token: Option<String>,
    rollback_on_failure: Option<bool>,
}

/// Defaults, then `path` (if readable), then environment overrides.
pub fn load_settings(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!("config: ignoring unreadable {}: {err}", path.display()),
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.access_token {
        settings.access_token = Some(v);
    }
    if let Some(v) = file_cfg.rollback_on_failure {
        settings.rollback_on_failure = v;
    }
}

fn apply_env(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("FEED_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("FEED_ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }
    if let Some(v) = lookup("APP__ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }

    if let Some(v) = lookup("APP__ROLLBACK_ON_FAILURE") {
        if let Some(parsed) = parse_flag(&v) {
            settings.rollback_on_failure = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn normalize_server_url(raw_server_url: &str) -> anyhow::Result<Url> {
    let trimmed = raw_server_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(anyhow!("server_url must not be empty"));
    }
    let url = Url::parse(trimmed).with_context(|| format!("invalid server_url '{trimmed}'"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("server_url must use http or https, got '{other}'")),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
