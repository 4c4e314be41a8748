use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "https://api.pigeon.chat/v1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) disable_network: Option<bool>,
    pub(super) api_base_url: Option<String>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    match try_load_app_config(data_dir) {
        Ok(Some(config)) => config,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            tracing::warn!(err = %format!("{e:#}"), "config unreadable; using defaults");
            AppConfig::default()
        }
    }
}

fn try_load_app_config(data_dir: &str) -> anyhow::Result<Option<AppConfig>> {
    let path = Path::new(data_dir).join("pigeon_config.json");
    if !path.exists() {
        return Ok(None);
    }
    let bytes =
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let config = serde_json::from_slice(&bytes).context("parse pigeon_config.json")?;
    Ok(Some(config))
}

pub(super) fn network_enabled(config: &AppConfig) -> bool {
    // Used to keep Rust tests deterministic and offline.
    if let Some(disable) = config.disable_network {
        return !disable;
    }
    std::env::var("PIGEON_DISABLE_NETWORK").ok().as_deref() != Some("1")
}

pub(super) fn api_base_url(config: &AppConfig) -> String {
    config
        .api_base_url
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}
