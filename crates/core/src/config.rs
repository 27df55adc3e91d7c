//! Config file parsing for `~/.config/epub-reader/config.toml`.
//!
//! Use `load_options_from_config` to turn the loaded config into
//! [`LoadOptions`] so extraction, navigation and security settings apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::{ExtractOptions, ExtractionPolicy};
use crate::error::ConfigError;
use crate::loader::LoadOptions;
use crate::navigation::NavigationDepth;
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub policy: ExtractionPolicy,
    pub max_concurrent_fetches: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub depth: NavigationDepth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_count: Option<u64>,
    pub max_entry_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
}

/// Fixed entry paths for archives that do not follow the container layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub package_path: Option<String>,
    pub navigation_path: Option<String>,
}

/// Load config from the default path. A missing or unreadable file yields
/// the defaults.
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };
    if !path.exists() {
        return AppConfig::default();
    }

    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring config at {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&content)?)
}

/// Return the default config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("epub-reader");
        p.push("config.toml");
        p
    })
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(count) = c.max_file_count {
        limits.max_file_count = count;
    }
    if let Some(mb) = c.max_entry_size_mb {
        limits.max_entry_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(r) = c.max_compression_ratio {
        limits.max_compression_ratio = r;
    }
    limits
}

/// Build extraction options from config.
pub fn extract_options_from_config(c: &ExtractionConfig) -> ExtractOptions {
    let defaults = ExtractOptions::default();
    ExtractOptions {
        policy: c.policy,
        max_concurrent_fetches: c
            .max_concurrent_fetches
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_concurrent_fetches),
    }
}

/// Build load options from the full app config.
pub fn load_options_from_config(cfg: &AppConfig) -> LoadOptions {
    LoadOptions {
        package_path: cfg.documents.package_path.clone(),
        navigation_path: cfg.documents.navigation_path.clone(),
        navigation_depth: cfg.navigation.depth,
        extraction: extract_options_from_config(&cfg.extraction),
        security: security_limits_from_config(&cfg.security),
    }
}
