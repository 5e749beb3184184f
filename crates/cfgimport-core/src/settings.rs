//! Named string settings.
//!
//! Every setting the importer reads is a flat `key → string` lookup. The
//! settings file is a flat YAML map:
//!
//! ```yaml
//! fileConfig.base.fileName: appsettings
//! fileConfig.base.ext: json
//! allowableStages: dev,prod
//! showValuesToClient: false
//! sd.address.dev: http://consul.dev:8500
//! sd.prefix.dev: app/svc
//! sd.token.dev: 00000000-0000-0000-0000-000000000000
//! ```
//!
//! Any key can also be supplied through the environment as
//! `CFGIMPORT__{KEY}` (dots become underscores, upper-cased), which wins over
//! the file.

use crate::error::{ImportError, Result};
use crate::io;
use crate::stage::AllowedStages;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CFGIMPORT__";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub const KEY_FILE_NAME: &str = "fileConfig.base.fileName";
pub const KEY_FILE_EXT: &str = "fileConfig.base.ext";
pub const KEY_STAGES: &str = "allowableStages";
pub const KEY_SHOW_VALUES: &str = "showValuesToClient";
pub const KEY_UPDATE_ENABLED: &str = "update.enabled";
pub const KEY_UPDATE_FEED: &str = "update.feedUrl";
pub const KEY_UPDATE_BINARY_URL: &str = "update.binaryUrl";
pub const KEY_UPDATE_SYMBOLS_URL: &str = "update.symbolsUrl";
pub const KEY_UPDATE_BINARY_FILE: &str = "update.binaryFile";
pub const KEY_UPDATE_SYMBOLS_FILE: &str = "update.symbolsFile";
pub const KEY_HTTP_TIMEOUT: &str = "http.timeoutSeconds";

pub fn sd_address_key(stage: &str) -> String {
    format!("sd.address.{stage}")
}

pub fn sd_prefix_key(stage: &str) -> String {
    format!("sd.prefix.{stage}")
}

pub fn sd_token_key(stage: &str) -> String {
    format!("sd.token.{stage}")
}

// ---------------------------------------------------------------------------
// SettingsProvider
// ---------------------------------------------------------------------------

pub trait SettingsProvider {
    /// Raw value for `key`, if the source has one.
    fn get(&self, key: &str) -> Option<String>;

    /// Value for `key` with blank values treated as absent.
    fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Value for `key`, or a `Configuration` error naming the key.
    fn require(&self, key: &str, description: &str) -> Result<String> {
        self.get_non_blank(key)
            .ok_or_else(|| ImportError::configuration(key, description))
    }
}

/// In-memory settings, used for tests and as the parsed form of the file.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: BTreeMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl SettingsProvider for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Settings read from a flat YAML file.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
    values: MapSettings,
}

impl FileSettings {
    /// Load the settings file. A missing file yields empty settings so the
    /// environment overlay alone can drive a run.
    pub fn load(path: &Path) -> Result<Self> {
        let values = match io::read_optional(path)? {
            Some(text) => parse_settings(&text)?,
            None => {
                tracing::debug!(path = %path.display(), "settings file not found");
                MapSettings::new()
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key)
    }
}

fn parse_settings(text: &str) -> Result<MapSettings> {
    let mut settings = MapSettings::new();
    if text.trim().is_empty() {
        return Ok(settings);
    }
    let root: BTreeMap<String, Value> = serde_yaml::from_str(text)?;
    for (key, value) in root {
        if let Some(v) = scalar_to_string(&key, value)? {
            settings.insert(key, v);
        }
    }
    Ok(settings)
}

fn scalar_to_string(key: &str, value: Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // `allowableStages: [dev, prod]` is accepted as `dev,prod`
        Value::Sequence(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                if let Some(s) = scalar_to_string(key, item)? {
                    parts.push(s);
                }
            }
            Some(parts.join(","))
        }
        Value::Tagged(tagged) => scalar_to_string(key, tagged.value)?,
        Value::Mapping(_) => {
            return Err(ImportError::configuration(
                key,
                "expected a scalar value, found a nested map",
            ))
        }
    })
}

/// Environment overlay: `CFGIMPORT__SD_ADDRESS_DEV` answers `sd.address.dev`.
#[derive(Debug, Clone)]
pub struct EnvOverlay<P> {
    inner: P,
}

impl<P: SettingsProvider> EnvOverlay<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

pub fn env_var_name(key: &str) -> String {
    let mangled: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{ENV_PREFIX}{mangled}")
}

impl<P: SettingsProvider> SettingsProvider for EnvOverlay<P> {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(env_var_name(key))
            .ok()
            .or_else(|| self.inner.get(key))
    }
}

// ---------------------------------------------------------------------------
// Resolved run settings
// ---------------------------------------------------------------------------

/// Settings every import run needs before a stage is chosen.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub file_name: String,
    pub file_ext: String,
    pub stages: AllowedStages,
    pub show_values: bool,
}

impl ImportSettings {
    pub fn resolve(settings: &dyn SettingsProvider) -> Result<Self> {
        let file_name = settings.require(KEY_FILE_NAME, "name of the file to import")?;
        let file_ext = settings.require(KEY_FILE_EXT, "extension of the file to import")?;
        let stages = AllowedStages::parse(&settings.require(KEY_STAGES, "stages allowed for import")?)?;
        let show_values = settings
            .require(KEY_SHOW_VALUES, "whether imported values are shown")?
            .trim()
            .eq_ignore_ascii_case("true");
        Ok(Self {
            file_name,
            file_ext,
            stages,
            show_values,
        })
    }
}

/// `http.timeoutSeconds`, if set. No timeout otherwise.
pub fn http_timeout(settings: &dyn SettingsProvider) -> Result<Option<std::time::Duration>> {
    match settings.get_non_blank(KEY_HTTP_TIMEOUT) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|s| Some(std::time::Duration::from_secs(s)))
            .map_err(|_| ImportError::configuration(KEY_HTTP_TIMEOUT, "whole number of seconds")),
    }
}
