//! Consul KV store access and the import loop.

use crate::error::{ImportError, Result};
use crate::paths;
use crate::settings::{sd_address_key, sd_prefix_key, sd_token_key, SettingsProvider};
use crate::stage::StageName;
use crate::values::ConfigMap;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

pub const TOKEN_HEADER: &str = "X-Consul-Token";

// ---------------------------------------------------------------------------
// SdConfig
// ---------------------------------------------------------------------------

/// Connection settings for the KV store of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct SdConfig {
    pub url: String,
    pub prefix: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl SdConfig {
    pub fn for_stage(settings: &dyn SettingsProvider, stage: &StageName) -> Result<Self> {
        let url = settings.require(
            &sd_address_key(stage.as_str()),
            &format!("store address for stage {stage}"),
        )?;
        let prefix = settings.require(
            &sd_prefix_key(stage.as_str()),
            &format!("store prefix for stage {stage}"),
        )?;
        let token = settings.get_non_blank(&sd_token_key(stage.as_str()));
        let sd = Self { url, prefix, token };
        sd.base_url()?;
        Ok(sd)
    }

    /// `{url}{prefix}`, the way targets are reported to the operator.
    pub fn target(&self) -> String {
        format!("{}{}", self.url, self.prefix)
    }

    pub fn key_path(&self, key: &str) -> String {
        paths::kv_path(&self.prefix, key)
    }

    fn base_url(&self) -> Result<Url> {
        let invalid = |reason: &str| ImportError::InvalidUrl {
            url: self.url.clone(),
            reason: reason.to_string(),
        };
        let url = Url::parse(self.url.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("expected an http or https address"));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("not usable as a base address"));
        }
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

pub trait KvStore {
    /// Write `value` at the full key `path`.
    fn put(&self, path: &str, value: &[u8]) -> Result<()>;
}

/// Blocking client for the Consul HTTP KV API.
pub struct ConsulKv {
    client: reqwest::blocking::Client,
    base: Url,
    token: Option<String>,
}

impl ConsulKv {
    pub fn connect(sd: &SdConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            base: sd.base_url()?,
            token: sd.token.clone(),
        })
    }

    /// `{base}/v1/kv/{path}` with each path segment percent-encoded.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ImportError::InvalidUrl {
                url: self.base.to_string(),
                reason: "not usable as a base address".to_string(),
            })?
            .pop_if_empty()
            .push("v1")
            .push("kv")
            .extend(path.split('/'));
        Ok(url)
    }
}

impl KvStore for ConsulKv {
    fn put(&self, path: &str, value: &[u8]) -> Result<()> {
        let mut req = self.client.put(self.endpoint(path)?).body(value.to_vec());
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ImportError::KvWrite {
                path: path.to_string(),
                reason: format!("{status}: {}", body.trim()),
            });
        }
        if body.trim() != "true" {
            return Err(ImportError::KvWrite {
                path: path.to_string(),
                reason: format!("unexpected response '{}'", body.trim()),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Open a store connection for `sd`, write every value, release the connection.
pub fn import(
    sd: &SdConfig,
    values: &ConfigMap,
    show_values: bool,
    timeout: Option<Duration>,
) -> Result<usize> {
    let store = ConsulKv::connect(sd, timeout)?;
    import_into(&store, sd, values, show_values)
}

/// Write every value under `sd.prefix`. Stops at the first failed write;
/// keys already written stay written.
pub fn import_into(
    store: &dyn KvStore,
    sd: &SdConfig,
    values: &ConfigMap,
    show_values: bool,
) -> Result<usize> {
    let mut written = 0;
    for (key, value) in values {
        let path = sd.key_path(key);
        store
            .put(&path, value.as_bytes())
            .map_err(|e| ImportError::Import {
                key: key.clone(),
                source: Box::new(e),
            })?;
        written += 1;
        if show_values {
            tracing::info!("'{key}' = '{value}'");
        } else {
            tracing::debug!(path = %path, "written");
        }
    }

    if show_values {
        tracing::warn!(
            "showValuesToClient is on: every imported value, secrets included, is now in the log files"
        );
        tracing::warn!("clear the logs directory when finished if these values must stay private");
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
