//! Self-update of the executor binary from the release-tags feed.
//!
//! ```text
//! Idle → Checking → UpToDate
//!                 → UpdateAvailable → Updating → Updated
//!                                              → UpdateFailed
//! ```
//!
//! Update problems never abort a run: [`Updater::run`] returns an
//! [`UpdateOutcome`] rather than an error, and a failed feed request is
//! reported as `UpToDate` with the error attached.

use crate::error::{ImportError, Result};
use crate::io;
use crate::paths;
use crate::settings::{
    http_timeout, SettingsProvider, KEY_UPDATE_BINARY_FILE, KEY_UPDATE_BINARY_URL,
    KEY_UPDATE_ENABLED, KEY_UPDATE_FEED, KEY_UPDATE_SYMBOLS_FILE, KEY_UPDATE_SYMBOLS_URL,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://api.github.com/repos/MPilukov/ConfigImporter/tags";
pub const DEFAULT_ASSET_BASE: &str =
    "https://raw.githubusercontent.com/MPilukov/ConfigImporter/master/release";
pub const EXECUTOR_NAME: &str = "cfgimport-exec";

pub fn user_agent() -> String {
    format!("cfgimport/{}", env!("CARGO_PKG_VERSION"))
}

pub fn default_binary_file() -> String {
    format!("{EXECUTOR_NAME}{}", std::env::consts::EXE_SUFFIX)
}

pub fn default_symbols_file() -> String {
    format!("{EXECUTOR_NAME}.debug")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One entry of the tags feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTag {
    pub name: String,
    #[serde(default, rename = "zipball_url")]
    pub zip_url: Option<String>,
}

/// A file fetched on update and written into the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub url: String,
    pub file_name: String,
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Updating,
    Updated,
    UpdateFailed,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up to date",
            UpdateState::UpdateAvailable => "update available",
            UpdateState::Updating => "updating",
            UpdateState::Updated => "updated",
            UpdateState::UpdateFailed => "update failed",
        };
        f.write_str(s)
    }
}

/// Result of one pass through the update state machine.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub state: UpdateState,
    pub transitions: Vec<UpdateState>,
    pub local_version: Option<String>,
    pub latest_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateOutcome {
    fn new(local_version: Option<String>) -> Self {
        Self {
            state: UpdateState::Idle,
            transitions: vec![UpdateState::Idle],
            local_version,
            latest_version: None,
            error: None,
        }
    }

    fn enter(&mut self, state: UpdateState) {
        tracing::debug!(from = %self.state, to = %state, "update state");
        self.state = state;
        self.transitions.push(state);
    }

    /// The version in effect after this pass.
    pub fn current_version(&self) -> Option<&str> {
        match self.state {
            UpdateState::Updated => self.latest_version.as_deref(),
            _ => self.local_version.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub feed_url: String,
    pub assets: Vec<ReleaseAsset>,
    pub dir: PathBuf,
    pub timeout: Option<Duration>,
}

impl UpdateConfig {
    pub fn from_settings(settings: &dyn SettingsProvider, dir: &Path) -> Result<Self> {
        let enabled = settings
            .get_non_blank(KEY_UPDATE_ENABLED)
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let feed_url = settings
            .get_non_blank(KEY_UPDATE_FEED)
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        let binary_file = settings
            .get_non_blank(KEY_UPDATE_BINARY_FILE)
            .unwrap_or_else(default_binary_file);
        let symbols_file = settings
            .get_non_blank(KEY_UPDATE_SYMBOLS_FILE)
            .unwrap_or_else(default_symbols_file);
        let binary_url = settings
            .get_non_blank(KEY_UPDATE_BINARY_URL)
            .unwrap_or_else(|| format!("{DEFAULT_ASSET_BASE}/{binary_file}"));
        let symbols_url = settings
            .get_non_blank(KEY_UPDATE_SYMBOLS_URL)
            .unwrap_or_else(|| format!("{DEFAULT_ASSET_BASE}/{symbols_file}"));

        Ok(Self {
            enabled,
            feed_url,
            assets: vec![
                ReleaseAsset {
                    url: binary_url,
                    file_name: binary_file,
                    executable: true,
                },
                ReleaseAsset {
                    url: symbols_url,
                    file_name: symbols_file,
                    executable: false,
                },
            ],
            dir: dir.to_path_buf(),
            timeout: http_timeout(settings)?,
        })
    }

    pub fn version_path(&self) -> PathBuf {
        paths::version_path(&self.dir)
    }

    /// Path of the executor binary in the working directory.
    pub fn executor_path(&self) -> Option<PathBuf> {
        self.assets
            .iter()
            .find(|a| a.executable)
            .map(|a| self.dir.join(&a.file_name))
    }
}

// ---------------------------------------------------------------------------
// Version file
// ---------------------------------------------------------------------------

/// The persisted version, or `None` if the file is missing or blank.
pub fn read_version(path: &Path) -> Result<Option<String>> {
    Ok(io::read_optional(path)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

pub fn write_version(path: &Path, version: &str) -> Result<()> {
    io::atomic_write(path, version.as_bytes())
}

/// True when the local version is absent or differs from `latest`, ignoring case.
pub fn needs_update(local: Option<&str>, latest: &str) -> bool {
    match local.map(str::trim) {
        None | Some("") => true,
        Some(v) => !v.eq_ignore_ascii_case(latest.trim()),
    }
}

/// Highest tag by descending name order.
pub fn select_latest(mut tags: Vec<ReleaseTag>) -> Option<ReleaseTag> {
    tags.sort_by(|a, b| b.name.cmp(&a.name));
    tags.into_iter().next()
}

// ---------------------------------------------------------------------------
// ReleaseSource
// ---------------------------------------------------------------------------

pub trait ReleaseSource {
    fn tags(&self) -> Result<Vec<ReleaseTag>>;
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// GitHub-style tags feed over blocking HTTP. Every request carries a
/// `User-Agent`; the API rejects requests without one.
pub struct HttpReleases {
    client: reqwest::blocking::Client,
    feed_url: String,
}

impl HttpReleases {
    pub fn new(feed_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().user_agent(user_agent());
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            feed_url: feed_url.into(),
        })
    }
}

impl ReleaseSource for HttpReleases {
    fn tags(&self) -> Result<Vec<ReleaseTag>> {
        let resp = self.client.get(&self.feed_url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ImportError::UpdateCheck(format!(
                "{} returned {status}",
                self.feed_url
            )));
        }
        let text = resp.text()?;
        let tags: Option<Vec<ReleaseTag>> = serde_json::from_str(&text)?;
        Ok(tags.unwrap_or_default())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ImportError::UpdateApply(format!("{url} returned {status}")));
        }
        Ok(resp.bytes()?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

pub struct Updater<'a> {
    source: &'a dyn ReleaseSource,
    config: &'a UpdateConfig,
}

impl<'a> Updater<'a> {
    pub fn new(source: &'a dyn ReleaseSource, config: &'a UpdateConfig) -> Self {
        Self { source, config }
    }

    /// Check the feed and replace the executor when stale.
    pub fn run(&self) -> UpdateOutcome {
        let local = match read_version(&self.config.version_path()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("could not read {}: {e}", paths::VERSION_FILE);
                None
            }
        };
        let mut outcome = UpdateOutcome::new(local);

        outcome.enter(UpdateState::Checking);
        let latest = match self.source.tags() {
            Ok(tags) => select_latest(tags),
            Err(e) => {
                let e = match e {
                    ImportError::UpdateCheck(_) => e,
                    other => ImportError::UpdateCheck(other.to_string()),
                };
                tracing::warn!("{e}; continuing with the current executor");
                outcome.error = Some(e.to_string());
                outcome.enter(UpdateState::UpToDate);
                return outcome;
            }
        };

        let Some(latest) = latest else {
            tracing::info!("release feed is empty");
            outcome.enter(UpdateState::UpToDate);
            return outcome;
        };
        outcome.latest_version = Some(latest.name.clone());

        if !needs_update(outcome.local_version.as_deref(), &latest.name) {
            tracing::info!(version = %latest.name, "executor is up to date");
            outcome.enter(UpdateState::UpToDate);
            return outcome;
        }

        outcome.enter(UpdateState::UpdateAvailable);
        tracing::info!(
            from = outcome.local_version.as_deref().unwrap_or("none"),
            to = %latest.name,
            "executor update available"
        );

        outcome.enter(UpdateState::Updating);
        match self.apply(&latest) {
            Ok(()) => {
                tracing::info!(version = %latest.name, "executor updated");
                outcome.enter(UpdateState::Updated);
            }
            Err(e) => {
                let e = match e {
                    ImportError::UpdateApply(_) => e,
                    other => ImportError::UpdateApply(other.to_string()),
                };
                tracing::warn!("{e}; continuing with the current executor");
                outcome.error = Some(e.to_string());
                outcome.enter(UpdateState::UpdateFailed);
            }
        }
        outcome
    }

    /// Download every asset, write them all, then record the version.
    fn apply(&self, tag: &ReleaseTag) -> Result<()> {
        let mut downloaded = Vec::with_capacity(self.config.assets.len());
        for asset in &self.config.assets {
            tracing::debug!(url = %asset.url, "downloading");
            downloaded.push((asset, self.source.download(&asset.url)?));
        }
        for (asset, bytes) in downloaded {
            let path = self.config.dir.join(&asset.file_name);
            io::atomic_write(&path, &bytes)?;
            set_mode(&path, asset.executable)?;
        }
        write_version(&self.config.version_path(), &tag.name)
    }
}

/// Temp files are created 0600; artifacts get the usual 0755 / 0644.
#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MapSettings;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FakeSource {
        tags: std::result::Result<Vec<ReleaseTag>, String>,
        files: HashMap<String, Vec<u8>>,
    }

    impl ReleaseSource for FakeSource {
        fn tags(&self) -> Result<Vec<ReleaseTag>> {
            self.tags.clone().map_err(ImportError::UpdateCheck)
        }

        fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| ImportError::UpdateApply(format!("{url} returned 404 Not Found")))
        }
    }

    fn tag(name: &str) -> ReleaseTag {
        ReleaseTag {
            name: name.to_string(),
            zip_url: None,
        }
    }

    fn config(dir: &Path) -> UpdateConfig {
        let settings = MapSettings::new()
            .with(KEY_UPDATE_BINARY_URL, "https://releases/bin")
            .with(KEY_UPDATE_SYMBOLS_URL, "https://releases/sym")
            .with(KEY_UPDATE_BINARY_FILE, "exec-bin")
            .with(KEY_UPDATE_SYMBOLS_FILE, "exec-bin.debug");
        UpdateConfig::from_settings(&settings, dir).unwrap()
    }

    fn both_files() -> HashMap<String, Vec<u8>> {
        HashMap::from([
            ("https://releases/bin".to_string(), b"BIN".to_vec()),
            ("https://releases/sym".to_string(), b"SYM".to_vec()),
        ])
    }

    #[test]
    fn needs_update_rules() {
        assert!(needs_update(None, "v1.1"));
        assert!(needs_update(Some("  "), "v1.1"));
        assert!(needs_update(Some("v1.0"), "v1.1"));
        assert!(!needs_update(Some("V1.1\n"), "v1.1"));
    }

    #[test]
    fn select_latest_takes_highest_name() {
        let latest = select_latest(vec![tag("v1.0"), tag("v1.2"), tag("v1.1")]).unwrap();
        assert_eq!(latest.name, "v1.2");
        assert!(select_latest(vec![]).is_none());
    }

    #[test]
    fn stale_version_is_replaced() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        write_version(&cfg.version_path(), "v1.0").unwrap();
        let source = FakeSource {
            tags: Ok(vec![tag("v1.0"), tag("v1.1")]),
            files: both_files(),
        };

        let outcome = Updater::new(&source, &cfg).run();

        assert_eq!(outcome.state, UpdateState::Updated);
        assert_eq!(
            outcome.transitions,
            vec![
                UpdateState::Idle,
                UpdateState::Checking,
                UpdateState::UpdateAvailable,
                UpdateState::Updating,
                UpdateState::Updated,
            ]
        );
        assert_eq!(read_version(&cfg.version_path()).unwrap().as_deref(), Some("v1.1"));
        assert_eq!(std::fs::read(dir.path().join("exec-bin")).unwrap(), b"BIN");
        assert_eq!(std::fs::read(dir.path().join("exec-bin.debug")).unwrap(), b"SYM");
        assert_eq!(outcome.current_version(), Some("v1.1"));
    }

    #[cfg(unix)]
    #[test]
    fn replaced_artifacts_get_readable_modes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let source = FakeSource {
            tags: Ok(vec![tag("v2.0")]),
            files: both_files(),
        };

        assert_eq!(Updater::new(&source, &cfg).run().state, UpdateState::Updated);

        let mode = |name: &str| {
            std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("exec-bin"), 0o755);
        assert_eq!(mode("exec-bin.debug"), 0o644);
    }

    #[test]
    fn download_failure_keeps_version() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        write_version(&cfg.version_path(), "v1.0").unwrap();
        let mut files = both_files();
        files.remove("https://releases/sym");
        let source = FakeSource {
            tags: Ok(vec![tag("v1.1")]),
            files,
        };

        let outcome = Updater::new(&source, &cfg).run();

        assert_eq!(outcome.state, UpdateState::UpdateFailed);
        assert!(outcome.transitions.contains(&UpdateState::Updating));
        assert!(outcome.error.as_deref().unwrap().contains("404"));
        assert_eq!(read_version(&cfg.version_path()).unwrap().as_deref(), Some("v1.0"));
        assert!(!dir.path().join("exec-bin").exists());
        assert_eq!(outcome.current_version(), Some("v1.0"));
    }

    #[test]
    fn feed_failure_falls_back_to_up_to_date() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let source = FakeSource {
            tags: Err("connection refused".to_string()),
            files: HashMap::new(),
        };

        let outcome = Updater::new(&source, &cfg).run();

        assert_eq!(outcome.state, UpdateState::UpToDate);
        assert!(outcome.error.is_some());
        assert!(read_version(&cfg.version_path()).unwrap().is_none());
    }

    #[test]
    fn matching_version_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        write_version(&cfg.version_path(), "v1.1").unwrap();
        let source = FakeSource {
            tags: Ok(vec![tag("v1.1")]),
            files: HashMap::new(),
        };

        let outcome = Updater::new(&source, &cfg).run();
        assert_eq!(outcome.state, UpdateState::UpToDate);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn missing_version_file_triggers_update() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let source = FakeSource {
            tags: Ok(vec![tag("v0.9")]),
            files: both_files(),
        };

        let outcome = Updater::new(&source, &cfg).run();
        assert_eq!(outcome.state, UpdateState::Updated);
        assert_eq!(read_version(&cfg.version_path()).unwrap().as_deref(), Some("v0.9"));
    }

    #[test]
    fn http_source_sends_user_agent() {
        let mut server = mockito::Server::new();
        let feed = server
            .mock("GET", "/repos/tags")
            .match_header("user-agent", user_agent().as_str())
            .with_header("content-type", "application/json")
            .with_body(r#"[{"name":"v1.0","zipball_url":"z0"},{"name":"v1.1","zipball_url":"z1"}]"#)
            .create();
        let bin = server
            .mock("GET", "/bin")
            .match_header("user-agent", user_agent().as_str())
            .with_body("BIN")
            .create();

        let source = HttpReleases::new(format!("{}/repos/tags", server.url()), None).unwrap();
        let latest = select_latest(source.tags().unwrap()).unwrap();
        assert_eq!(latest.name, "v1.1");
        assert_eq!(latest.zip_url.as_deref(), Some("z1"));
        assert_eq!(source.download(&format!("{}/bin", server.url())).unwrap(), b"BIN");
        feed.assert();
        bin.assert();
    }

    #[test]
    fn http_source_error_status_is_check_error() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/tags").with_status(403).create();
        let source = HttpReleases::new(format!("{}/tags", server.url()), None).unwrap();
        assert!(matches!(source.tags(), Err(ImportError::UpdateCheck(_))));
    }

    #[test]
    fn update_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let settings = MapSettings::new().with(KEY_UPDATE_ENABLED, "False");
        let cfg = UpdateConfig::from_settings(&settings, dir.path()).unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.feed_url, DEFAULT_FEED_URL);
        assert_eq!(cfg.executor_path(), Some(dir.path().join(default_binary_file())));
    }
}
