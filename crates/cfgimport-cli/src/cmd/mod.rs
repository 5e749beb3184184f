pub mod preview;
pub mod run;
pub mod stages;
pub mod update;
pub mod version;

use anyhow::Context as _;
use cfgimport_core::paths;
use cfgimport_core::settings::{EnvOverlay, FileSettings, SettingsProvider};
use std::path::{Path, PathBuf};

/// Per-invocation state handed to every command.
pub struct Context {
    pub dir: PathBuf,
    pub settings: EnvOverlay<FileSettings>,
    pub json: bool,
}

impl Context {
    pub fn load(dir: PathBuf, settings_path: Option<PathBuf>, json: bool) -> anyhow::Result<Self> {
        let path = settings_path.unwrap_or_else(|| paths::settings_path(&dir));
        let file = FileSettings::load(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        tracing::debug!(settings = %file.path().display(), dir = %dir.display(), "context");
        Ok(Self {
            dir,
            settings: EnvOverlay::new(file),
            json,
        })
    }

    pub fn settings(&self) -> &dyn SettingsProvider {
        &self.settings
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> &Path {
        self.settings.inner().path()
    }
}
