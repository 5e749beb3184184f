//! One import run: settings → stage → files → merge → store.
//!
//! Stage selection is left to the caller (the CLI prompts for it); this module
//! takes an already-validated [`StageName`].

use crate::error::{ImportError, Result};
use crate::kv::{self, KvStore, SdConfig};
use crate::paths;
use crate::settings::{http_timeout, ImportSettings, SettingsProvider};
use crate::stage::StageName;
use crate::values::{self, ConfigMap};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything resolved before the first write.
#[derive(Debug, Clone, Serialize)]
pub struct ImportPlan {
    pub stage: StageName,
    pub sd: SdConfig,
    pub base_file: PathBuf,
    pub stage_file: PathBuf,
    pub stage_file_found: bool,
    #[serde(skip)]
    pub values: ConfigMap,
    pub show_values: bool,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub stage: String,
    pub target: String,
    pub written: usize,
}

impl ImportPlan {
    /// Resolve the store settings for `stage`, read both files and merge them.
    pub fn prepare(
        settings: &dyn SettingsProvider,
        dir: &Path,
        import: &ImportSettings,
        stage: &StageName,
    ) -> Result<Self> {
        let sd = SdConfig::for_stage(settings, stage)?;
        let timeout = http_timeout(settings)?;

        let base_file = paths::base_file(dir, &import.file_name, &import.file_ext);
        let stage_file =
            paths::stage_file(dir, &import.file_name, stage.as_str(), &import.file_ext);

        let base = values::load_required(&base_file)?;
        let overrides = values::load(&stage_file)?;
        let stage_file_found = stage_file.is_file();
        tracing::info!(
            base = base.len(),
            overrides = overrides.len(),
            stage = %stage,
            "loaded values"
        );

        Ok(Self {
            stage: stage.clone(),
            sd,
            base_file,
            stage_file,
            stage_file_found,
            values: values::resolve(&base, &overrides),
            show_values: import.show_values,
            timeout,
        })
    }

    /// Full KV paths that [`ImportPlan::execute`] would write, in order.
    pub fn key_paths(&self) -> Vec<String> {
        self.values.keys().map(|k| self.sd.key_path(k)).collect()
    }

    /// Write the merged values through a fresh Consul connection.
    pub fn execute(&self) -> Result<ImportReport> {
        let written = kv::import(&self.sd, &self.values, self.show_values, self.timeout)
            .map_err(|e| self.wrap(e))?;
        Ok(self.report(written))
    }

    /// Write the merged values into `store`.
    pub fn execute_with(&self, store: &dyn KvStore) -> Result<ImportReport> {
        let written = kv::import_into(store, &self.sd, &self.values, self.show_values)
            .map_err(|e| self.wrap(e))?;
        Ok(self.report(written))
    }

    fn wrap(&self, e: ImportError) -> ImportError {
        ImportError::ImportFailed {
            target: self.sd.target(),
            source: Box::new(e),
        }
    }

    fn report(&self, written: usize) -> ImportReport {
        ImportReport {
            stage: self.stage.to_string(),
            target: self.sd.target(),
            written,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{
        MapSettings, KEY_FILE_EXT, KEY_FILE_NAME, KEY_SHOW_VALUES, KEY_STAGES,
    };
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryStore {
        entries: RefCell<Vec<(String, String)>>,
    }

    impl KvStore for MemoryStore {
        fn put(&self, path: &str, value: &[u8]) -> Result<()> {
            self.entries
                .borrow_mut()
                .push((path.to_string(), String::from_utf8_lossy(value).into_owned()));
            Ok(())
        }
    }

    fn settings(url: &str) -> MapSettings {
        MapSettings::new()
            .with(KEY_FILE_NAME, "appsettings")
            .with(KEY_FILE_EXT, "json")
            .with(KEY_STAGES, "dev,prod")
            .with(KEY_SHOW_VALUES, "false")
            .with("sd.address.prod", url)
            .with("sd.prefix.prod", "app/svc")
    }

    fn prepare(dir: &Path, settings: &MapSettings) -> Result<ImportPlan> {
        let import = ImportSettings::resolve(settings)?;
        let stage = import.stages.select("prod")?;
        ImportPlan::prepare(settings, dir, &import, &stage)
    }

    #[test]
    fn base_and_stage_files_merge_into_three_writes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.json"), r#"{"a":"1","b":"2"}"#).unwrap();
        std::fs::write(dir.path().join("appsettings.prod.json"), r#"{"b":"20","c":"30"}"#)
            .unwrap();

        let plan = prepare(dir.path(), &settings("http://consul:8500")).unwrap();
        assert!(plan.stage_file_found);
        let store = MemoryStore::default();
        let report = plan.execute_with(&store).unwrap();

        assert_eq!(report.written, 3);
        assert_eq!(report.target, "http://consul:8500app/svc");
        assert_eq!(
            *store.entries.borrow(),
            vec![
                ("app/svc/a".to_string(), "1".to_string()),
                ("app/svc/b".to_string(), "20".to_string()),
                ("app/svc/c".to_string(), "30".to_string()),
            ]
        );
    }

    #[test]
    fn missing_stage_file_uses_base_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.json"), r#"{"a":"1"}"#).unwrap();
        let plan = prepare(dir.path(), &settings("http://consul:8500")).unwrap();
        assert!(!plan.stage_file_found);
        assert_eq!(plan.key_paths(), vec!["app/svc/a".to_string()]);
    }

    #[test]
    fn missing_base_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.prod.json"), r#"{"a":"1"}"#).unwrap();
        let err = prepare(dir.path(), &settings("http://consul:8500")).unwrap_err();
        assert!(matches!(err, ImportError::FileRead { .. }));
    }

    #[test]
    fn malformed_base_file_imports_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.json"), "not json").unwrap();
        let err = prepare(dir.path(), &settings("http://consul:8500")).unwrap_err();
        assert!(err.to_string().contains("appsettings.json"));
    }

    #[test]
    fn execute_failure_names_target() {
        let mut server = mockito::Server::new();
        server
            .mock("PUT", mockito::Matcher::Any)
            .with_status(500)
            .create();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.json"), r#"{"a":"1"}"#).unwrap();

        let plan = prepare(dir.path(), &settings(&server.url())).unwrap();
        let err = plan.execute().unwrap_err();
        assert!(err.to_string().contains(&format!("{}app/svc", server.url())));
    }

    #[test]
    fn execute_writes_through_consul() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PUT", mockito::Matcher::Regex("^/v1/kv/app/svc/".to_string()))
            .with_body("true")
            .expect(2)
            .create();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("appsettings.json"), r#"{"a":"1","b":"2"}"#).unwrap();

        let plan = prepare(dir.path(), &settings(&server.url())).unwrap();
        let report = plan.execute().unwrap();
        assert_eq!(report.written, 2);
        mock.assert();
    }
}
