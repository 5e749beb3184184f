use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory constants (relative to the working directory)
// ---------------------------------------------------------------------------

pub const SETTINGS_FILE: &str = "cfgimport.yaml";
pub const VERSION_FILE: &str = "currentVersion.txt";
pub const LOGS_DIR: &str = "logs";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `{name}.{ext}` — values shared by every stage.
pub fn base_file(dir: &Path, name: &str, ext: &str) -> PathBuf {
    dir.join(format!("{name}.{ext}"))
}

/// `{name}.{stage}.{ext}` — values that override the base file for one stage.
pub fn stage_file(dir: &Path, name: &str, stage: &str, ext: &str) -> PathBuf {
    dir.join(format!("{name}.{stage}.{ext}"))
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILE)
}

pub fn version_path(dir: &Path) -> PathBuf {
    dir.join(VERSION_FILE)
}

pub fn logs_dir(dir: &Path) -> PathBuf {
    dir.join(LOGS_DIR)
}

/// `logs/log-2026-10-16.txt`
pub fn log_file(dir: &Path, date: &str) -> PathBuf {
    logs_dir(dir).join(format!("log-{date}.txt"))
}

/// Full KV path for a key: `{prefix}/{key}`, without doubled separators.
pub fn kv_path(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}
