use cfgimport_core::paths::SETTINGS_FILE;
use std::path::{Path, PathBuf};

/// Resolve the working directory.
///
/// Priority:
/// 1. `--dir` flag / `CFGIMPORT_DIR` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `cfgimport.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_settings_dir(&cwd).unwrap_or(cwd)
}

fn find_settings_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(SETTINGS_FILE).is_file() {
            return Some(dir);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}
