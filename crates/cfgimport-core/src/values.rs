use crate::error::{ImportError, Result};
use crate::io;
use std::collections::BTreeMap;
use std::path::Path;

/// Flat key → value mapping read from one config file.
pub type ConfigMap = BTreeMap<String, String>;

/// Load a flat JSON object of strings. A missing file yields an empty map.
pub fn load(path: &Path) -> Result<ConfigMap> {
    let text = io::read_optional(path).map_err(|e| file_read(path, e))?;
    match text {
        None => {
            tracing::debug!(path = %path.display(), "no values file, using empty map");
            Ok(ConfigMap::new())
        }
        Some(text) => parse(&text).map_err(|e| file_read(path, e)),
    }
}

/// Load a file that must exist.
pub fn load_required(path: &Path) -> Result<ConfigMap> {
    if !path.is_file() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        return Err(file_read(path, missing.into()));
    }
    load(path)
}

fn parse(text: &str) -> Result<ConfigMap> {
    Ok(serde_json::from_str::<ConfigMap>(text)?)
}

fn file_read(path: &Path, source: ImportError) -> ImportError {
    ImportError::FileRead {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Merge `base` with `stage`, stage values winning on conflict.
pub fn resolve(base: &ConfigMap, stage: &ConfigMap) -> ConfigMap {
    let mut resolved = base.clone();
    for (key, value) in stage {
        resolved.insert(key.clone(), value.clone());
    }
    resolved
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
