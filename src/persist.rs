//! Atomic JSON document persistence shared by the file-backed stores

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// Write `bytes` to a temp file beside `path`, then rename it into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes()).await
}

/// Load a JSON document, or `None` when the file does not exist yet.
pub(crate) async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create the parent directory of `path` when missing.
pub(crate) async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        assert_ok!(ensure_parent(&path).await);

        let mut doc = BTreeMap::new();
        doc.insert("a".to_string(), 1);
        assert_ok!(save_json(&path, &doc).await);

        let loaded: BTreeMap<String, i32> = load_json(&path).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<BTreeMap<String, i32>> =
            load_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }
}
