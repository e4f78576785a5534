//! Small helpers for the JSON snapshot files the stores persist to.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::InfraError;

/// Read and deserialize `path`. A missing file yields `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, InfraError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Serialize `value` to `path`, creating parent directories.
///
/// Writes to a sibling temp file first and renames it into place so a
/// crash never leaves a truncated snapshot behind.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), InfraError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let out: Option<BTreeMap<String, f64>> =
            read_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn write_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learning/weights.json");
        let value = BTreeMap::from([("a".to_string(), 0.5)]);

        write_json(&path, &value).await.unwrap();
        let back: BTreeMap<String, f64> = read_json(&path).await.unwrap().unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = read_json::<BTreeMap<String, f64>>(&path).await.unwrap_err();
        assert!(matches!(err, InfraError::Json(_)));
    }
}
