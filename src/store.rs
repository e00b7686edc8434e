use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("required file {} is missing", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }
}

/// Reads and parses a JSON file, distinguishing "not there yet" from
/// "there but unreadable". Corrupt files are surfaced, never discarded.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    let value = serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: err,
    })?;
    Ok(Some(value))
}

/// Full-overwrite persistence: serialize to a sibling temp file, then
/// rename over the target so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let body = serde_json::to_vec_pretty(value).map_err(|err| StoreError::Write {
        path: path.to_path_buf(),
        source: io::Error::other(err),
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &body).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn read_json_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out: Option<Vec<String>> = read_json(&dir.path().join("absent.json")).expect("read");
        assert!(out.is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("values.json");
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), 1u32);
        write_json_atomic(&path, &values).expect("write");
        let loaded: BTreeMap<String, u32> = read_json(&path).expect("read").expect("present");
        assert_eq!(loaded, values);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").expect("write");
        let out: Result<Option<Vec<String>>, _> = read_json(&path);
        assert!(out.expect_err("should fail").is_corrupt());
    }
}
