use crate::store::{self, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedImage {
    pub image_file: String,
    pub remote_url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStats {
    #[serde(default)]
    pub searched: u64,
    #[serde(default)]
    pub matched: u64,
    #[serde(default)]
    pub downloaded: u64,
}

/// The durable record of what has already been done. A key in `completed`
/// is never reprocessed; a key in `failed` is skipped until the failed
/// list is explicitly reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    #[serde(default)]
    pub completed: BTreeMap<String, CompletedImage>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub stats: RunStats,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    pub record: Checkpoint,
}

impl CheckpointStore {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let record = store::read_json(path)?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    /// Full-overwrite flush. Called every few processed items and at phase
    /// end, so a crash loses at most one flush interval of work.
    pub fn save(&self) -> Result<(), StoreError> {
        store::write_json_atomic(&self.path, &self.record)
    }

    pub fn is_done(&self, group_key: &str) -> bool {
        self.record.completed.contains_key(group_key)
            || self.record.failed.iter().any(|key| key == group_key)
    }

    pub fn record_completed(&mut self, group_key: &str, image_file: String, remote_url: String) {
        self.record.failed.retain(|key| key != group_key);
        self.record.completed.insert(
            group_key.to_string(),
            CompletedImage {
                image_file,
                remote_url,
            },
        );
        self.record.stats.downloaded += 1;
    }

    pub fn record_failed(&mut self, group_key: &str) {
        if self.record.completed.contains_key(group_key) {
            return;
        }
        if !self.record.failed.iter().any(|key| key == group_key) {
            self.record.failed.push(group_key.to_string());
        }
    }

    pub fn clear_failed(&mut self) -> usize {
        let cleared = self.record.failed.len();
        self.record.failed.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cp = CheckpointStore::load(&dir.path().join("checkpoint.json")).expect("load");
        assert!(cp.record.completed.is_empty());
        assert!(cp.record.failed.is_empty());
        assert_eq!(cp.record.stats, RunStats::default());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.json");

        let mut cp = CheckpointStore::load(&path).expect("load");
        cp.record_completed(
            "Chanel No. 5",
            "/images/products/chanel-no-5-abc123.jpg".into(),
            "https://example.test/perfume/Chanel/Chanel-No-5-28.html".into(),
        );
        cp.record_failed("Unfindable Scent");
        cp.record.stats.searched = 7;
        cp.save().expect("save");

        let cp = CheckpointStore::load(&path).expect("reload");
        assert_eq!(cp.record.completed.len(), 1);
        assert_eq!(cp.record.failed, vec!["Unfindable Scent".to_string()]);
        assert_eq!(cp.record.stats.searched, 7);
        assert_eq!(cp.record.stats.downloaded, 1);
        assert!(cp.is_done("Chanel No. 5"));
        assert!(cp.is_done("Unfindable Scent"));
        assert!(!cp.is_done("Something Else"));
    }

    #[test]
    fn record_failed_deduplicates_and_never_shadows_completed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cp = CheckpointStore::load(&dir.path().join("checkpoint.json")).expect("load");
        cp.record_failed("Twice");
        cp.record_failed("Twice");
        assert_eq!(cp.record.failed.len(), 1);

        cp.record_completed("Twice", "/images/products/twice-000000.jpg".into(), "u".into());
        assert!(cp.record.failed.is_empty());
        cp.record_failed("Twice");
        assert!(cp.record.failed.is_empty());
    }

    #[test]
    fn clear_failed_keeps_completions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cp = CheckpointStore::load(&dir.path().join("checkpoint.json")).expect("load");
        cp.record_completed("Done", "/images/products/done-000000.jpg".into(), "u".into());
        cp.record_failed("Miss");
        assert_eq!(cp.clear_failed(), 1);
        assert!(cp.record.failed.is_empty());
        assert_eq!(cp.record.completed.len(), 1);
    }

    #[test]
    fn corrupt_checkpoint_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{\"completed\": 3}").expect("write");
        assert!(CheckpointStore::load(&path).expect_err("corrupt").is_corrupt());
    }
}
