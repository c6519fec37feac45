//! Single-document store with rotating backups.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::errors::AppError;

use super::format_timestamp;

const BACKUP_PREFIX: &str = "database.";
const BACKUP_SUFFIX: &str = ".yaml";

/// Store for the team database document.
///
/// Every overwrite first copies the current file into the backup directory,
/// then prunes the oldest backups beyond `max_backups`.
pub struct DocumentStore {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Open the store, creating its directories if needed.
    pub fn open(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        max_backups: usize,
    ) -> std::io::Result<Self> {
        let path = path.into();
        let backup_dir = backup_dir.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&backup_dir)?;

        Ok(Self {
            path,
            backup_dir,
            max_backups,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store at the locations named by the configuration.
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Self::open(config.db_path(), config.backup_dir(), config.max_backups)
    }

    /// Load the current document.
    pub fn load(&self) -> Result<Value, AppError> {
        if !self.path.exists() {
            tracing::info!("Database file not found at {:?}", self.path);
            return Err(AppError::NotFound("Database not found".to_string()));
        }

        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Modification time of the document, truncated to whole seconds.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        file_stamp(&self.path)
    }

    /// Overwrite the document unconditionally.
    pub fn save(&self, doc: &Value) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_document(doc)
    }

    /// Overwrite the document unless it changed after `since`.
    ///
    /// A missing document never conflicts. The comparison is at second
    /// precision: a document stamped exactly at `since` is not newer.
    pub fn save_if_unmodified_since(
        &self,
        doc: &Value,
        since: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(server) = self.last_modified() {
            if server > since {
                tracing::warn!(
                    "Rejecting stale write: server modified at {}, client read at {}",
                    format_timestamp(&server),
                    format_timestamp(&since)
                );
                return Err(AppError::Conflict {
                    message: "Server has newer version".to_string(),
                    server_modified_at: Some(format_timestamp(&server)),
                });
            }
        }

        self.write_document(doc)
    }

    /// Backup files currently on disk, oldest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, AppError> {
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(BACKUP_PREFIX)
                && name.ends_with(BACKUP_SUFFIX)
                && entry.file_type()?.is_file()
            {
                backups.push(entry.path());
            }
        }
        backups.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(backups)
    }

    /// Remove the oldest backups beyond `max_backups`. Failures are logged, never returned.
    pub fn prune_backups(&self) {
        let backups = match self.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                tracing::warn!("Failed to list backups in {:?}: {}", self.backup_dir, e);
                return;
            }
        };

        let excess = backups.len().saturating_sub(self.max_backups);
        for old in &backups[..excess] {
            match fs::remove_file(old) {
                Ok(()) => tracing::debug!("Pruned backup {:?}", old),
                Err(e) => tracing::warn!("Failed to remove old backup {:?}: {}", old, e),
            }
        }
    }

    fn write_document(&self, doc: &Value) -> Result<(), AppError> {
        let previous = self.last_modified();

        if self.path.exists() {
            self.backup_current()?;
            self.prune_backups();
        }

        let yaml = serde_yaml::to_string(doc)?;
        fs::write(&self.path, yaml)?;

        if let Some(previous) = previous {
            self.settle_stamp(previous);
        }

        tracing::debug!("Saved database to {:?}", self.path);
        Ok(())
    }

    /// Copy the current file verbatim into a new timestamped backup.
    fn backup_current(&self) -> Result<PathBuf, AppError> {
        let mut ts = Utc::now();
        let mut backup = self.backup_path(&ts);
        while backup.exists() {
            ts += TimeDelta::microseconds(1);
            backup = self.backup_path(&ts);
        }

        fs::copy(&self.path, &backup)?;
        tracing::debug!("Backed up database to {:?}", backup);
        Ok(backup)
    }

    fn backup_path(&self, ts: &DateTime<Utc>) -> PathBuf {
        self.backup_dir.join(format!(
            "{}{}Z{}",
            BACKUP_PREFIX,
            ts.format("%Y%m%dT%H%M%S%.6f"),
            BACKUP_SUFFIX
        ))
    }

    /// Runs after the document is already replaced, so a failure is only logged.
    fn settle_stamp(&self, previous: DateTime<Utc>) {
        if let Err(e) = self.advance_stamp(previous) {
            tracing::warn!("Failed to advance modification time of {:?}: {}", self.path, e);
        }
    }

    /// Make sure the new file's second-precision stamp is strictly later than `previous`.
    fn advance_stamp(&self, previous: DateTime<Utc>) -> Result<(), AppError> {
        if self.last_modified().is_some_and(|current| current > previous) {
            return Ok(());
        }

        let secs = u64::try_from(previous.timestamp() + 1).unwrap_or_default();
        let bumped = UNIX_EPOCH + Duration::from_secs(secs);
        fs::File::options()
            .write(true)
            .open(&self.path)?
            .set_modified(bumped)?;
        Ok(())
    }
}

fn file_stamp(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    DateTime::<Utc>::from_timestamp(i64::try_from(secs).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> PathBuf {
        dir.path().join("config").join("database.yaml")
    }

    fn open_store(dir: &TempDir, max_backups: usize) -> DocumentStore {
        DocumentStore::open(
            db_path(dir),
            dir.path().join("config").join("backups"),
            max_backups,
        )
        .unwrap()
    }

    fn document(version: &str) -> Value {
        json!({
            "version": version,
            "database": { "people": [], "teams": [], "projects": [] }
        })
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        assert!(matches!(store.load(), Err(AppError::NotFound(_))));
        assert!(store.last_modified().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        store.save(&document("20260107")).unwrap();
        assert_eq!(store.load().unwrap(), document("20260107"));
        assert!(store.last_modified().is_some());
        assert!(store.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_yaml_preserves_key_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        store.save(&document("20260107")).unwrap();
        let raw = fs::read_to_string(db_path(&dir)).unwrap();
        let version_at = raw.find("version").unwrap();
        let database_at = raw.find("database").unwrap();
        assert!(version_at < database_at);
    }

    #[test]
    fn test_backup_is_verbatim_copy_of_previous() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        fs::write(db_path(&dir), "# hand edited\nversion: '20250101'\n").unwrap();
        store.save(&document("20260107")).unwrap();

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(&backups[0]).unwrap(),
            "# hand edited\nversion: '20250101'\n"
        );
        let name = backups[0].file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("database.") && name.ends_with("Z.yaml"));
    }

    #[test]
    fn test_backups_pruned_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3);

        // The first save has nothing to back up; each later one backs up its predecessor.
        for day in 1..=5 {
            store.save(&document(&format!("202601{:02}", day))).unwrap();
        }

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 3);
        let versions: Vec<String> = backups
            .iter()
            .map(|p| {
                let doc: Value = serde_yaml::from_str(&fs::read_to_string(p).unwrap()).unwrap();
                doc["version"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(versions, vec!["20260102", "20260103", "20260104"]);
    }

    #[test]
    fn test_default_limit_keeps_ten_backups() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        store.save(&document("20260101")).unwrap();
        for _ in 0..11 {
            store.save(&document("20260102")).unwrap();
        }

        assert_eq!(store.list_backups().unwrap().len(), 10);
    }

    #[test]
    fn test_prune_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 1);
        let notes = dir.path().join("config").join("backups").join("README.txt");
        fs::write(&notes, "keep me").unwrap();

        for _ in 0..3 {
            store.save(&document("20260107")).unwrap();
        }

        assert_eq!(store.list_backups().unwrap().len(), 1);
        assert!(notes.exists());
    }

    #[test]
    fn test_each_save_advances_last_modified() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        store.save(&document("20260107")).unwrap();
        let first = store.last_modified().unwrap();
        store.save(&document("20260108")).unwrap();
        let second = store.last_modified().unwrap();
        store.save(&document("20260109")).unwrap();
        let third = store.last_modified().unwrap();

        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_failed_backup_aborts_save() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        store.save(&document("20260107")).unwrap();
        let before = store.last_modified();

        let backups = dir.path().join("config").join("backups");
        fs::remove_dir_all(&backups).unwrap();
        fs::write(&backups, "not a directory").unwrap();

        let err = store.save(&document("20260108")).unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(store.load().unwrap(), document("20260107"));
        assert_eq!(store.last_modified(), before);
    }

    #[test]
    fn test_stamp_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        // Nothing to open: the failure is logged and swallowed
        store.settle_stamp(Utc::now());
        assert!(store.last_modified().is_none());
    }

    #[test]
    fn test_conditional_save() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        // No document yet: any timestamp is accepted.
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        store
            .save_if_unmodified_since(&document("20260101"), epoch)
            .unwrap();

        let t0 = store.last_modified().unwrap();
        store
            .save_if_unmodified_since(&document("20260102"), t0)
            .unwrap();

        let err = store
            .save_if_unmodified_since(&document("20260103"), t0)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(store.load().unwrap()["version"], "20260102");

        // Unconditional saves skip the check.
        store.save(&document("20260104")).unwrap();
        assert_eq!(store.load().unwrap()["version"], "20260104");
    }
}
