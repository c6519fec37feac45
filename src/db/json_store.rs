//! Namespaced JSON key/value files.
//!
//! Values live at `<root>/<namespace>/<key>.json` and are replaced atomically
//! by writing a temporary file and renaming it over the old one.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::AppError;

/// File-backed JSON storage.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, namespace: &str, key: &str) -> std::io::Result<PathBuf> {
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.json", key.replace('/', "_"))))
    }

    /// Load a value; `None` if the key was never saved.
    pub fn load<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>, AppError> {
        let path = self.path_for(namespace, key)?;
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(&path)?;
        let value = serde_json::from_slice(&raw)?;
        tracing::debug!("Loaded json {:?}", path);
        Ok(Some(value))
    }

    /// Save a value, replacing any previous one.
    pub fn save<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<(), AppError> {
        let path = self.path_for(namespace, key)?;
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(value)?)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
