#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::system_time_now_ms;
use crate::record_store::{RecordStore, StoreError};

const PROFILE_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ProfileDocument {
    schema_version: u8,
    entries: BTreeMap<String, ProfileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileEntry {
    raw: String,
    updated_at_unix_ms: u64,
}

/// One JSON document per visitor profile. The document is re-read on every
/// call so separate processes sharing the file observe each other's writes.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn default_local() -> Self {
        let path = env::var("SOLGATE_STORE_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_profile_path);
        Self::for_path(path)
    }

    pub fn for_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<ProfileDocument>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let doc = serde_json::from_str::<ProfileDocument>(&raw)?;
        if doc.schema_version != PROFILE_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                found: doc.schema_version,
            });
        }
        Ok(Some(doc))
    }

    /// A document that cannot be read is replaced rather than blocking writes.
    fn read_document_for_write(&self) -> ProfileDocument {
        match self.read_document() {
            Ok(Some(doc)) => doc,
            Ok(None) => ProfileDocument::default(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "unreadable profile document replaced on write"
                );
                ProfileDocument::default()
            }
        }
    }

    fn write_document(&self, doc: &mut ProfileDocument) -> Result<(), StoreError> {
        doc.schema_version = PROFILE_SCHEMA_VERSION;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path, &serialized)
    }
}

impl RecordStore for FileRecordStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        match self.read_document() {
            Ok(Some(doc)) => doc.entries.get(key).map(|entry| entry.raw.clone()),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    key,
                    error = %err,
                    "profile document unreadable; key treated as absent"
                );
                None
            }
        }
    }

    fn set_raw(&mut self, key: &str, raw: String) -> Result<(), StoreError> {
        let mut doc = self.read_document_for_write();
        doc.entries.insert(
            key.to_string(),
            ProfileEntry {
                raw,
                updated_at_unix_ms: system_time_now_ms().0,
            },
        );
        self.write_document(&mut doc)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut doc = self.read_document_for_write();
        if doc.entries.remove(key).is_some() {
            self.write_document(&mut doc)?;
        }
        Ok(())
    }
}

fn default_profile_path() -> PathBuf {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join("solgate")
            .join("profile.json");
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("solgate")
            .join("profile.json");
    }
    PathBuf::from(".solgate").join("profile.json")
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
