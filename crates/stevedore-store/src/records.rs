use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// On-disk wrapper: the record plus a blake3 checksum of its compact JSON.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    record: serde_json::Value,
}

fn checksum(record: &serde_json::Value) -> Result<String, StoreError> {
    let json = serde_json::to_string(record)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Bucket and key names become path components.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.len() > 128 {
        return Err(StoreError::InvalidKey(
            "key must be 1-128 characters".to_owned(),
        ));
    }
    if key.starts_with('.') || key.contains('/') || key.contains('\\') || key.contains('\0') {
        return Err(StoreError::InvalidKey(format!(
            "'{key}' must not start with '.' or contain path separators"
        )));
    }
    Ok(())
}

/// Bucket/key record store. Records are opaque JSON documents; callers pick
/// the type they marshal to and from.
#[derive(Debug, Clone)]
pub struct RecordStore {
    layout: StoreLayout,
}

impl RecordStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn put<T: Serialize>(&self, bucket: &str, key: &str, record: &T) -> Result<(), StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;

        let value = serde_json::to_value(record)?;
        let envelope = Envelope {
            checksum: checksum(&value)?,
            record: value,
        };
        let content = serde_json::to_string_pretty(&envelope)?;

        let dir = self.layout.bucket_dir(bucket);
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(key))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        debug!("stored {bucket}/{key}");
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<T, StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;

        let path = self.layout.record_path(bucket, key);
        if !path.exists() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let envelope: Envelope = serde_json::from_str(&content)?;

        let actual = checksum(&envelope.record)?;
        if actual != envelope.checksum {
            return Err(StoreError::IntegrityFailure {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                expected: envelope.checksum,
                actual,
            });
        }

        Ok(serde_json::from_value(envelope.record)?)
    }

    /// Like [`get`](Self::get), but an absent record yields `T::default()`.
    pub fn get_or_default<T: DeserializeOwned + Default>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<T, StoreError> {
        match self.get(bucket, key) {
            Err(e) if e.is_not_found() => Ok(T::default()),
            other => other,
        }
    }

    /// Deleting an absent record is not an error.
    pub fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;
        let path = self.layout.record_path(bucket, key);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("deleted {bucket}/{key}");
        }
        Ok(())
    }

    pub fn exists(&self, bucket: &str, key: &str) -> bool {
        validate_key(bucket).is_ok()
            && validate_key(key).is_ok()
            && self.layout.record_path(bucket, key).exists()
    }

    /// Sorted keys of every record in `bucket`; an absent bucket is empty.
    pub fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        validate_key(bucket)?;
        let dir = self.layout.bucket_dir(bucket);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str() {
                Some(n) if !n.starts_with('.') => keys.push(n.to_owned()),
                Some(_) => {}
                None => warn!("skipping non UTF-8 record name in bucket '{bucket}'"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
