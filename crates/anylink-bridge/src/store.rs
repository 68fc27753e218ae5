//! JSON file backed link storage.

use anylink_engine::{LinkStorage, StorageError};
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Every key lives in one JSON object on disk, rewritten on each `set`.
/// Without a path the values only live for the session.
#[derive(Debug, Default)]
pub struct FileStorage {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl FileStorage {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open `path`, starting empty when the file does not exist yet.
    pub async fn open(path: PathBuf) -> Result<Self, StorageError> {
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(StorageError(format!("{} is not a JSON object", path.display()))),
                Err(e) => return Err(StorageError(format!("{}: {e}", path.display()))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(StorageError(format!("{}: {e}", path.display()))),
        };
        debug!("opened {} with {} keys", path.display(), values.len());
        Ok(Self {
            path: Some(path),
            values,
        })
    }
}

#[async_trait(?Send)]
impl LinkStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&self.values).map_err(|e| StorageError(e.to_string()))?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| StorageError(format!("{}: {e}", path.display())))
    }
}
