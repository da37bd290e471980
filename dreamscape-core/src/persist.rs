//! Persistence for the dream history and the graph snapshot.
//!
//! Both stores are traits so the backing store can be swapped; the JSON file
//! implementations here match the on-disk layout:
//!
//! ```text
//! dreams.json        {"entries": [{"dream": "...", "entities": ["..."]}]}
//! cooccurrences.json {"nodes": [{"id": "..."}], "links": [{"source", "target", "value"}]}
//! ```
//!
//! Missing, empty or unparsable files read as the empty default. A history
//! file that parses keeps all of its entries even when some fields are
//! malformed. Write failures are always reported.

use crate::graph::Graph;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A submitted dream and the entities extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamEntry {
    /// The trimmed dream text.
    #[serde(rename = "dream", default, deserialize_with = "string_or_empty")]
    pub text: String,

    /// Normalized entity names, unique and in first-seen order.
    #[serde(default, deserialize_with = "string_items")]
    pub entities: Vec<String>,
}

impl DreamEntry {
    pub fn new(text: impl Into<String>, entities: Vec<String>) -> Self {
        Self {
            text: text.into(),
            entities,
        }
    }
}

/// A JSON string, or empty for any other value.
fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

/// Keep only the string items of a JSON array; anything else reads as empty.
fn string_items<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// The persisted dream history document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamHistory {
    #[serde(default, deserialize_with = "object_entries")]
    pub entries: Vec<DreamEntry>,
}

/// Read every object item of the `entries` array as an entry. Items that are
/// not objects cannot hold a dream and are skipped.
fn object_entries<'de, D>(deserializer: D) -> Result<Vec<DreamEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let serde_json::Value::Array(items) = serde_json::Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    items
        .into_iter()
        .filter(serde_json::Value::is_object)
        .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
        .collect()
}

/// Durable, append-only record of submitted dreams.
#[async_trait]
pub trait DreamStore: Send + Sync {
    /// All entries in submission order. Absent or corrupt data reads as empty.
    async fn load(&self) -> Result<Vec<DreamEntry>, PersistError>;

    /// Append an entry. Must be durable when this returns `Ok`.
    async fn append(&self, entry: DreamEntry) -> Result<(), PersistError>;
}

/// Durable snapshot of the last computed graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// The stored graph. Absent or corrupt data reads as the empty graph.
    async fn load(&self) -> Result<Graph, PersistError>;

    /// Replace the stored graph. Must be durable when this returns `Ok`.
    async fn save(&self, graph: &Graph) -> Result<(), PersistError>;
}

#[async_trait]
impl<T: DreamStore + ?Sized> DreamStore for Arc<T> {
    async fn load(&self) -> Result<Vec<DreamEntry>, PersistError> {
        (**self).load().await
    }

    async fn append(&self, entry: DreamEntry) -> Result<(), PersistError> {
        (**self).append(entry).await
    }
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    async fn load(&self) -> Result<Graph, PersistError> {
        (**self).load().await
    }

    async fn save(&self, graph: &Graph) -> Result<(), PersistError> {
        (**self).save(graph).await
    }
}

/// Dream history kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonDreamStore {
    path: PathBuf,
}

impl JsonDreamStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the file exists and holds a valid history document.
    pub async fn ensure_initialized(&self) -> Result<bool, PersistError> {
        ensure_initialized::<DreamHistory>(&self.path).await
    }
}

#[async_trait]
impl DreamStore for JsonDreamStore {
    async fn load(&self) -> Result<Vec<DreamEntry>, PersistError> {
        let history: DreamHistory = read_or_default(&self.path).await?;
        Ok(history.entries)
    }

    async fn append(&self, entry: DreamEntry) -> Result<(), PersistError> {
        let mut history: DreamHistory = read_or_default(&self.path).await?;
        history.entries.push(entry);
        write_json(&self.path, &history).await
    }
}

/// Graph snapshot kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonGraphStore {
    path: PathBuf,
}

impl JsonGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the file exists and holds a valid graph document.
    pub async fn ensure_initialized(&self) -> Result<bool, PersistError> {
        ensure_initialized::<Graph>(&self.path).await
    }
}

#[async_trait]
impl GraphStore for JsonGraphStore {
    async fn load(&self) -> Result<Graph, PersistError> {
        read_or_default(&self.path).await
    }

    async fn save(&self, graph: &Graph) -> Result<(), PersistError> {
        write_json(&self.path, graph).await
    }
}

/// Read a JSON document, substituting the default when it is missing,
/// empty or unparsable (including bytes that are not UTF-8). Other I/O
/// errors are returned.
async fn read_or_default<T>(path: &Path) -> Result<T, PersistError>
where
    T: DeserializeOwned + Default,
{
    let Some(bytes) = read_bytes(path).await? else {
        return Ok(T::default());
    };

    if is_blank(&bytes) {
        return Ok(T::default());
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt store file, using empty default");
            Ok(T::default())
        }
    }
}

/// File contents, or `None` when the file does not exist.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, PersistError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Write a JSON document through a temporary sibling file and rename it into
/// place, so readers never see a partial write.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the default document if the file is missing, empty or invalid.
///
/// Returns whether the file was (re)written.
async fn ensure_initialized<T>(path: &Path) -> Result<bool, PersistError>
where
    T: DeserializeOwned + Serialize + Default,
{
    match read_bytes(path).await? {
        Some(bytes) if !is_blank(&bytes) => {
            if serde_json::from_slice::<T>(&bytes).is_ok() {
                return Ok(false);
            }
            tracing::warn!(path = %path.display(), "initializing store file with default JSON");
        }
        _ => tracing::debug!(path = %path.display(), "creating store file"),
    }

    write_json(path, &T::default()).await?;
    Ok(true)
}
