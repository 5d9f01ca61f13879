//! Graph store boundary: the trait services depend on, and its implementations.
//!
//! The store is a keyed record store. It offers no multi-record transaction;
//! every `put`/`delete` is an independent write.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::Node;

/// Errors raised by a graph store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write access to node records.
pub trait GraphStore: Send + Sync {
    /// Full snapshot of all records, in storage order.
    fn list_all(&self) -> StoreResult<Vec<Node>>;

    /// Fetch one record by id.
    fn get_one(&self, id: &str) -> StoreResult<Node>;

    /// Upsert the record stored under `id`.
    fn put(&self, id: &str, node: &Node) -> StoreResult<()>;

    /// Remove the record stored under `id`.
    fn delete(&self, id: &str) -> StoreResult<()>;
}

// ============================================================
// Record-list semantics shared by the implementations
// ============================================================
//
// Records are kept as a list rather than a map so that colliding ids, which
// the analyzer must be able to see, can be represented. Lookups hit the first
// record with a matching id.

fn find_one(records: &[Node], id: &str) -> StoreResult<Node> {
    records
        .iter()
        .find(|n| n.id == id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn upsert(records: &mut Vec<Node>, id: &str, node: &Node) {
    let mut stored = node.clone();
    stored.id = id.to_string();
    match records.iter_mut().find(|n| n.id == id) {
        Some(slot) => *slot = stored,
        None => records.push(stored),
    }
}

fn remove(records: &mut Vec<Node>, id: &str) -> StoreResult<()> {
    let pos = records
        .iter()
        .position(|n| n.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    records.remove(pos);
    Ok(())
}

// ============================================================
// IMPLEMENTATIONS
// ============================================================

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    records: RwLock<Vec<Node>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self {
            records: RwLock::new(nodes),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("in-memory store lock poisoned".to_string())
    }
}

impl GraphStore for InMemoryGraphStore {
    fn list_all(&self) -> StoreResult<Vec<Node>> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.clone())
    }

    fn get_one(&self, id: &str) -> StoreResult<Node> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        find_one(&records, id)
    }

    fn put(&self, id: &str, node: &Node) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        upsert(&mut records, id, node);
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        remove(&mut records, id)
    }
}

/// Store backed by a JSON array file.
///
/// Every call reads the file again, so external edits between calls are seen.
/// Writes go to a temp file in the same directory which then replaces the
/// target, so readers never observe a half-written file.
#[derive(Debug)]
pub struct JsonFileGraphStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<Vec<Node>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("load: {} missing, empty graph", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::io(
                    format!("read {}", self.path.display()),
                    e,
                ))
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<Node> = serde_json::from_str(&content)?;
        trace!("load: {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn save(&self, records: &[Node]) -> StoreResult<()> {
        use std::io::Write;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;

        let json = serde_json::to_string_pretty(records)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StoreError::io(format!("temp file in {}", dir.display()), e))?;
        writeln!(tmp, "{json}")
            .map_err(|e| StoreError::io(format!("write temp file for {}", self.path.display()), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(format!("replace {}", self.path.display()), e.error))?;
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("file store lock poisoned".to_string())
    }
}

impl GraphStore for JsonFileGraphStore {
    fn list_all(&self) -> StoreResult<Vec<Node>> {
        let _guard = self.lock.read().map_err(|_| Self::poisoned())?;
        self.load()
    }

    fn get_one(&self, id: &str) -> StoreResult<Node> {
        let _guard = self.lock.read().map_err(|_| Self::poisoned())?;
        find_one(&self.load()?, id)
    }

    fn put(&self, id: &str, node: &Node) -> StoreResult<()> {
        let _guard = self.lock.write().map_err(|_| Self::poisoned())?;
        let mut records = self.load()?;
        upsert(&mut records, id, node);
        self.save(&records)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let _guard = self.lock.write().map_err(|_| Self::poisoned())?;
        let mut records = self.load()?;
        remove(&mut records, id)?;
        self.save(&records)
    }
}
