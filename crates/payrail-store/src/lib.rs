//! The Durable Store capability: atomic read/append/replace of JSON and
//! JSONL blobs under a per-key advisory lock.
//!
//! Grounded on the teacher's `DomainStore::persist_state`/`load_state`
//! (tmp-sibling write + rename for crash-atomic replace, tolerant load that
//! falls back to a default on a missing or corrupt file) and the original
//! `FileStore` (`shared/file_store.py`): atomic `write_json`, append-only
//! `append_jsonl` that discards partial trailing lines on read, and
//! `write_csv`/`read_csv` over a fixed header row.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record at {path}")]
    Corrupt { path: PathBuf },
}

/// File-backed reference implementation of the Durable Store contract.
/// Locking is per logical key: concurrent operations against unrelated
/// keys never block each other, while operations against the same key
/// serialize through one `RwLock`.
pub struct FileDurableStore {
    root: PathBuf,
    locks: Mutex<BTreeMap<PathBuf, Arc<RwLock<()>>>>,
}

impl FileDurableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Reads JSON from `key`, returning `T::default()` if the file does not
    /// exist. A malformed file surfaces as `StoreError::Corrupt`.
    pub async fn read_json<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.read().await;
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|_| StoreError::Corrupt { path }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Crash-atomic replace: write a temp sibling, then rename over the
    /// target. The rename is atomic on the same filesystem.
    pub async fn write_json<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.write().await;
        Self::ensure_parent(&path).await?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|_| StoreError::Corrupt {
            path: path.clone(),
        })?;
        let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })
    }

    /// Appends one JSON record as a line, under the key's lock.
    pub async fn append_jsonl<T>(&self, key: &str, record: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        use tokio::io::AsyncWriteExt;

        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.write().await;
        Self::ensure_parent(&path).await?;
        let mut line = serde_json::to_vec(record).map_err(|_| StoreError::Corrupt {
            path: path.clone(),
        })?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(&line)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Reads every well-formed line as a JSON record. Blank lines and
    /// malformed/partial lines are skipped and logged, never fail the read.
    pub async fn read_jsonl<T>(&self, key: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.read().await;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut out = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(record) => out.push(record),
                Err(_) => {
                    tracing::warn!(path = %path.display(), line = lineno, "skipping corrupt jsonl record");
                }
            }
        }
        Ok(out)
    }

    /// Writes a CSV file with an exact header row, overwriting the target
    /// atomically the same way `write_json` does.
    pub async fn write_csv(
        &self,
        key: &str,
        headers: &[&str],
        rows: &[Vec<String>],
    ) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.write().await;
        Self::ensure_parent(&path).await?;
        let mut text = String::new();
        text.push_str(&headers.join(","));
        text.push('\n');
        for row in rows {
            text.push_str(&row.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(","));
            text.push('\n');
        }
        let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, text.as_bytes())
            .await
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })
    }

    /// Reads a CSV file into header-keyed rows, in file order.
    pub async fn read_csv(&self, key: &str) -> Result<Vec<BTreeMap<String, String>>, StoreError> {
        let path = self.path_for(key);
        let lock = self.lock_for(&path).await;
        let _guard = lock.read().await;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut lines = text.lines();
        let Some(header_line) = lines.next() else {
            return Ok(Vec::new());
        };
        let headers = parse_csv_line(header_line);
        let mut out = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = parse_csv_line(line);
            let mut row = BTreeMap::new();
            for (idx, header) in headers.iter().enumerate() {
                row.insert(header.clone(), fields.get(idx).cloned().unwrap_or_default());
            }
            out.push(row);
        }
        Ok(out)
    }

    /// True if a key currently resolves to an existing file.
    pub async fn exists(&self, key: &str) -> bool {
        tokio::fs::metadata(self.path_for(key)).await.is_ok()
    }

    /// Lists files directly under a key treated as a directory prefix,
    /// returning keys relative to the store root. Used by the audit
    /// endpoints that glob `settlement/*.csv` and `reconciliation/*.json`.
    pub async fn list_keys_under(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.path_for(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: dir,
                    source,
                })
            }
        };
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(format!("{prefix}/{name}"));
            }
        }
        names.sort();
        Ok(names)
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
