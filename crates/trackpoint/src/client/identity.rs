//! Visitor and session identity.
//!
//! Identifiers are read-or-create against two injected key/value scopes: a
//! durable one for the visitor id and a volatile one for the session id.
//! Storage failures never surface to the caller; the manager falls back to an
//! identifier cached in memory for the rest of its lifetime.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Key holding the visitor id in the durable scope.
pub const VISITOR_KEY: &str = "analytics_client_id";

/// Key holding the session id in the session scope.
pub const SESSION_KEY: &str = "analytics_session_id";

/// Failure of a client-side key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage cannot be used at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not hold a JSON object of strings.
    #[error("corrupt identity file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A string key/value scope, the equivalent of browser local or session storage.
///
/// Writes are last-write-wins.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Read a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the scope cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the scope cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process scope. Used for session identity and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every key, as closing a tab drops session storage.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Durable scope persisted as a JSON object in a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Use `path` as the backing file. It is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Generate a visitor identifier (random UUID v4).
#[must_use]
pub fn generate_visitor_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a session identifier: `sess_<ISO-8601 creation time>_<8 hex chars>`.
#[must_use]
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "sess_{}_{}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
        &suffix[..8]
    )
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Visitor,
    Session,
}

impl Scope {
    fn key(self) -> &'static str {
        match self {
            Self::Visitor => VISITOR_KEY,
            Self::Session => SESSION_KEY,
        }
    }

    fn generate(self) -> String {
        match self {
            Self::Visitor => generate_visitor_id(),
            Self::Session => generate_session_id(Utc::now()),
        }
    }
}

#[derive(Debug, Default)]
struct Fallback {
    visitor: Option<String>,
    session: Option<String>,
}

impl Fallback {
    fn slot(&mut self, scope: Scope) -> &mut Option<String> {
        match scope {
            Scope::Visitor => &mut self.visitor,
            Scope::Session => &mut self.session,
        }
    }
}

/// Allocates and remembers visitor and session identifiers.
#[derive(Debug)]
pub struct IdentityManager {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    fallback: Mutex<Fallback>,
}

impl IdentityManager {
    /// Create a manager over a durable and a session scope.
    #[must_use]
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            session,
            fallback: Mutex::new(Fallback::default()),
        }
    }

    /// A manager whose scopes both live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// The visitor identifier, created on first access.
    #[must_use]
    pub fn visitor_id(&self) -> String {
        self.read_or_create(self.durable.as_ref(), Scope::Visitor)
    }

    /// The session identifier, created on first access.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.read_or_create(self.session.as_ref(), Scope::Session)
    }

    fn read_or_create(&self, store: &dyn KeyValueStore, scope: Scope) -> String {
        let key = scope.key();
        match store.get(key) {
            Ok(Some(id)) if !id.is_empty() => return id,
            Ok(_) => {}
            Err(e) => {
                warn!(key, error = %e, "Identity storage unreadable, using in-memory id");
                return self.fallback_id(scope, None);
            }
        }

        let candidate = scope.generate();
        if let Err(e) = store.set(key, &candidate) {
            warn!(key, error = %e, "Identity storage unwritable, using in-memory id");
            return self.fallback_id(scope, Some(candidate));
        }

        // a concurrent writer may have won; settle on whatever was stored
        match store.get(key) {
            Ok(Some(id)) if !id.is_empty() => {
                debug!(key, id = %id, "Allocated identifier");
                id
            }
            Ok(_) | Err(_) => self.fallback_id(scope, Some(candidate)),
        }
    }

    fn fallback_id(&self, scope: Scope, candidate: Option<String>) -> String {
        let mut fallback = self.fallback.lock().unwrap_or_else(PoisonError::into_inner);
        fallback
            .slot(scope)
            .get_or_insert_with(|| candidate.unwrap_or_else(|| scope.generate()))
            .clone()
    }
}
