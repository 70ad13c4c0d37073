//! Per-user panel API key storage.
//!
//! The in-memory map is the source of truth for reads; every mutation is
//! persisted synchronously before it becomes visible, so a failed durable
//! write never leaves memory and disk disagreeing.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::PathBuf,
};

use tokio::sync::Mutex;

use crate::{domain::UserId, errors::Error, Result};

/// Panel client API keys all share this shape.
pub const API_KEY_PREFIX: &str = "ptlc_";
pub const API_KEY_LENGTH: usize = 48;

/// Purely syntactic check; never contacts the panel.
pub fn validate_api_key(key: &str) -> bool {
    key.starts_with(API_KEY_PREFIX) && key.len() == API_KEY_LENGTH
}

/// Durable storage for the user → API key mapping.
///
/// Writes are whole-map rewrites; there is no incremental journal.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<HashMap<i64, String>>;
    fn persist(&self, keys: &HashMap<i64, String>) -> Result<()>;
}

/// JSON file backend: `{ "<user id>": "<token>", ... }`.
///
/// Persists via temp file + rename in the same directory so a crash mid-write
/// leaves either the old or the new mapping, never a torn one.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<HashMap<i64, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let raw: HashMap<String, String> = serde_json::from_str(&contents)?;
        // Non-numeric ids are skipped rather than failing startup.
        Ok(raw
            .into_iter()
            .filter_map(|(id, key)| id.parse::<i64>().ok().map(|id| (id, key)))
            .collect())
    }

    fn persist(&self, keys: &HashMap<i64, String>) -> Result<()> {
        let persistence = |e: io::Error| Error::Persistence {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        // BTreeMap for stable output ordering.
        let raw: BTreeMap<String, &String> =
            keys.iter().map(|(id, key)| (id.to_string(), key)).collect();
        let json = serde_json::to_string_pretty(&raw)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(persistence)?;
        fs::rename(&tmp, &self.path).map_err(persistence)?;
        Ok(())
    }
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    saved: std::sync::Mutex<HashMap<i64, String>>,
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<HashMap<i64, String>> {
        Ok(self.saved.lock().expect("backend lock").clone())
    }

    fn persist(&self, keys: &HashMap<i64, String>) -> Result<()> {
        *self.saved.lock().expect("backend lock") = keys.clone();
        Ok(())
    }
}

/// The credential store: an async-safe map with write-through persistence.
///
/// Mutations are atomic per user: the lock is held across the durable write,
/// so no interleaved operation can observe a partial overwrite.
pub struct ApiKeyStore {
    backend: Box<dyn CredentialBackend>,
    keys: Mutex<HashMap<i64, String>>,
}

impl ApiKeyStore {
    pub fn open(backend: Box<dyn CredentialBackend>) -> Result<Self> {
        let keys = backend.load()?;
        Ok(Self {
            backend,
            keys: Mutex::new(keys),
        })
    }

    pub async fn get(&self, user_id: UserId) -> Option<String> {
        self.keys.lock().await.get(&user_id.0).cloned()
    }

    /// Unconditional overwrite. The in-memory update only lands if the
    /// durable write succeeded; otherwise the error is returned and the
    /// previous mapping stays visible.
    pub async fn set(&self, user_id: UserId, api_key: String) -> Result<()> {
        let mut keys = self.keys.lock().await;
        let mut next = keys.clone();
        next.insert(user_id.0, api_key);
        self.backend.persist(&next)?;
        *keys = next;
        Ok(())
    }

    /// Deletes if present; a remove of an unknown user still rewrites the
    /// file, matching the unconditional-rewrite persistence model.
    pub async fn remove(&self, user_id: UserId) -> Result<()> {
        let mut keys = self.keys.lock().await;
        let mut next = keys.clone();
        next.remove(&user_id.0);
        self.backend.persist(&next)?;
        *keys = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    /// Backend whose writes always fail, for the persistence-error contract.
    struct BrokenBackend;

    impl CredentialBackend for BrokenBackend {
        fn load(&self) -> Result<HashMap<i64, String>> {
            Ok(HashMap::new())
        }

        fn persist(&self, _keys: &HashMap<i64, String>) -> Result<()> {
            Err(Error::Persistence {
                path: PathBuf::from("/nowhere"),
                reason: "disk on fire".to_string(),
            })
        }
    }

    fn sample_key() -> String {
        format!("{}{}", API_KEY_PREFIX, "a".repeat(43))
    }

    #[test]
    fn validates_prefix_and_exact_length() {
        assert!(validate_api_key(&sample_key()));
        assert!(!validate_api_key("bad"));
        // Off-by-one on either side of 48.
        assert!(!validate_api_key(&format!("ptlc_{}", "a".repeat(42))));
        assert!(!validate_api_key(&format!("ptlc_{}", "a".repeat(44))));
        // Right length, wrong prefix.
        assert!(!validate_api_key(&"x".repeat(API_KEY_LENGTH)));
    }

    #[tokio::test]
    async fn read_your_write() {
        let store = ApiKeyStore::open(Box::<MemoryBackend>::default()).unwrap();
        store.set(UserId(7), sample_key()).await.unwrap();
        assert_eq!(store.get(UserId(7)).await, Some(sample_key()));
    }

    #[tokio::test]
    async fn get_of_unknown_user_is_none() {
        let store = ApiKeyStore::open(Box::<MemoryBackend>::default()).unwrap();
        assert_eq!(store.get(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = ApiKeyStore::open(Box::<MemoryBackend>::default()).unwrap();
        store.set(UserId(7), sample_key()).await.unwrap();
        store.remove(UserId(7)).await.unwrap();
        assert_eq!(store.get(UserId(7)).await, None);

        // Removing a user that was never set is a no-op, not an error.
        store.remove(UserId(42)).await.unwrap();
        assert_eq!(store.get(UserId(42)).await, None);
    }

    #[tokio::test]
    async fn failed_persist_leaves_memory_unchanged() {
        let store = ApiKeyStore::open(Box::new(BrokenBackend)).unwrap();
        let err = store.set(UserId(7), sample_key()).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(store.get(UserId(7)).await, None);
    }

    #[tokio::test]
    async fn file_backend_round_trips() {
        let path = tmp_file("pterobot-keys");
        {
            let store = ApiKeyStore::open(Box::new(FileBackend::new(&path))).unwrap();
            store.set(UserId(7), sample_key()).await.unwrap();
            store.set(UserId(8), sample_key()).await.unwrap();
            store.remove(UserId(8)).await.unwrap();
        }

        // Fresh store over the same file sees the surviving entry only.
        let store = ApiKeyStore::open(Box::new(FileBackend::new(&path))).unwrap();
        assert_eq!(store.get(UserId(7)).await, Some(sample_key()));
        assert_eq!(store.get(UserId(8)).await, None);

        // On-disk format: string user ids → tokens.
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get("7"), Some(&sample_key()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_loads_empty() {
        let backend = FileBackend::new(tmp_file("pterobot-missing"));
        assert!(backend.load().unwrap().is_empty());
    }
}
