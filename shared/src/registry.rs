/// Flat-file user registry.
///
/// An append-only set of user ids persisted as a single JSON array with no
/// schema versioning. The file is rewritten in full on every new user, so
/// all mutations serialize through the store mutex.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::SnagResult;

#[derive(Clone)]
pub struct UserRegistry {
    path: PathBuf,
    users: Arc<Mutex<Vec<u64>>>,
}

impl UserRegistry {
    /// Load the registry from disk. A missing file yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> SnagResult<Self> {
        let path = path.as_ref().to_path_buf();
        let users: Vec<u64> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };
        info!("Loaded {} registered users from {}", users.len(), path.display());
        Ok(Self {
            path,
            users: Arc::new(Mutex::new(users)),
        })
    }

    /// Whether the user id is already registered.
    pub async fn contains(&self, uid: u64) -> bool {
        self.users.lock().await.contains(&uid)
    }

    /// Record a user id, persisting the full list. Returns true if the id
    /// was new. The write happens under the lock so concurrent registrations
    /// cannot interleave a load-modify-save.
    pub async fn add(&self, uid: u64) -> SnagResult<bool> {
        let mut users = self.users.lock().await;
        if users.contains(&uid) {
            return Ok(false);
        }
        users.push(uid);
        let raw = serde_json::to_string(&*users)?;
        std::fs::write(&self.path, raw)?;
        debug!("Registered user {}", uid);
        Ok(true)
    }

    /// Snapshot of every registered user id, for broadcast.
    pub async fn all(&self) -> Vec<u64> {
        self.users.lock().await.clone()
    }
}
