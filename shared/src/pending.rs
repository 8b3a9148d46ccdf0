/// Pending download selections keyed by one-time tokens.
///
/// Each staged format choice is bound to an opaque uuid token. Tokens are
/// consumed atomically: lookup and removal are a single step under the
/// store mutex, so a token can never be redeemed twice. There is no expiry
/// timer; entries live until consumed or the process restarts.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A staged (url, format, audio-flag) choice awaiting a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    pub url: String,
    pub format_id: String,
    pub is_audio: bool,
}

#[derive(Clone, Default)]
pub struct PendingStore {
    inner: Arc<Mutex<HashMap<String, PendingSelection>>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a selection and return its freshly minted token.
    pub async fn stage(&self, selection: PendingSelection) -> String {
        let token = Uuid::new_v4().to_string();
        debug!("Staging selection {} for {}", token, selection.url);
        self.inner.lock().await.insert(token.clone(), selection);
        token
    }

    /// Take (remove and return) a staged selection. A second take of the
    /// same token yields None.
    pub async fn take(&self, token: &str) -> Option<PendingSelection> {
        self.inner.lock().await.remove(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> PendingSelection {
        PendingSelection {
            url: "https://example.com/v".into(),
            format_id: "22".into(),
            is_audio: false,
        }
    }

    #[tokio::test]
    async fn token_pops_exactly_once() {
        let store = PendingStore::new();
        let token = store.stage(selection()).await;
        assert_eq!(store.take(&token).await, Some(selection()));
        assert_eq!(store.take(&token).await, None);
    }

    #[tokio::test]
    async fn unknown_token_is_none() {
        let store = PendingStore::new();
        assert_eq!(store.take("no-such-token").await, None);
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let store = PendingStore::new();
        let a = store.stage(selection()).await;
        let b = store.stage(selection()).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn concurrent_pops_yield_one_winner() {
        let store = PendingStore::new();
        let token = store.stage(selection()).await;

        let s1 = store.clone();
        let s2 = store.clone();
        let t1 = token.clone();
        let t2 = token.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { s1.take(&t1).await }),
            tokio::spawn(async move { s2.take(&t2).await }),
        );
        let wins = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(wins, 1);
    }
}
