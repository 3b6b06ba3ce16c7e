use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::SessionStore;
use crate::models::ConversationState;
use crate::utils::error::DialogueResult;

/// Result of reading a session. Everything except `Found` means the turn
/// starts from an empty state.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Found(ConversationState),
    Missing,
    Malformed(String),
    Unavailable(String),
}

impl LoadOutcome {
    pub fn into_state(self) -> ConversationState {
        match self {
            Self::Found(state) => state,
            _ => ConversationState::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::Missing => "missing",
            Self::Malformed(_) => "malformed",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Typed access to conversation state over a [`SessionStore`].
#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn SessionStore>,
    key_prefix: String,
    ttl: Duration,
}

impl StateRepository {
    pub fn new(store: Arc<dyn SessionStore>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    pub fn storage_key(&self, session_key: &str) -> String {
        format!("{}{}", self.key_prefix, session_key)
    }

    pub async fn load(&self, session_key: &str) -> LoadOutcome {
        let key = self.storage_key(session_key);

        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No state for {}", key);
                return LoadOutcome::Missing;
            }
            Err(e) => {
                warn!("Session store unavailable for {}: {}", key, e);
                return LoadOutcome::Unavailable(e.to_string());
            }
        };

        match serde_json::from_slice::<ConversationState>(&bytes) {
            Ok(state) => LoadOutcome::Found(state),
            Err(e) => {
                warn!("Discarding malformed state for {}: {}", key, e);
                LoadOutcome::Malformed(e.to_string())
            }
        }
    }

    pub async fn save(&self, session_key: &str, state: &ConversationState) -> DialogueResult<()> {
        let key = self.storage_key(session_key);
        let payload = serde_json::to_vec(state)?;
        self.store.set_ex(&key, self.ttl, Bytes::from(payload)).await
    }

    pub async fn clear(&self, session_key: &str) -> DialogueResult<()> {
        self.store.delete(&self.storage_key(session_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActiveTopic, EntityRole};
    use crate::services::store::{MemorySessionStore, MockSessionStore};
    use crate::utils::error::DialogueError;

    fn repo_with(store: Arc<dyn SessionStore>) -> StateRepository {
        StateRepository::new(store, "test:", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = repo_with(Arc::new(MemorySessionStore::new()));
        let mut state = ConversationState::new();
        state.active_topic = ActiveTopic::new(EntityRole::Student, "Jack Garcia", "spend");

        repo.save("s1", &state).await.unwrap();
        assert_eq!(repo.load("s1").await, LoadOutcome::Found(state));
        assert_eq!(repo.load("s2").await, LoadOutcome::Missing);

        repo.clear("s1").await.unwrap();
        assert_eq!(repo.load("s1").await, LoadOutcome::Missing);
    }

    #[tokio::test]
    async fn test_malformed_bytes_are_no_state() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set_ex("test:s1", Duration::from_secs(60), Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        let repo = repo_with(store);

        let outcome = repo.load("s1").await;
        assert_eq!(outcome.label(), "malformed");
        assert_eq!(outcome.into_state(), ConversationState::new());
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let mut mock = MockSessionStore::new();
        mock.expect_get()
            .returning(|_| Err(DialogueError::Store("connection refused".into())));
        let repo = repo_with(Arc::new(mock));

        let outcome = repo.load("s1").await;
        assert!(matches!(outcome, LoadOutcome::Unavailable(ref m) if m.contains("refused")));
    }

    #[tokio::test]
    async fn test_key_prefix_is_applied() {
        let mut mock = MockSessionStore::new();
        mock.expect_set_ex()
            .withf(|key, ttl, _| key == "test:abc" && *ttl == Duration::from_secs(60))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let repo = repo_with(Arc::new(mock));

        repo.save("abc", &ConversationState::new()).await.unwrap();
    }
}
