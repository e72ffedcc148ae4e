//! Session registry - many independent sessions keyed by id

use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::Session;
use crate::compaction::SummaryParser;
use crate::config::EngineConfig;
use crate::llm::CompletionModel;
use crate::types::SessionId;
use crate::{CondenseError, Result};

/// Creates and tracks sessions sharing one model and configuration.
///
/// The map lock is only held for lookups; every session keeps its own async
/// lock, so work on different sessions proceeds in parallel.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    config: EngineConfig,
    model: Arc<dyn CompletionModel>,
    parser: Option<Arc<dyn SummaryParser>>,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig, model: Arc<dyn CompletionModel>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            model,
            parser: None,
        }
    }

    /// Parser handed to every new session
    pub fn with_parser(mut self, parser: Arc<dyn SummaryParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Create a session with a fresh id
    pub fn create_session(&self) -> Arc<Session> {
        self.insert(SessionId::new())
    }

    /// Return the session named `id`, creating it if needed
    pub fn get_or_create(&self, id: &SessionId) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            return session;
        }
        self.insert(id.clone())
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session. Callers still holding it keep a working handle.
    pub fn remove(&self, id: &SessionId) -> Result<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| CondenseError::SessionNotFound(id.to_string()))?;
        info!(session = %id, "Session removed");
        Ok(removed)
    }

    /// Reset every registered session. Sessions are reset concurrently, each
    /// under its own lock.
    pub async fn reset_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        join_all(sessions.iter().map(|s| s.reset())).await;
        sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn insert(&self, id: SessionId) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        // A concurrent caller may have created it between our read and write.
        if let Some(existing) = sessions.get(&id) {
            return Arc::clone(existing);
        }

        let mut session =
            Session::new(self.config.clone(), Arc::clone(&self.model)).with_id(id.clone());
        if let Some(parser) = &self.parser {
            session = session.with_parser(Arc::clone(parser));
        }
        let session = Arc::new(session);
        sessions.insert(id, Arc::clone(&session));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ExtractiveModel;
    use crate::session::MessageOverrides;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(EngineConfig::default(), Arc::new(ExtractiveModel::new()))
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = registry();
        let session = registry.create_session();
        let id = session.id().clone();

        assert!(registry.get(&id).is_some());
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.session_ids(), vec![id.clone()]);

        registry.remove(&id).unwrap();
        assert_eq!(registry.session_count(), 0);
        assert!(matches!(
            registry.remove(&id),
            Err(CondenseError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_or_create_reuses() {
        let registry = registry();
        let id = SessionId::named("support");
        let first = registry.get_or_create(&id);
        let second = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = registry();
        let a = registry.create_session();
        let b = registry.create_session();

        let overrides = MessageOverrides::default();
        let (ra, rb) = tokio::join!(
            a.handle_message("Message for a.", &overrides),
            b.handle_message("Message for b.", &overrides)
        );
        ra.unwrap();
        rb.unwrap();

        b.reset().await;
        assert_eq!(a.get_state().await.turns.len(), 2);
        assert!(b.get_state().await.turns.is_empty());

        assert_eq!(registry.reset_all().await, 2);
        assert!(a.get_state().await.turns.is_empty());
    }
}
