//! services/store/src/adapters/memory.rs
//!
//! An in-process implementation of the `UserStore` port. It follows the same
//! matching rules as the MongoDB adapter (first matching user, first matching
//! embedded document for positional updates, unique emails) so repository
//! behaviour can be exercised without a running server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use study_assistant_core::domain::{
    DeleteAck, Document, DocumentId, FieldMap, InsertAck, Query, UpdateAck, User,
};
use study_assistant_core::ports::{PortError, PortResult, UserStore};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("duplicate key: a user with email `{0}` already exists")]
    DuplicateEmail(String),
}

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    counters: HashMap<String, i64>,
    next_key: u64,
}

impl MemoryState {
    fn user_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == user_id)
    }

    fn document_mut(&mut self, user_id: &str, document_id: DocumentId) -> Option<&mut Document> {
        self.users
            .iter_mut()
            .find(|u| u.id == user_id && u.documents.iter().any(|d| d.id == document_id))
            .and_then(|u| u.documents.iter_mut().find(|d| d.id == document_id))
    }

    fn email_taken(&self, email: &str, except_user: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| u.email == email && Some(u.id.as_str()) != except_user)
    }
}

/// Acknowledgment for an update that matched one element and may have changed it.
fn matched(changed: bool) -> UpdateAck {
    UpdateAck {
        matched_count: 1,
        modified_count: u64::from(changed),
    }
}

#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user records currently held.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub async fn counter(&self, key: &str) -> Option<i64> {
        self.state.lock().await.counters.get(key).copied()
    }
}

#[async_trait]
impl UserStore for MemoryAdapter {
    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> PortResult<InsertAck> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, None) {
            return Err(PortError::store(MemoryStoreError::DuplicateEmail(
                user.email.clone(),
            )));
        }
        state.next_key += 1;
        let inserted_id = format!("{:024x}", state.next_key);
        state.users.push(user.clone());
        Ok(InsertAck { inserted_id })
    }

    async fn set_user_fields(&self, user_id: &str, fields: &FieldMap) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|u| u.id == user_id) {
            return Ok(UpdateAck::default());
        }
        if let Some(email) = fields.get("email").and_then(|v| v.as_str()) {
            if state.email_taken(email, Some(user_id)) {
                return Err(PortError::store(MemoryStoreError::DuplicateEmail(
                    email.to_string(),
                )));
            }
        }
        let Some(user) = state.user_mut(user_id) else {
            return Ok(UpdateAck::default());
        };

        let mut raw = match serde_json::to_value(&*user).map_err(PortError::store)? {
            serde_json::Value::Object(map) => map,
            _ => FieldMap::new(),
        };
        for (key, value) in fields {
            raw.insert(key.clone(), value.clone());
        }
        let updated: User =
            serde_json::from_value(serde_json::Value::Object(raw)).map_err(PortError::store)?;

        let changed = *user != updated;
        *user = updated;
        Ok(matched(changed))
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<DeleteAck> {
        let mut state = self.state.lock().await;
        let deleted_count = match state.users.iter().position(|u| u.id == user_id) {
            Some(index) => {
                state.users.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteAck { deleted_count })
    }

    async fn push_document(&self, user_id: &str, document: &Document) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        Ok(match state.user_mut(user_id) {
            Some(user) => {
                user.documents.push(document.clone());
                matched(true)
            }
            None => UpdateAck::default(),
        })
    }

    async fn find_user_documents(&self, user_id: &str) -> PortResult<Option<Vec<Document>>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.documents.clone()))
    }

    async fn replace_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
        document: &Document,
    ) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        Ok(match state.document_mut(user_id, document_id) {
            Some(existing) => {
                let changed = existing != document;
                *existing = document.clone();
                matched(changed)
            }
            None => UpdateAck::default(),
        })
    }

    async fn set_document_last_viewed(
        &self,
        user_id: &str,
        document_id: DocumentId,
        at: DateTime<Utc>,
    ) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        Ok(match state.document_mut(user_id, document_id) {
            Some(existing) => {
                let changed = existing.last_viewed != Some(at);
                existing.last_viewed = Some(at);
                matched(changed)
            }
            None => UpdateAck::default(),
        })
    }

    async fn push_query(
        &self,
        user_id: &str,
        document_id: DocumentId,
        query: &Query,
    ) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        Ok(match state.document_mut(user_id, document_id) {
            Some(existing) => {
                existing.queries.push(query.clone());
                matched(true)
            }
            None => UpdateAck::default(),
        })
    }

    async fn find_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> PortResult<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| u.id == user_id)
            .flat_map(|u| u.documents.iter())
            .find(|d| d.id == document_id)
            .cloned())
    }

    async fn pull_document(&self, user_id: &str, document_id: DocumentId) -> PortResult<UpdateAck> {
        let mut state = self.state.lock().await;
        Ok(match state.user_mut(user_id) {
            Some(user) => {
                let before = user.documents.len();
                user.documents.retain(|d| d.id != document_id);
                matched(user.documents.len() != before)
            }
            None => UpdateAck::default(),
        })
    }

    async fn next_sequence(&self, key: &str) -> PortResult<i64> {
        let mut state = self.state.lock().await;
        let seq = state.counters.entry(key.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}
