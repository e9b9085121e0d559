//! services/store/src/repository.rs
//!
//! The `Repository` is the façade the enclosing service calls. Each operation
//! is a single round-trip to the `UserStore` port; the only logic added here is
//! document-id validation, the not-found check on document deletion, and
//! shaping of the single-document response.

use crate::config::{Config, DEFAULT_TIMEZONE};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use study_assistant_core::domain::{
    DeleteAck, Document, DocumentId, DocumentView, FieldMap, InsertAck, IntoDocumentId, Query,
    UpdateAck, User,
};
use study_assistant_core::ports::{Clock, PortError, PortResult, SystemClock, UserStore};
use tracing::debug;

/// Key of the counter record that issues document ids.
pub const DOCUMENT_ID_COUNTER: &str = "document_id";

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl Repository {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            timezone: DEFAULT_TIMEZONE,
        }
    }

    pub fn from_config(store: Arc<dyn UserStore>, config: &Config) -> Self {
        Self::new(store).with_timezone(config.timezone)
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.timezone)
    }

    // --- Users ---

    pub async fn get_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        debug!(email, "get_user_by_email");
        self.store.find_user_by_email(email).await
    }

    /// Inserts a new user. Store rejections such as a duplicate email are
    /// returned unchanged.
    pub async fn create_user(&self, user: &User) -> PortResult<InsertAck> {
        debug!(user_id = %user.id, "create_user");
        self.store.insert_user(user).await
    }

    /// Merges `patch` into the top-level fields of the user. Nested arrays are
    /// replaced, not merged. Zero matches is not an error.
    pub async fn update_user(&self, user_id: &str, patch: &FieldMap) -> PortResult<UpdateAck> {
        debug!(user_id, fields = ?patch.keys().collect::<Vec<_>>(), "update_user");
        self.store.set_user_fields(user_id, patch).await
    }

    pub async fn delete_user(&self, user_id: &str) -> PortResult<DeleteAck> {
        debug!(user_id, "delete_user");
        self.store.delete_user(user_id).await
    }

    // --- Documents ---

    pub async fn add_document_to_user(
        &self,
        user_id: &str,
        document: &Document,
    ) -> PortResult<UpdateAck> {
        debug!(user_id, document_id = %document.id, "add_document_to_user");
        self.store.push_document(user_id, document).await
    }

    /// Returns every document of the user, or an empty list when the user
    /// does not exist. `_subject` is accepted for callers but no filtering is
    /// applied.
    pub async fn get_user_documents(&self, user_id: &str, _subject: &str) -> PortResult<Vec<Document>> {
        debug!(user_id, "get_user_documents");
        Ok(self
            .store
            .find_user_documents(user_id)
            .await?
            .unwrap_or_default())
    }

    /// Replaces the whole matched document with `document`.
    pub async fn update_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
        document: &Document,
    ) -> PortResult<UpdateAck> {
        debug!(user_id, %document_id, "update_document");
        self.store
            .replace_document(user_id, document_id, document)
            .await
    }

    pub async fn update_document_last_viewed(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> PortResult<UpdateAck> {
        let now = self.now();
        debug!(user_id, %document_id, at = %now.to_rfc3339(), "update_document_last_viewed");
        self.store
            .set_document_last_viewed(user_id, document_id, now.with_timezone(&Utc))
            .await
    }

    pub async fn add_query_to_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
        query: &Query,
    ) -> PortResult<UpdateAck> {
        debug!(user_id, %document_id, "add_query_to_document");
        self.store.push_query(user_id, document_id, query).await
    }

    /// Issues the next global document id. Concurrent callers never receive
    /// the same value; the first call creates the counter and returns 1.
    pub async fn get_next_document_id(&self) -> PortResult<DocumentId> {
        let seq = self.store.next_sequence(DOCUMENT_ID_COUNTER).await?;
        debug!(issued = seq, "get_next_document_id");
        Ok(DocumentId(seq))
    }

    /// Fetches one document in its response shape.
    ///
    /// `document_id` is validated before the store is touched; text that is not
    /// an integer fails with `InvalidInput`. The returned `lastViewed` is
    /// always the current time in the configured timezone, not the stored value.
    pub async fn get_document<I>(&self, user_id: &str, document_id: I) -> PortResult<Option<DocumentView>>
    where
        I: IntoDocumentId,
    {
        let document_id = document_id.into_document_id()?;
        debug!(user_id, %document_id, "get_document");

        let document = self.store.find_document(user_id, document_id).await?;
        Ok(document.map(|doc| DocumentView::from_document(doc, self.now())))
    }

    /// Removes the document from the user's list, failing with `NotFound` when
    /// nothing was removed.
    pub async fn delete_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> PortResult<UpdateAck> {
        debug!(user_id, %document_id, "delete_document");
        let ack = self.store.pull_document(user_id, document_id).await?;
        if ack.is_noop() {
            return Err(PortError::NotFound("Document not found".to_string()));
        }
        Ok(ack)
    }
}
