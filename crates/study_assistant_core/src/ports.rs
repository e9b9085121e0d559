//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the concrete store driver.

use crate::domain::{
    DeleteAck, Document, DocumentId, FieldMap, InsertAck, Query, UpdateAck, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Malformed input detected before the store was touched.
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    /// The store call itself failed. The driver error is kept as-is and is
    /// reachable through `source()`.
    #[error("Store failure: {0}")]
    Store(#[source] BoxError),
}

impl PortError {
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PortError::Store(Box::new(err))
    }

    /// The HTTP-style status code callers should surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            PortError::InvalidInput(_) => 400,
            PortError::NotFound(_) => 404,
            PortError::Store(_) => 500,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Single round-trip operations over the `users` and `counters` collections.
///
/// Every method maps to exactly one store call. Updates that match nothing are
/// not errors: they come back as an acknowledgment with zero counts. No
/// referential integrity is enforced here; a document can be pushed under a
/// user id that does not exist and the call simply modifies nothing.
#[async_trait]
pub trait UserStore: Send + Sync {
    // --- Users ---
    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    async fn insert_user(&self, user: &User) -> PortResult<InsertAck>;

    /// Overwrites the given top-level fields of the first user matching `user_id`.
    async fn set_user_fields(&self, user_id: &str, fields: &FieldMap) -> PortResult<UpdateAck>;

    async fn delete_user(&self, user_id: &str) -> PortResult<DeleteAck>;

    // --- Documents ---
    async fn push_document(&self, user_id: &str, document: &Document) -> PortResult<UpdateAck>;

    /// Returns `None` when the user does not exist.
    async fn find_user_documents(&self, user_id: &str) -> PortResult<Option<Vec<Document>>>;

    async fn replace_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
        document: &Document,
    ) -> PortResult<UpdateAck>;

    async fn set_document_last_viewed(
        &self,
        user_id: &str,
        document_id: DocumentId,
        at: DateTime<Utc>,
    ) -> PortResult<UpdateAck>;

    async fn push_query(
        &self,
        user_id: &str,
        document_id: DocumentId,
        query: &Query,
    ) -> PortResult<UpdateAck>;

    /// Looks up exactly one embedded document without loading its siblings.
    async fn find_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> PortResult<Option<Document>>;

    async fn pull_document(&self, user_id: &str, document_id: DocumentId) -> PortResult<UpdateAck>;

    // --- Counters ---
    /// Atomically increments the named counter and returns the new value,
    /// creating the counter on first use.
    async fn next_sequence(&self, key: &str) -> PortResult<i64>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
