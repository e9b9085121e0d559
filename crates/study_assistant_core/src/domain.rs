//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the core data structures for the application: users, the documents
//! embedded in them and the query history embedded in each document.
//!
//! These types derive `serde` so that the enclosing service can hand them to
//! callers as JSON, but they carry no knowledge of the store's wire format.

use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A free-form JSON object of top-level fields.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

//=========================================================================================
// Identifiers
//=========================================================================================

/// The global integer identifier of a document.
///
/// Ids come from a single counter shared by every user, so two documents never
/// share an id even when they belong to different users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl DocumentId {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| PortError::InvalidInput("Document ID must be an integer".to_string()))
    }
}

/// Anything a caller may pass where a document id is expected.
///
/// Typed ids and integers always convert; text coming straight from a request
/// path is parsed and rejected with `InvalidInput` when it is not an integer.
pub trait IntoDocumentId {
    fn into_document_id(self) -> PortResult<DocumentId>;
}

impl IntoDocumentId for DocumentId {
    fn into_document_id(self) -> PortResult<DocumentId> {
        Ok(self)
    }
}

impl IntoDocumentId for i64 {
    fn into_document_id(self) -> PortResult<DocumentId> {
        Ok(DocumentId(self))
    }
}

impl IntoDocumentId for &str {
    fn into_document_id(self) -> PortResult<DocumentId> {
        self.parse()
    }
}

impl IntoDocumentId for String {
    fn into_document_id(self) -> PortResult<DocumentId> {
        self.parse()
    }
}

//=========================================================================================
// Entities
//=========================================================================================

/// A user record together with every document they uploaded.
///
/// `id` is the caller's business identifier, not the store's internal key.
/// Any further top-level fields supplied at creation (name, password hash, ...)
/// are kept in `profile` and stored alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(flatten)]
    pub profile: FieldMap,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            documents: Vec::new(),
            profile: FieldMap::new(),
        }
    }
}

/// A document embedded in a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub subject: String,
    #[serde(default)]
    pub summary: String,
    pub uploaded_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub queries: Vec<Query>,
    /// Any further fields the caller stored on the document.
    #[serde(flatten)]
    pub extra: FieldMap,
}

impl Document {
    pub fn new(
        id: DocumentId,
        title: impl Into<String>,
        content: impl Into<String>,
        subject: impl Into<String>,
        uploaded_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            subject: subject.into(),
            summary: String::new(),
            uploaded_date,
            last_viewed: None,
            queries: Vec::new(),
            extra: FieldMap::new(),
        }
    }
}

/// A record in a document's query history.
///
/// The record is opaque: whatever fields the caller appended are kept as they
/// are. Queries are only ever appended; their order is the document's history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(pub FieldMap);

impl Query {
    /// Builds the question/answer record the client appends after asking.
    pub fn new(question: impl Into<String>, answer: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut fields = FieldMap::new();
        fields.insert("question".to_string(), question.into().into());
        fields.insert("answer".to_string(), answer.into().into());
        fields.insert("timestamp".to_string(), timestamp.to_rfc3339().into());
        Self(fields)
    }

    pub fn from_fields(fields: FieldMap) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn question(&self) -> Option<&str> {
        self.get("question").and_then(|v| v.as_str())
    }

    pub fn answer(&self) -> Option<&str> {
        self.get("answer").and_then(|v| v.as_str())
    }
}

//=========================================================================================
// Response Shapes
//=========================================================================================

/// The fixed shape returned when a single document is fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub subject: String,
    pub summary: String,
    pub queries: Vec<Query>,
    pub uploaded_date: DateTime<Utc>,
    pub last_viewed: DateTime<Tz>,
}

impl DocumentView {
    /// Shapes a stored document. `last_viewed` is supplied by the caller and
    /// replaces whatever the document had stored.
    pub fn from_document(document: Document, last_viewed: DateTime<Tz>) -> Self {
        Self {
            id: document.id,
            title: document.title,
            content: document.content,
            subject: document.subject,
            summary: document.summary,
            queries: document.queries,
            uploaded_date: document.uploaded_date,
            last_viewed,
        }
    }
}

//=========================================================================================
// Store Acknowledgments
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertAck {
    /// The store-assigned key of the inserted record, rendered as text.
    pub inserted_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpdateAck {
    pub matched_count: u64,
    pub modified_count: u64,
}

impl UpdateAck {
    pub fn is_noop(&self) -> bool {
        self.modified_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeleteAck {
    pub deleted_count: u64,
}
