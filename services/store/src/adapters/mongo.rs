//! services/store/src/adapters/mongo.rs
//!
//! This module contains the MongoDB adapter, the concrete implementation of the
//! `UserStore` port from the `core` crate. Users live in the `users`
//! collection with their documents (and each document's queries) embedded as
//! arrays; document ids come from the `counters` collection.

use crate::config::Config;
use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use chrono::{DateTime, Utc};
use mongodb::{
    options::{IndexOptions, ReturnDocument},
    results::UpdateResult,
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use study_assistant_core::domain::{
    DeleteAck, Document, DocumentId, FieldMap, InsertAck, Query, UpdateAck, User,
};
use study_assistant_core::ports::{PortError, PortResult, UserStore};
use tracing::info;

const USERS: &str = "users";
const COUNTERS: &str = "counters";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A MongoDB adapter that implements the `UserStore` port.
#[derive(Clone, Debug)]
pub struct MongoAdapter {
    db: Database,
}

impl MongoAdapter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens a client for `config.database_url` and selects `config.database_name`.
    ///
    /// The driver connects lazily, so this succeeds even when the server is
    /// unreachable; use [`MongoAdapter::ping`] to check reachability.
    pub async fn connect(config: &Config) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(&config.database_url).await?;
        Ok(Self::new(client.database(&config.database_name)))
    }

    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Creates the indexes the data model relies on: `email` is unique, `id`
    /// is the lookup key for every per-user operation.
    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        let email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let id = IndexModel::builder().keys(doc! { "id": 1 }).build();

        let created = self.users().create_indexes([email, id]).await?;
        info!("Ensured indexes on `{}`: {:?}", USERS, created.index_names);
        Ok(())
    }

    /// Reads the document-id counter without incrementing it.
    pub async fn current_sequence(&self, key: &str) -> Result<Option<i64>, mongodb::error::Error> {
        let counter = self.counters().find_one(doc! { "_id": key }).await?;
        Ok(counter.map(|c| c.seq))
    }

    fn users(&self) -> Collection<BsonDocument> {
        self.db.collection(USERS)
    }

    fn user_documents(&self) -> Collection<DocumentsProjection> {
        self.db.collection(USERS)
    }

    fn counters(&self) -> Collection<CounterRecord> {
        self.db.collection(COUNTERS)
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// The fields every stored document carries. The query history and any
/// further caller fields are carried next to it as raw BSON.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    id: i64,
    title: String,
    content: String,
    subject: String,
    #[serde(default)]
    summary: String,
    uploaded_date: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_viewed: Option<bson::DateTime>,
}

impl DocumentRecord {
    const FIELDS: [&'static str; 8] = [
        "id",
        "title",
        "content",
        "subject",
        "summary",
        "uploadedDate",
        "lastViewed",
        "queries",
    ];

    fn from_domain(document: &Document) -> Self {
        Self {
            id: document.id.value(),
            title: document.title.clone(),
            content: document.content.clone(),
            subject: document.subject.clone(),
            summary: document.summary.clone(),
            uploaded_date: bson::DateTime::from_chrono(document.uploaded_date),
            last_viewed: document.last_viewed.map(bson::DateTime::from_chrono),
        }
    }

    fn into_domain(self, queries: Vec<Query>, extra: FieldMap) -> Document {
        Document {
            id: DocumentId(self.id),
            title: self.title,
            content: self.content,
            subject: self.subject,
            summary: self.summary,
            uploaded_date: self.uploaded_date.to_chrono(),
            last_viewed: self.last_viewed.map(|d| d.to_chrono()),
            queries,
            extra,
        }
    }
}

/// A user with everything except its embedded documents projected away.
#[derive(Debug, Deserialize)]
struct DocumentsProjection {
    #[serde(default)]
    documents: Vec<BsonDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CounterRecord {
    #[serde(rename = "_id")]
    key: String,
    seq: i64,
}

#[derive(Debug, thiserror::Error)]
#[error("counter `{0}` was not returned by the upsert")]
struct CounterMissing(String);

#[derive(Debug, thiserror::Error)]
#[error("expected an embedded document, found {0}")]
struct NotADocument(String);

/// Converts caller-supplied JSON fields to BSON. Extended JSON such as
/// `{"$date": ...}` becomes the matching BSON type again.
fn json_to_bson(fields: &FieldMap) -> PortResult<BsonDocument> {
    match Bson::try_from(serde_json::Value::Object(fields.clone())).map_err(PortError::store)? {
        Bson::Document(raw) => Ok(raw),
        other => Err(PortError::store(NotADocument(other.to_string()))),
    }
}

fn bson_to_json(raw: BsonDocument) -> FieldMap {
    match Bson::Document(raw).into_relaxed_extjson() {
        serde_json::Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

fn query_to_bson(query: &Query) -> PortResult<Bson> {
    json_to_bson(query.fields()).map(Bson::Document)
}

/// Builds the stored form of a document: caller fields first, the known
/// fields and the query history laid over them.
fn document_to_bson(document: &Document) -> PortResult<BsonDocument> {
    let mut raw = json_to_bson(&document.extra)?;
    let record = bson::to_document(&DocumentRecord::from_domain(document)).map_err(PortError::store)?;
    for (key, value) in record {
        raw.insert(key, value);
    }
    let queries = document
        .queries
        .iter()
        .map(query_to_bson)
        .collect::<PortResult<Vec<_>>>()?;
    raw.insert("queries", queries);
    Ok(raw)
}

/// The inverse of [`document_to_bson`]. Query entries are kept whole; entries
/// that are not embedded documents are skipped.
fn document_from_bson(mut raw: BsonDocument) -> PortResult<Document> {
    let queries = match raw.remove("queries") {
        Some(Bson::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Bson::Document(fields) => Some(Query::from_fields(bson_to_json(fields))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let record: DocumentRecord = bson::from_document(raw.clone()).map_err(PortError::store)?;
    for key in DocumentRecord::FIELDS {
        raw.remove(key);
    }
    Ok(record.into_domain(queries, bson_to_json(raw)))
}

/// Builds the stored form of a user: the profile fields with `id`, `email` and
/// `documents` laid over them.
fn user_to_bson(user: &User) -> PortResult<BsonDocument> {
    let mut raw = json_to_bson(&user.profile)?;
    let documents = user
        .documents
        .iter()
        .map(|d| document_to_bson(d).map(Bson::Document))
        .collect::<PortResult<Vec<_>>>()?;

    raw.insert("id", user.id.as_str());
    raw.insert("email", user.email.as_str());
    raw.insert("documents", documents);
    Ok(raw)
}

/// The inverse of [`user_to_bson`]. The store's own `_id` is dropped; every
/// other unknown field ends up in the profile.
fn user_from_bson(mut raw: BsonDocument) -> PortResult<User> {
    raw.remove("_id");
    let id = raw.get_str("id").map_err(PortError::store)?.to_string();
    let email = raw.get_str("email").map_err(PortError::store)?.to_string();
    raw.remove("id");
    raw.remove("email");

    let documents = match raw.remove("documents") {
        Some(array) => bson::from_bson::<Vec<BsonDocument>>(array)
            .map_err(PortError::store)?
            .into_iter()
            .map(document_from_bson)
            .collect::<PortResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(User {
        id,
        email,
        documents,
        profile: bson_to_json(raw),
    })
}

fn update_ack(result: UpdateResult) -> UpdateAck {
    UpdateAck {
        matched_count: result.matched_count,
        modified_count: result.modified_count,
    }
}

//=========================================================================================
// Filters and Update Documents
//=========================================================================================

fn user_filter(user_id: &str) -> BsonDocument {
    doc! { "id": user_id }
}

/// Matches the user only when it holds the document, so `$` in the update
/// refers to that document's position.
fn document_filter(user_id: &str, document_id: DocumentId) -> BsonDocument {
    doc! { "id": user_id, "documents.id": document_id.value() }
}

fn push_document_update(record: BsonDocument) -> BsonDocument {
    doc! { "$push": { "documents": record } }
}

fn replace_document_update(record: BsonDocument) -> BsonDocument {
    doc! { "$set": { "documents.$": record } }
}

fn last_viewed_update(at: DateTime<Utc>) -> BsonDocument {
    doc! { "$set": { "documents.$.lastViewed": bson::DateTime::from_chrono(at) } }
}

fn push_query_update(record: Bson) -> BsonDocument {
    doc! { "$push": { "documents.$.queries": record } }
}

fn pull_document_update(document_id: DocumentId) -> BsonDocument {
    doc! { "$pull": { "documents": { "id": document_id.value() } } }
}

/// Keeps only the first matching element of `documents`.
fn single_document_projection() -> BsonDocument {
    doc! { "documents.$": 1 }
}

fn counter_increment() -> BsonDocument {
    doc! { "$inc": { "seq": 1_i64 } }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for MongoAdapter {
    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        self.users()
            .find_one(doc! { "email": email })
            .await
            .map_err(PortError::store)?
            .map(user_from_bson)
            .transpose()
    }

    async fn insert_user(&self, user: &User) -> PortResult<InsertAck> {
        let result = self
            .users()
            .insert_one(user_to_bson(user)?)
            .await
            .map_err(PortError::store)?;

        let inserted_id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        Ok(InsertAck { inserted_id })
    }

    async fn set_user_fields(&self, user_id: &str, fields: &FieldMap) -> PortResult<UpdateAck> {
        let set = json_to_bson(fields)?;
        let result = self
            .users()
            .update_one(user_filter(user_id), doc! { "$set": set })
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<DeleteAck> {
        let result = self
            .users()
            .delete_one(user_filter(user_id))
            .await
            .map_err(PortError::store)?;
        Ok(DeleteAck {
            deleted_count: result.deleted_count,
        })
    }

    async fn push_document(&self, user_id: &str, document: &Document) -> PortResult<UpdateAck> {
        let record = document_to_bson(document)?;
        let result = self
            .users()
            .update_one(user_filter(user_id), push_document_update(record))
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn find_user_documents(&self, user_id: &str) -> PortResult<Option<Vec<Document>>> {
        let projected = self
            .user_documents()
            .find_one(user_filter(user_id))
            .projection(doc! { "documents": 1 })
            .await
            .map_err(PortError::store)?;

        projected
            .map(|user| {
                user.documents
                    .into_iter()
                    .map(document_from_bson)
                    .collect::<PortResult<Vec<_>>>()
            })
            .transpose()
    }

    async fn replace_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
        document: &Document,
    ) -> PortResult<UpdateAck> {
        let record = document_to_bson(document)?;
        let result = self
            .users()
            .update_one(
                document_filter(user_id, document_id),
                replace_document_update(record),
            )
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn set_document_last_viewed(
        &self,
        user_id: &str,
        document_id: DocumentId,
        at: DateTime<Utc>,
    ) -> PortResult<UpdateAck> {
        let result = self
            .users()
            .update_one(document_filter(user_id, document_id), last_viewed_update(at))
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn push_query(
        &self,
        user_id: &str,
        document_id: DocumentId,
        query: &Query,
    ) -> PortResult<UpdateAck> {
        let record = query_to_bson(query)?;
        let result = self
            .users()
            .update_one(document_filter(user_id, document_id), push_query_update(record))
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn find_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> PortResult<Option<Document>> {
        let projected = self
            .user_documents()
            .find_one(document_filter(user_id, document_id))
            .projection(single_document_projection())
            .await
            .map_err(PortError::store)?;

        projected
            .and_then(|user| user.documents.into_iter().next())
            .map(document_from_bson)
            .transpose()
    }

    async fn pull_document(&self, user_id: &str, document_id: DocumentId) -> PortResult<UpdateAck> {
        let result = self
            .users()
            .update_one(user_filter(user_id), pull_document_update(document_id))
            .await
            .map_err(PortError::store)?;
        Ok(update_ack(result))
    }

    async fn next_sequence(&self, key: &str) -> PortResult<i64> {
        let counter = self
            .counters()
            .find_one_and_update(doc! { "_id": key }, counter_increment())
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(PortError::store)?;

        counter
            .map(|c| c.seq)
            .ok_or_else(|| PortError::store(CounterMissing(key.to_string())))
    }
}
