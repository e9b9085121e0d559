use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use store_lib::adapters::MemoryAdapter;
use store_lib::config::Config;
use store_lib::{Repository, DOCUMENT_ID_COUNTER};
use study_assistant_core::{Clock, Document, DocumentId, FieldMap, PortError, Query, User};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn uploaded() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
}

fn setup() -> (Arc<MemoryAdapter>, Repository) {
    let store = Arc::new(MemoryAdapter::new());
    let repo = Repository::new(store.clone()).with_clock(Arc::new(FixedClock(fixed_now())));
    (store, repo)
}

fn document(id: i64, title: &str) -> Document {
    Document::new(DocumentId(id), title, "body text", "biology", uploaded())
}

async fn seeded() -> (Arc<MemoryAdapter>, Repository) {
    let (store, repo) = setup();
    repo.create_user(&User::new("u1", "a@b.com")).await.unwrap();
    (store, repo)
}

#[tokio::test]
async fn create_then_lookup_by_email() {
    let (_, repo) = setup();

    let mut user = User::new("u1", "a@b.com");
    user.profile.insert("name".to_string(), json!("Ada"));
    let ack = repo.create_user(&user).await.unwrap();
    assert!(!ack.inserted_id.is_empty());

    let found = repo.get_user_by_email("a@b.com").await.unwrap().unwrap();
    assert_eq!(found.id, "u1");
    assert_eq!(found.email, "a@b.com");
    assert_eq!(found.profile.get("name"), Some(&json!("Ada")));

    assert!(repo.get_user_by_email("nobody@b.com").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_a_store_failure() {
    let (store, repo) = seeded().await;

    let err = repo
        .create_user(&User::new("u2", "a@b.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Store(_)));
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn update_user_merges_top_level_fields() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(1, "Cells")).await.unwrap();

    let mut patch = FieldMap::new();
    patch.insert("name".to_string(), json!("Grace"));
    let ack = repo.update_user("u1", &patch).await.unwrap();
    assert_eq!(ack.matched_count, 1);
    assert_eq!(ack.modified_count, 1);

    let user = repo.get_user_by_email("a@b.com").await.unwrap().unwrap();
    assert_eq!(user.profile.get("name"), Some(&json!("Grace")));
    assert_eq!(user.documents.len(), 1);
}

#[tokio::test]
async fn missing_users_are_silent_noops() {
    let (_, repo) = seeded().await;

    let mut patch = FieldMap::new();
    patch.insert("name".to_string(), json!("x"));
    let ack = repo.update_user("ghost", &patch).await.unwrap();
    assert_eq!((ack.matched_count, ack.modified_count), (0, 0));

    let ack = repo.delete_user("ghost").await.unwrap();
    assert_eq!(ack.deleted_count, 0);

    let ack = repo.add_document_to_user("ghost", &document(1, "T")).await.unwrap();
    assert!(ack.is_noop());

    // An email held by another user does not matter when nobody matches.
    let mut patch = FieldMap::new();
    patch.insert("email".to_string(), json!("a@b.com"));
    let ack = repo.update_user("ghost", &patch).await.unwrap();
    assert_eq!((ack.matched_count, ack.modified_count), (0, 0));
}

#[tokio::test]
async fn taking_another_users_email_is_a_store_failure() {
    let (_, repo) = seeded().await;
    repo.create_user(&User::new("u2", "c@d.com")).await.unwrap();

    let mut patch = FieldMap::new();
    patch.insert("email".to_string(), json!("a@b.com"));
    let err = repo.update_user("u2", &patch).await.unwrap_err();
    assert!(matches!(err, PortError::Store(_)));
}

#[tokio::test]
async fn delete_user_removes_the_record() {
    let (store, repo) = seeded().await;

    let ack = repo.delete_user("u1").await.unwrap();
    assert_eq!(ack.deleted_count, 1);
    assert_eq!(store.user_count().await, 0);
    assert!(repo.get_user_by_email("a@b.com").await.unwrap().is_none());
}

#[tokio::test]
async fn added_document_is_listed() {
    let (_, repo) = seeded().await;

    repo.add_document_to_user("u1", &document(7, "T")).await.unwrap();

    let docs = repo.get_user_documents("u1", "any subject").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, DocumentId(7));
}

#[tokio::test]
async fn subject_does_not_filter_documents() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(1, "A")).await.unwrap();
    let mut other = document(2, "B");
    other.subject = "history".to_string();
    repo.add_document_to_user("u1", &other).await.unwrap();

    let docs = repo.get_user_documents("u1", "biology").await.unwrap();
    let ids: Vec<_> = docs.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![DocumentId(1), DocumentId(2)]);
}

#[tokio::test]
async fn documents_of_unknown_user_are_empty() {
    let (_, repo) = setup();
    assert!(repo.get_user_documents("ghost", "").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_document_replaces_the_whole_element() {
    let (_, repo) = seeded().await;
    let mut original = document(3, "Draft");
    original.queries.push(Query::new("q", "a", uploaded()));
    repo.add_document_to_user("u1", &original).await.unwrap();

    let mut replacement = document(3, "Final");
    replacement.summary = "short".to_string();
    let ack = repo
        .update_document("u1", DocumentId(3), &replacement)
        .await
        .unwrap();
    assert_eq!(ack.modified_count, 1);

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs, vec![replacement]);
}

#[tokio::test]
async fn last_viewed_is_persisted_from_the_clock() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(4, "T")).await.unwrap();

    let ack = repo
        .update_document_last_viewed("u1", DocumentId(4))
        .await
        .unwrap();
    assert_eq!(ack.matched_count, 1);

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs[0].last_viewed, Some(fixed_now()));

    let ack = repo
        .update_document_last_viewed("u1", DocumentId(99))
        .await
        .unwrap();
    assert_eq!(ack.matched_count, 0);
}

#[tokio::test]
async fn queries_keep_insertion_order() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(5, "T")).await.unwrap();

    let q1 = Query::new("What is a cell?", "The unit of life.", uploaded());
    let q2 = Query::new("And an organ?", "A group of tissues.", fixed_now());
    repo.add_query_to_document("u1", DocumentId(5), &q1).await.unwrap();
    repo.add_query_to_document("u1", DocumentId(5), &q2).await.unwrap();

    let view = repo.get_document("u1", 5_i64).await.unwrap().unwrap();
    assert_eq!(view.queries, vec![q1, q2]);
}

#[tokio::test]
async fn appended_queries_are_kept_as_given() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(5, "T")).await.unwrap();

    let mut cited = FieldMap::new();
    cited.insert("question".to_string(), json!("Where is it stated?"));
    cited.insert("answer".to_string(), json!("Chapter two."));
    cited.insert("sources".to_string(), json!([1, 2]));
    let cited = Query::from_fields(cited);

    let mut unanswered = FieldMap::new();
    unanswered.insert("question".to_string(), json!("Still thinking?"));
    let unanswered = Query::from_fields(unanswered);

    repo.add_query_to_document("u1", DocumentId(5), &cited).await.unwrap();
    repo.add_query_to_document("u1", DocumentId(5), &unanswered).await.unwrap();

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs[0].queries, vec![cited.clone(), unanswered.clone()]);

    let view = repo.get_document("u1", 5_i64).await.unwrap().unwrap();
    assert_eq!(view.queries[0].get("sources"), Some(&json!([1, 2])));
    assert_eq!(view.queries[1].answer(), None);
}

#[tokio::test]
async fn document_extra_fields_are_stored_and_replaced() {
    let (_, repo) = seeded().await;
    let mut uploaded_pdf = document(8, "Notes");
    uploaded_pdf
        .extra
        .insert("fileName".to_string(), json!("notes.pdf"));
    repo.add_document_to_user("u1", &uploaded_pdf).await.unwrap();

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs[0].extra.get("fileName"), Some(&json!("notes.pdf")));

    let mut renamed = uploaded_pdf.clone();
    renamed
        .extra
        .insert("fileName".to_string(), json!("notes-v2.pdf"));
    repo.update_document("u1", DocumentId(8), &renamed).await.unwrap();

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs, vec![renamed]);
}

#[tokio::test]
async fn get_document_shapes_the_response() {
    let (_, repo) = seeded().await;
    let mut stored = document(6, "Genetics");
    stored.last_viewed = Some(uploaded());
    repo.add_document_to_user("u1", &stored).await.unwrap();

    let view = repo.get_document("u1", "6").await.unwrap().unwrap();
    assert_eq!(view.id, DocumentId(6));
    assert_eq!(view.title, "Genetics");
    assert_eq!(view.summary, "");
    assert_eq!(view.uploaded_date, uploaded());

    // lastViewed comes from the clock, expressed in the default civil timezone.
    assert_eq!(view.last_viewed, fixed_now());
    assert_eq!(view.last_viewed.timezone(), chrono_tz::Asia::Jerusalem);
}

#[tokio::test]
async fn get_document_uses_the_configured_timezone() {
    let store = Arc::new(MemoryAdapter::new());
    let config = Config::from_lookup(|key| match key {
        "DB_URL" => Some("mongodb://localhost:27017".to_string()),
        "DB_NAME" => Some("study".to_string()),
        _ => None,
    })
    .unwrap()
    .with_timezone(chrono_tz::Europe::London);
    let repo = Repository::from_config(store, &config).with_clock(Arc::new(FixedClock(fixed_now())));

    repo.create_user(&User::new("u1", "a@b.com")).await.unwrap();
    repo.add_document_to_user("u1", &document(1, "T")).await.unwrap();

    let view = repo.get_document("u1", DocumentId(1)).await.unwrap().unwrap();
    assert_eq!(view.last_viewed.timezone(), chrono_tz::Europe::London);
    assert_eq!(view.last_viewed, fixed_now());
}

#[tokio::test]
async fn get_document_absent_cases() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(1, "T")).await.unwrap();

    assert!(repo.get_document("u1", 2_i64).await.unwrap().is_none());
    assert!(repo.get_document("someone-else", 1_i64).await.unwrap().is_none());
}

#[tokio::test]
async fn non_integer_document_id_is_rejected_before_the_store() {
    let (store, repo) = setup();

    let err = repo.get_document("u1", "not-an-int").await.unwrap_err();
    assert!(matches!(err, PortError::InvalidInput(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "Document ID must be an integer");

    // Nothing was written as a side effect.
    assert_eq!(store.user_count().await, 0);
    assert_eq!(store.counter(DOCUMENT_ID_COUNTER).await, None);
}

#[tokio::test]
async fn delete_document_reports_missing_documents() {
    let (_, repo) = seeded().await;

    let err = repo.delete_document("u1", DocumentId(999)).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
    assert_eq!(err.status_code(), 404);

    let err = repo.delete_document("ghost", DocumentId(1)).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn delete_document_removes_only_that_document() {
    let (_, repo) = seeded().await;
    repo.add_document_to_user("u1", &document(1, "A")).await.unwrap();
    repo.add_document_to_user("u1", &document(2, "B")).await.unwrap();

    let ack = repo.delete_document("u1", DocumentId(1)).await.unwrap();
    assert_eq!(ack.modified_count, 1);

    let docs = repo.get_user_documents("u1", "").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, DocumentId(2));
}

#[tokio::test]
async fn first_document_id_is_one() {
    let (store, repo) = setup();
    assert_eq!(store.counter(DOCUMENT_ID_COUNTER).await, None);

    assert_eq!(repo.get_next_document_id().await.unwrap(), DocumentId(1));
    assert_eq!(repo.get_next_document_id().await.unwrap(), DocumentId(2));
    assert_eq!(store.counter(DOCUMENT_ID_COUNTER).await, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ids_are_distinct_and_contiguous() {
    let (_, repo) = setup();
    let start = repo.get_next_document_id().await.unwrap().value();

    let tasks = (0..64).map(|_| {
        let repo = repo.clone();
        tokio::spawn(async move { repo.get_next_document_id().await.unwrap().value() })
    });
    let ids: Vec<i64> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    let expected: HashSet<i64> = (start + 1..=start + 64).collect();
    assert_eq!(unique, expected);
}
