//! Workflow-facing tasks built on `DocumentDbClient`.
//!
//! # Design
//! Each task is a plain struct deserialized from already-rendered workflow
//! configuration (camelCase keys). `run` validates the inputs, performs one
//! client call, and shapes the result into an output value. Validation
//! failures surface as `ApiError::Validation` before any request is sent.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

use crate::client::MAX_DOCUMENTS_PER_INSERT;
use crate::documentdb::DocumentDbClient;
use crate::error::ApiError;
use crate::http::Transport;
use crate::store::RecordStore;
use crate::types::{Document, DocumentRecord, OperationTarget, UpdateResult};

/// Any of the four tasks, tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    Insert(InsertTask),
    Read(ReadTask),
    Update(UpdateTask),
    Delete(DeleteTask),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Insert(InsertOutput),
    Read(ReadOutput),
    Update(UpdateResult),
    Delete(DeleteOutput),
}

impl Task {
    /// `store` is only consulted by a read task with `fetchType: STORE`.
    pub fn run<T: Transport>(
        &self,
        client: &DocumentDbClient<T>,
        store: Option<&dyn RecordStore>,
    ) -> Result<TaskOutput, ApiError> {
        match self {
            Task::Insert(task) => task.run(client).map(TaskOutput::Insert),
            Task::Read(task) => task.run(client, store).map(TaskOutput::Read),
            Task::Update(task) => task.run(client).map(TaskOutput::Update),
            Task::Delete(task) => task.run(client).map(TaskOutput::Delete),
        }
    }
}

/// Insert one document or a batch of up to ten.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertTask {
    #[serde(flatten)]
    pub target: OperationTarget,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutput {
    /// The single id, or the first id of a batch.
    pub inserted_id: Option<String>,
    pub inserted_ids: Vec<String>,
    pub inserted_count: usize,
}

impl InsertTask {
    pub fn run<T: Transport>(&self, client: &DocumentDbClient<T>) -> Result<InsertOutput, ApiError> {
        let document = self.document.as_ref().filter(|d| !d.is_empty());
        let documents = self.documents.as_deref().filter(|d| !d.is_empty());
        let (db, coll) = (&self.target.database, &self.target.collection);

        let result = match (document, documents) {
            (None, None) => {
                return Err(ApiError::Validation(
                    "either 'document' for a single insert or 'documents' for a batch must be provided".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::Validation(
                    "cannot specify both 'document' and 'documents'".to_string(),
                ))
            }
            (Some(document), None) => {
                info!(database = %db, collection = %coll, "inserting single document");
                client.insert_one(&self.target, document)?
            }
            (None, Some(documents)) => {
                if documents.len() > MAX_DOCUMENTS_PER_INSERT {
                    return Err(ApiError::Validation(format!(
                        "cannot insert more than {MAX_DOCUMENTS_PER_INSERT} documents at once"
                    )));
                }
                info!(database = %db, collection = %coll, count = documents.len(), "inserting documents");
                client.insert_many(&self.target, documents)?
            }
        };

        let inserted_count = result.inserted_count();
        let inserted_ids = result.into_ids();
        info!(inserted_count, first_id = ?inserted_ids.first(), "insert finished");

        Ok(InsertOutput {
            inserted_id: inserted_ids.first().cloned(),
            inserted_ids,
            inserted_count,
        })
    }
}

/// How a read task hands its records back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchType {
    /// Persist every record through a `RecordStore`.
    Store,
    /// Return every record.
    #[default]
    Fetch,
    /// Return the first record only.
    FetchOne,
    /// Return nothing but the count.
    None,
}

/// Find documents, or run an aggregation when a pipeline is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTask {
    #[serde(flatten)]
    pub target: OperationTarget,
    #[serde(default)]
    pub filter: Option<Document>,
    #[serde(default)]
    pub aggregation_pipeline: Option<Vec<Document>>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub fetch_type: FetchType,
}

/// Records shaped by the fetch type.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    All(Vec<Document>),
    First(Option<Document>),
    Persisted(String),
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutput {
    /// Records returned, or 0/1 for `FETCH_ONE`.
    pub size: u64,
    pub fetched: Fetched,
}

impl Serialize for ReadOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("size", &self.size)?;
        match &self.fetched {
            Fetched::All(rows) => map.serialize_entry("rows", rows)?,
            Fetched::First(row) => map.serialize_entry("row", row)?,
            Fetched::Persisted(uri) => map.serialize_entry("uri", uri)?,
            Fetched::Discarded => {}
        }
        map.end()
    }
}

impl ReadTask {
    pub fn run<T: Transport>(
        &self,
        client: &DocumentDbClient<T>,
        store: Option<&dyn RecordStore>,
    ) -> Result<ReadOutput, ApiError> {
        if self.fetch_type == FetchType::Store && store.is_none() {
            return Err(ApiError::Validation(
                "fetchType STORE requires a record store".to_string(),
            ));
        }
        let (db, coll) = (&self.target.database, &self.target.collection);

        let records = match self.aggregation_pipeline.as_deref().filter(|p| !p.is_empty()) {
            Some(pipeline) => {
                info!(database = %db, collection = %coll, stages = pipeline.len(), "executing aggregation pipeline");
                client.aggregate(&self.target, pipeline)?
            }
            None => {
                info!(database = %db, collection = %coll, "finding documents");
                client.find(&self.target, self.filter.as_ref(), self.limit, self.skip)?
            }
        };
        info!(found = records.len(), "read finished");

        let size = records.len() as u64;
        let output = match (self.fetch_type, store) {
            (FetchType::Fetch, _) => ReadOutput {
                size,
                fetched: Fetched::All(records.iter().map(DocumentRecord::to_row).collect()),
            },
            (FetchType::FetchOne, _) => {
                let first = records.first().map(DocumentRecord::to_row);
                ReadOutput {
                    size: u64::from(first.is_some()),
                    fetched: Fetched::First(first),
                }
            }
            (FetchType::Store, Some(store)) => ReadOutput {
                size,
                fetched: Fetched::Persisted(store.store(&records)?),
            },
            (FetchType::Store, None) | (FetchType::None, _) => ReadOutput {
                size,
                fetched: Fetched::Discarded,
            },
        };
        Ok(output)
    }
}

/// Update one document, or every match when `updateMany` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTask {
    #[serde(flatten)]
    pub target: OperationTarget,
    #[serde(default)]
    pub filter: Option<Document>,
    #[serde(default)]
    pub update: Document,
    #[serde(default)]
    pub update_many: bool,
}

impl UpdateTask {
    pub fn run<T: Transport>(&self, client: &DocumentDbClient<T>) -> Result<UpdateResult, ApiError> {
        if self.update.is_empty() {
            return Err(ApiError::Validation("update operations must be provided".to_string()));
        }
        let filter = self.filter.clone().unwrap_or_default();
        let (db, coll) = (&self.target.database, &self.target.collection);

        let result = if self.update_many {
            info!(database = %db, collection = %coll, "updating multiple documents");
            client.update_many(&self.target, &filter, &self.update)?
        } else {
            info!(database = %db, collection = %coll, "updating single document");
            client.update_one(&self.target, &filter, &self.update)?
        };

        if result.modified_count > 0 {
            info!(
                modified = result.modified_count,
                matched = result.matched_count,
                "update finished"
            );
        } else {
            info!(matched = result.matched_count, "no documents were modified");
        }
        Ok(result)
    }
}

/// Delete one document, or every match when `deleteMany` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTask {
    #[serde(flatten)]
    pub target: OperationTarget,
    #[serde(default)]
    pub filter: Option<Document>,
    #[serde(default)]
    pub delete_many: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutput {
    pub deleted_count: u64,
}

impl DeleteTask {
    pub fn run<T: Transport>(&self, client: &DocumentDbClient<T>) -> Result<DeleteOutput, ApiError> {
        let filter = self.filter.clone().unwrap_or_default();
        let (db, coll) = (&self.target.database, &self.target.collection);

        let result = if self.delete_many {
            info!(database = %db, collection = %coll, "deleting multiple documents");
            client.delete_many(&self.target, &filter)?
        } else {
            info!(database = %db, collection = %coll, "deleting single document");
            client.delete_one(&self.target, &filter)?
        };

        if result.deleted_count > 0 {
            info!(deleted = result.deleted_count, "delete finished");
        } else {
            info!("no documents matched the filter criteria for deletion");
        }
        Ok(DeleteOutput {
            deleted_count: result.deleted_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use super::*;
    use crate::http::{HttpRequest, HttpResponse, TransportError};
    use crate::types::ConnectionParameters;

    /// Replies with one canned body and remembers request bodies.
    struct Canned {
        body: String,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status: 200,
                body: self.body.clone(),
            })
        }
    }

    fn client(body: &str) -> DocumentDbClient<Canned> {
        DocumentDbClient::with_transport(
            ConnectionParameters::new("http://h", "u", "p"),
            Canned {
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            },
        )
    }

    struct MemoryStore {
        batches: RefCell<Vec<usize>>,
    }

    impl RecordStore for MemoryStore {
        fn store(&self, records: &[DocumentRecord]) -> Result<String, ApiError> {
            self.batches.borrow_mut().push(records.len());
            Ok("memory://batch-0".to_string())
        }
    }

    fn task(value: Value) -> Task {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn insert_task_requires_document_or_documents() {
        let t = task(json!({"type": "Insert", "database": "db", "collection": "c"}));
        let err = t.run(&client("{}"), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn insert_task_rejects_both_document_and_documents() {
        let t = task(json!({
            "type": "Insert",
            "database": "db",
            "collection": "c",
            "document": {"a": 1},
            "documents": [{"b": 2}]
        }));
        let c = client(r#"{"insertedId":"x"}"#);
        let err = t.run(&c, None).unwrap_err();
        assert!(err.is_validation());
        assert!(c_seen(&c).is_empty());
    }

    #[test]
    fn insert_task_rejects_more_than_ten_documents() {
        let documents: Vec<Value> = (0..11).map(|i| json!({ "n": i })).collect();
        let t = task(json!({"type": "Insert", "database": "db", "collection": "c", "documents": documents}));
        let err = t.run(&client("{}"), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn insert_task_single_document_output() {
        let t = task(json!({"type": "Insert", "database": "db", "collection": "c", "document": {"name": "A"}}));
        let TaskOutput::Insert(output) = t.run(&client(r#"{"insertedId":"id1"}"#), None).unwrap() else {
            panic!("expected insert output");
        };
        assert_eq!(
            output,
            InsertOutput {
                inserted_id: Some("id1".to_string()),
                inserted_ids: vec!["id1".to_string()],
                inserted_count: 1,
            }
        );
    }

    #[test]
    fn insert_task_batch_output_serializes_camel_case() {
        let t = task(json!({
            "type": "Insert",
            "database": "db",
            "collection": "c",
            "documents": [{"n": 1}, {"n": 2}]
        }));
        let output = t.run(&client(r#"{"insertedIds":["a","b"]}"#), None).unwrap();
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"insertedId": "a", "insertedIds": ["a", "b"], "insertedCount": 2})
        );
    }

    const TWO_DOCS: &str = r#"{"documents":[{"_id":{"$oid":"d2"},"status":"active"},{"_id":"d3","status":"active"}]}"#;

    #[test]
    fn read_task_fetch_returns_documents_as_received() {
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "filter": {"status": "active"}}));
        let TaskOutput::Read(output) = t.run(&client(TWO_DOCS), None).unwrap() else {
            panic!("expected read output");
        };
        assert_eq!(output.size, 2);
        assert_eq!(
            output.fetched,
            Fetched::All(vec![
                json!({"_id": {"$oid": "d2"}, "status": "active"}).as_object().unwrap().clone(),
                json!({"_id": "d3", "status": "active"}).as_object().unwrap().clone(),
            ])
        );
    }

    #[test]
    fn read_task_fetch_one_keeps_first() {
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "fetchType": "FETCH_ONE"}));
        let output = t.run(&client(TWO_DOCS), None).unwrap();
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"size": 1, "row": {"_id": {"$oid": "d2"}, "status": "active"}})
        );
    }

    #[test]
    fn read_task_fetch_one_on_empty_result() {
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "fetchType": "FETCH_ONE"}));
        let output = t.run(&client(r#"{"documents":[]}"#), None).unwrap();
        assert_eq!(serde_json::to_value(output).unwrap(), json!({"size": 0, "row": null}));
    }

    #[test]
    fn read_task_none_discards_records() {
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "fetchType": "NONE"}));
        let output = t.run(&client(TWO_DOCS), None).unwrap();
        assert_eq!(serde_json::to_value(output).unwrap(), json!({"size": 2}));
    }

    #[test]
    fn read_task_store_hands_records_to_store() {
        let store = MemoryStore {
            batches: RefCell::new(Vec::new()),
        };
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "fetchType": "STORE"}));
        let output = t.run(&client(TWO_DOCS), Some(&store)).unwrap();
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"size": 2, "uri": "memory://batch-0"})
        );
        assert_eq!(*store.batches.borrow(), vec![2]);
    }

    #[test]
    fn read_task_store_without_store_is_validation_error() {
        let t = task(json!({"type": "Read", "database": "db", "collection": "c", "fetchType": "STORE"}));
        assert!(t.run(&client(TWO_DOCS), None).unwrap_err().is_validation());
    }

    #[test]
    fn read_task_prefers_pipeline_over_find() {
        let c = client(r#"{"documents":[{"_id":"eng","count":2}]}"#);
        let t = ReadTask {
            target: OperationTarget::new("db", "c"),
            filter: Some(json!({"ignored": true}).as_object().unwrap().clone()),
            aggregation_pipeline: Some(vec![json!({"$match": {"status": "active"}}).as_object().unwrap().clone()]),
            limit: Some(5),
            skip: None,
            fetch_type: FetchType::Fetch,
        };
        t.run(&c, None).unwrap();
        let seen = c_seen(&c);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].url.ends_with("/aggregate"));
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn update_task_requires_update() {
        let t = task(json!({"type": "Update", "database": "db", "collection": "c", "filter": {"a": 1}}));
        assert!(t.run(&client("{}"), None).unwrap_err().is_validation());
    }

    #[test]
    fn update_task_many_uses_update_many() {
        let c = client(r#"{"matchedCount":5,"modifiedCount":5}"#);
        let t = task(json!({
            "type": "Update",
            "database": "db",
            "collection": "c",
            "update": {"$set": {"status": "x"}},
            "updateMany": true
        }));
        let output = t.run(&c, None).unwrap();
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"matchedCount": 5, "modifiedCount": 5, "upsertedId": null})
        );
        let seen = c_seen(&c);
        assert!(seen[0].url.ends_with("/updateMany"));
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body["filter"], json!({}));
    }

    #[test]
    fn delete_task_defaults_to_delete_one() {
        let c = client(r#"{"deletedCount":0}"#);
        let t = task(json!({"type": "Delete", "database": "db", "collection": "c", "filter": {"name": "ghost"}}));
        let TaskOutput::Delete(output) = t.run(&c, None).unwrap() else {
            panic!("expected delete output");
        };
        assert_eq!(output.deleted_count, 0);
        assert!(c_seen(&c)[0].url.ends_with("/deleteOne"));
    }

    fn c_seen(client: &DocumentDbClient<Canned>) -> Vec<HttpRequest> {
        client.transport().seen.lock().unwrap().clone()
    }
}
