//! Stateless request builder and response parser for the data API.
//!
//! # Design
//! `DataApiClient` holds only the trimmed base URL and the precomputed
//! `Authorization` header, and carries no mutable state between calls. Each
//! action is split into a `build_*` method that produces an `HttpRequest` and
//! a `parse_*` method that consumes an `HttpResponse`. `DocumentDbClient`
//! glues the two halves to a `Transport`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::types::{
    id_text, Action, DeleteResult, Document, DocumentRecord, InsertResult, OperationTarget, UpdateResult,
};

/// Largest batch accepted by `insertMany`.
pub const MAX_DOCUMENTS_PER_INSERT: usize = 10;

/// Builds data-API requests and parses their responses without touching the
/// network.
#[derive(Clone)]
pub struct DataApiClient {
    base_url: String,
    authorization: String,
}

impl DataApiClient {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        Self {
            base_url: host.strip_suffix('/').unwrap_or(host).to_string(),
            authorization: format!("Basic {credentials}"),
        }
    }

    /// Request target for `action`.
    pub fn url(&self, action: Action) -> String {
        format!("{}/data/v1/action/{}", self.base_url, action)
    }

    pub fn build_insert_one(&self, target: &OperationTarget, document: &Document) -> Result<HttpRequest, ApiError> {
        self.request(
            Action::InsertOne,
            json!({
                "database": target.database,
                "collection": target.collection,
                "document": document,
            }),
        )
    }

    /// Rejects batches above `MAX_DOCUMENTS_PER_INSERT` before building.
    pub fn build_insert_many(&self, target: &OperationTarget, documents: &[Document]) -> Result<HttpRequest, ApiError> {
        if documents.len() > MAX_DOCUMENTS_PER_INSERT {
            return Err(ApiError::Validation(format!(
                "cannot insert more than {MAX_DOCUMENTS_PER_INSERT} documents at once, got {}",
                documents.len()
            )));
        }
        self.request(
            Action::InsertMany,
            json!({
                "database": target.database,
                "collection": target.collection,
                "documents": documents,
            }),
        )
    }

    /// `filter` is sent only when non-empty; `limit` and `skip` only when set.
    pub fn build_find(
        &self,
        target: &OperationTarget,
        filter: Option<&Document>,
        limit: Option<u64>,
        skip: Option<u64>,
    ) -> Result<HttpRequest, ApiError> {
        let mut body = json!({
            "database": target.database,
            "collection": target.collection,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = Value::Object(filter.clone());
        }
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }
        if let Some(skip) = skip {
            body["skip"] = json!(skip);
        }
        self.request(Action::Find, body)
    }

    pub fn build_aggregate(&self, target: &OperationTarget, pipeline: &[Document]) -> Result<HttpRequest, ApiError> {
        self.request(
            Action::Aggregate,
            json!({
                "database": target.database,
                "collection": target.collection,
                "pipeline": pipeline,
            }),
        )
    }

    /// `action` must be `UpdateOne` or `UpdateMany`.
    pub fn build_update(
        &self,
        action: Action,
        target: &OperationTarget,
        filter: &Document,
        update: &Document,
    ) -> Result<HttpRequest, ApiError> {
        debug_assert!(matches!(action, Action::UpdateOne | Action::UpdateMany));
        self.request(
            action,
            json!({
                "database": target.database,
                "collection": target.collection,
                "filter": filter,
                "update": update,
            }),
        )
    }

    /// `action` must be `DeleteOne` or `DeleteMany`. An empty filter is sent
    /// as-is and matches every document.
    pub fn build_delete(&self, action: Action, target: &OperationTarget, filter: &Document) -> Result<HttpRequest, ApiError> {
        debug_assert!(matches!(action, Action::DeleteOne | Action::DeleteMany));
        self.request(
            action,
            json!({
                "database": target.database,
                "collection": target.collection,
                "filter": filter,
            }),
        )
    }

    /// `insertedId` yields one id, `insertedIds` yields the array in order,
    /// anything else yields no ids.
    pub fn parse_insert(&self, action: Action, response: HttpResponse) -> Result<InsertResult, ApiError> {
        let body = parse_object(action, response)?;
        let ids = if let Some(id) = body.get("insertedId") {
            vec![id_text(id)]
        } else if let Some(Value::Array(ids)) = body.get("insertedIds") {
            ids.iter().map(id_text).collect()
        } else {
            Vec::new()
        };
        Ok(InsertResult::new(ids))
    }

    /// Shared by `find` and `aggregate`. A missing or non-array `documents`
    /// field yields no records.
    pub fn parse_records(&self, action: Action, response: HttpResponse) -> Result<Vec<DocumentRecord>, ApiError> {
        let mut body = parse_object(action, response)?;
        let documents = match body.remove("documents") {
            Some(Value::Array(documents)) => documents,
            _ => return Ok(Vec::new()),
        };

        documents
            .into_iter()
            .map(|document| match document {
                Value::Object(fields) => Ok(DocumentRecord::from_document(fields)),
                other => Err(ApiError::MalformedResponse {
                    action,
                    reason: format!("expected a document object, found {other}"),
                }),
            })
            .collect()
    }

    pub fn parse_update(&self, action: Action, response: HttpResponse) -> Result<UpdateResult, ApiError> {
        let body = parse_object(action, response)?;
        Ok(UpdateResult {
            matched_count: count_field(action, &body, "matchedCount")?,
            modified_count: count_field(action, &body, "modifiedCount")?,
            upserted_id: match body.get("upsertedId") {
                None | Some(Value::Null) => None,
                Some(id) => Some(id_text(id)),
            },
        })
    }

    pub fn parse_delete(&self, action: Action, response: HttpResponse) -> Result<DeleteResult, ApiError> {
        let body = parse_object(action, response)?;
        Ok(DeleteResult {
            deleted_count: count_field(action, &body, "deletedCount")?,
        })
    }

    fn request(&self, action: Action, body: Value) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            url: self.url(action),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), self.authorization.clone()),
            ],
            body,
        })
    }
}

/// Map non-2xx responses to `RemoteOperation` and decode the body as a JSON
/// object.
fn parse_object(action: Action, response: HttpResponse) -> Result<Document, ApiError> {
    if !response.is_success() {
        return Err(ApiError::RemoteOperation {
            action,
            status: Some(response.status),
            body: Some(response.body),
            cause: None,
        });
    }

    match serde_json::from_str(&response.body) {
        Ok(Value::Object(body)) => Ok(body),
        Ok(other) => Err(ApiError::MalformedResponse {
            action,
            reason: format!("expected a JSON object, found {other}"),
        }),
        Err(e) => Err(ApiError::MalformedResponse {
            action,
            reason: e.to_string(),
        }),
    }
}

/// Absent or null counts read as zero.
fn count_field(action: Action, body: &Document, field: &str) -> Result<u64, ApiError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| ApiError::MalformedResponse {
            action,
            reason: format!("`{field}` is not a non-negative integer: {value}"),
        }),
    }
}
