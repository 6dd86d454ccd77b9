//! Blocking client that executes data-API actions end to end.

use tracing::{debug, warn};

use crate::client::DataApiClient;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};
use crate::types::{
    Action, ConnectionParameters, DeleteResult, Document, DocumentRecord, InsertResult, OperationTarget, UpdateResult,
};

/// Executes the eight data-API actions against one endpoint.
///
/// Holds only immutable connection data, so a single instance can be shared
/// across threads. Every call is one request/response exchange with no
/// retries.
pub struct DocumentDbClient<T: Transport = UreqTransport> {
    api: DataApiClient,
    transport: T,
}

impl DocumentDbClient<UreqTransport> {
    /// No network I/O happens until an operation is called.
    pub fn connect(params: ConnectionParameters) -> Self {
        let transport = UreqTransport::new(params.timeout);
        Self::with_transport(params, transport)
    }
}

impl<T: Transport> DocumentDbClient<T> {
    pub fn with_transport(params: ConnectionParameters, transport: T) -> Self {
        Self {
            api: DataApiClient::new(&params.host, &params.username, &params.password),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn insert_one(&self, target: &OperationTarget, document: &Document) -> Result<InsertResult, ApiError> {
        let req = self.api.build_insert_one(target, document)?;
        let response = self.send(Action::InsertOne, &req)?;
        self.api.parse_insert(Action::InsertOne, response)
    }

    pub fn insert_many(&self, target: &OperationTarget, documents: &[Document]) -> Result<InsertResult, ApiError> {
        let req = self.api.build_insert_many(target, documents)?;
        let response = self.send(Action::InsertMany, &req)?;
        self.api.parse_insert(Action::InsertMany, response)
    }

    pub fn find(
        &self,
        target: &OperationTarget,
        filter: Option<&Document>,
        limit: Option<u64>,
        skip: Option<u64>,
    ) -> Result<Vec<DocumentRecord>, ApiError> {
        let req = self.api.build_find(target, filter, limit, skip)?;
        let response = self.send(Action::Find, &req)?;
        self.api.parse_records(Action::Find, response)
    }

    pub fn aggregate(&self, target: &OperationTarget, pipeline: &[Document]) -> Result<Vec<DocumentRecord>, ApiError> {
        let req = self.api.build_aggregate(target, pipeline)?;
        let response = self.send(Action::Aggregate, &req)?;
        self.api.parse_records(Action::Aggregate, response)
    }

    pub fn update_one(
        &self,
        target: &OperationTarget,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, ApiError> {
        self.update(Action::UpdateOne, target, filter, update)
    }

    /// An empty filter updates every document in the collection.
    pub fn update_many(
        &self,
        target: &OperationTarget,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, ApiError> {
        self.update(Action::UpdateMany, target, filter, update)
    }

    pub fn delete_one(&self, target: &OperationTarget, filter: &Document) -> Result<DeleteResult, ApiError> {
        self.delete(Action::DeleteOne, target, filter)
    }

    /// An empty filter deletes every document in the collection.
    pub fn delete_many(&self, target: &OperationTarget, filter: &Document) -> Result<DeleteResult, ApiError> {
        self.delete(Action::DeleteMany, target, filter)
    }

    fn update(
        &self,
        action: Action,
        target: &OperationTarget,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, ApiError> {
        let req = self.api.build_update(action, target, filter, update)?;
        let response = self.send(action, &req)?;
        self.api.parse_update(action, response)
    }

    fn delete(&self, action: Action, target: &OperationTarget, filter: &Document) -> Result<DeleteResult, ApiError> {
        let req = self.api.build_delete(action, target, filter)?;
        let response = self.send(action, &req)?;
        self.api.parse_delete(action, response)
    }

    fn send(&self, action: Action, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(%action, url = %req.url, "making POST request");
        self.transport.execute(req).map_err(|e| {
            warn!(%action, url = %req.url, error = %e, "request failed");
            match e {
                TransportError::NoResponse(cause) => ApiError::RemoteOperation {
                    action,
                    status: None,
                    body: None,
                    cause: Some(cause),
                },
                TransportError::UnreadableBody { status, reason } if (200..300).contains(&status) => {
                    ApiError::MalformedResponse {
                        action,
                        reason: format!("HTTP {status} body could not be read: {reason}"),
                    }
                }
                TransportError::UnreadableBody { status, reason } => ApiError::RemoteOperation {
                    action,
                    status: Some(status),
                    body: None,
                    cause: Some(reason),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use super::*;

    /// Answers every request with the same response and records what it saw.
    struct Canned {
        status: u16,
        body: String,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last_body(&self) -> Value {
            let seen = self.seen.lock().unwrap();
            serde_json::from_str(&seen.last().unwrap().body).unwrap()
        }

        fn last_url(&self) -> String {
            self.seen.lock().unwrap().last().unwrap().url.clone()
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::NoResponse("dns error: failed to lookup address".to_string()))
        }
    }

    fn params() -> ConnectionParameters {
        ConnectionParameters::new("https://h/", "u", "p")
    }

    fn target() -> OperationTarget {
        OperationTarget::new("db", "coll")
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn insert_one_scenario() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(200, r#"{"insertedId":"id1"}"#));
        let result = client.insert_one(&target(), &doc(json!({"name": "A"}))).unwrap();
        assert_eq!(result.inserted_ids(), ["id1"]);
        assert_eq!(result.inserted_count(), 1);
        assert_eq!(client.transport.last_url(), "https://h/data/v1/action/insertOne");
    }

    #[test]
    fn find_scenario() {
        let client = DocumentDbClient::with_transport(
            params(),
            Canned::new(
                200,
                r#"{"documents":[{"_id":"d2","status":"active"},{"_id":"d3","status":"active"}]}"#,
            ),
        );
        let filter = doc(json!({"status": "active"}));
        let records = client.find(&target(), Some(&filter), Some(2), Some(1)).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_deref().unwrap()).collect();
        assert_eq!(ids, ["d2", "d3"]);
        assert_eq!(client.transport.last_body()["limit"], 2);
        assert_eq!(client.transport.last_body()["skip"], 1);
    }

    #[test]
    fn update_many_scenario() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(200, r#"{"matchedCount":5,"modifiedCount":5}"#));
        let result = client
            .update_many(&target(), &Document::new(), &doc(json!({"$set": {"status": "x"}})))
            .unwrap();
        assert_eq!(result.matched_count, 5);
        assert_eq!(result.modified_count, 5);
        assert!(result.upserted_id.is_none());
        assert_eq!(client.transport.last_body()["filter"], json!({}));
    }

    #[test]
    fn delete_one_matching_nothing_scenario() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(200, r#"{"deletedCount":0}"#));
        let result = client.delete_one(&target(), &doc(json!({"name": "ghost"}))).unwrap();
        assert_eq!(result.deleted_count, 0);
    }

    #[test]
    fn aggregate_uses_aggregate_action() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(200, r#"{"documents":[{"_id":"eng","count":3}]}"#));
        let records = client
            .aggregate(&target(), &[doc(json!({"$group": {"_id": "$dept", "count": {"$sum": 1}}}))])
            .unwrap();
        assert_eq!(records[0].id.as_deref(), Some("eng"));
        assert_eq!(client.transport.last_url(), "https://h/data/v1/action/aggregate");
    }

    #[test]
    fn non_2xx_carries_status_and_body() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(401, r#"{"error":"Unauthorized"}"#));
        let err = client.delete_many(&target(), &Document::new()).unwrap_err();
        assert!(err.is_remote());
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains(r#"{"error":"Unauthorized"}"#));
    }

    #[test]
    fn transport_failure_has_no_status() {
        let client = DocumentDbClient::with_transport(params(), Unreachable);
        let err = client.find(&target(), None, None, None).unwrap_err();
        match err {
            ApiError::RemoteOperation {
                action, status, body, cause, ..
            } => {
                assert_eq!(action, Action::Find);
                assert!(status.is_none());
                assert!(body.is_none());
                assert!(cause.unwrap().contains("dns error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct Truncated(u16);

    impl Transport for Truncated {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::UnreadableBody {
                status: self.0,
                reason: "body exceeds limit".to_string(),
            })
        }
    }

    #[test]
    fn unreadable_success_body_is_malformed() {
        let client = DocumentDbClient::with_transport(params(), Truncated(200));
        let err = client.find(&target(), None, None, None).unwrap_err();
        match err {
            ApiError::MalformedResponse { action, reason } => {
                assert_eq!(action, Action::Find);
                assert!(reason.contains("HTTP 200"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unreadable_error_body_keeps_status() {
        let client = DocumentDbClient::with_transport(params(), Truncated(503));
        let err = client.delete_one(&target(), &Document::new()).unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "deleteOne failed: HTTP 503: body exceeds limit");
    }

    #[test]
    fn oversized_batch_never_reaches_transport() {
        let client = DocumentDbClient::with_transport(params(), Canned::new(200, "{}"));
        let documents: Vec<Document> = (0..11).map(|i| doc(json!({ "n": i }))).collect();
        let err = client.insert_many(&target(), &documents).unwrap_err();
        assert!(err.is_validation());
        assert!(client.transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn client_is_shareable_across_threads() {
        let client = std::sync::Arc::new(DocumentDbClient::with_transport(params(), Canned::new(200, r#"{"deletedCount":1}"#)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let client = client.clone();
                std::thread::spawn(move || client.delete_one(&target(), &Document::new()).unwrap().deleted_count)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(client.transport.seen.lock().unwrap().len(), 4);
    }
}
