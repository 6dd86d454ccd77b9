//! Domain types for the DocumentDB data API.
//!
//! # Design
//! Documents, filters, update specs and pipeline stages are all carried as
//! `serde_json::Map` and passed through opaquely; the server alone interprets
//! them. Result types are plain values built once from a response and never
//! mutated afterwards.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// A JSON object: a document, a filter, an update spec, or a pipeline stage.
pub type Document = Map<String, Value>;

/// One of the fixed server-side endpoints, addressed by path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    InsertOne,
    InsertMany,
    Find,
    Aggregate,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::InsertOne => "insertOne",
            Action::InsertMany => "insertMany",
            Action::Find => "find",
            Action::Aggregate => "aggregate",
            Action::UpdateOne => "updateOne",
            Action::UpdateMany => "updateMany",
            Action::DeleteOne => "deleteOne",
            Action::DeleteMany => "deleteMany",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint and credentials for one data-API deployment.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParameters {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Deadline applied to every request made through the connection.
    #[serde(default, deserialize_with = "timeout_secs::deserialize", rename = "timeoutSecs")]
    pub timeout: Option<Duration>,
}

impl ConnectionParameters {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Load connection parameters from environment variables.
    ///
    /// Required:
    /// - `DOCUMENTDB_HOST`: base URL of the data API
    /// - `DOCUMENTDB_USERNAME`, `DOCUMENTDB_PASSWORD`: Basic-auth credentials
    ///
    /// Optional:
    /// - `DOCUMENTDB_TIMEOUT_SECS`: per-request deadline in seconds
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| ApiError::Validation(format!("missing required environment variable: {key}")))
        };

        let host = required("DOCUMENTDB_HOST")?;
        let username = required("DOCUMENTDB_USERNAME")?;
        let password = required("DOCUMENTDB_PASSWORD")?;

        let timeout = match lookup("DOCUMENTDB_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ApiError::Validation("invalid value for DOCUMENTDB_TIMEOUT_SECS: must be a whole number of seconds".to_string())
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            host,
            username,
            password,
            timeout,
        })
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// Database and collection an operation is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTarget {
    pub database: String,
    pub collection: String,
}

impl OperationTarget {
    pub fn new(database: &str, collection: &str) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

/// Ids acknowledged by an insert, in server-reported order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsertResult {
    inserted_ids: Vec<String>,
}

impl InsertResult {
    pub fn new(inserted_ids: Vec<String>) -> Self {
        Self { inserted_ids }
    }

    pub fn inserted_ids(&self) -> &[String] {
        &self.inserted_ids
    }

    /// Always the number of acknowledged ids.
    pub fn inserted_count(&self) -> usize {
        self.inserted_ids.len()
    }

    pub fn into_ids(self) -> Vec<String> {
        self.inserted_ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Present only when the server performed an upsert.
    pub upserted_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// A document returned by `find` or `aggregate`.
///
/// `fields` is the full document as received, `_id` included; `id` is the
/// `_id` value with any `{"$oid": ...}` envelope removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: Option<String>,
    pub fields: Document,
}

impl DocumentRecord {
    pub fn from_document(fields: Document) -> Self {
        let id = fields.get("_id").map(id_text);
        Self { id, fields }
    }

    /// The document as an output row: every field as received, `_id` untouched.
    pub fn to_row(&self) -> Document {
        self.fields.clone()
    }
}

/// Text form of an id value: `$oid` envelopes unwrapped, strings verbatim,
/// anything else as its JSON text.
pub(crate) fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("$oid") {
            Some(Value::String(oid)) => oid.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}
