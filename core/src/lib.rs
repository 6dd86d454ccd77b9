//! Blocking client for MongoDB-compatible HTTP data APIs.
//!
//! # Overview
//! Each of the eight data-API actions (insertOne, insertMany, find,
//! aggregate, updateOne, updateMany, deleteOne, deleteMany) is one
//! authenticated JSON POST to `{host}/data/v1/action/{action}`, parsed into a
//! small typed result.
//!
//! # Design
//! - `DataApiClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network.
//! - `DocumentDbClient` runs build, `Transport::execute`, parse for each call.
//!   It keeps no mutable state and is safe to share across threads.
//! - Documents, filters, updates and pipeline stages are opaque
//!   `serde_json::Map` values.
//! - `tasks` layers workflow-style input validation and output shaping on top.

pub mod client;
pub mod documentdb;
pub mod error;
pub mod http;
pub mod store;
pub mod tasks;
pub mod types;

pub use client::{DataApiClient, MAX_DOCUMENTS_PER_INSERT};
pub use documentdb::DocumentDbClient;
pub use error::ApiError;
pub use http::{HttpRequest, HttpResponse, Transport, TransportError, UreqTransport, RESPONSE_BODY_LIMIT};
pub use store::{JsonLinesStore, RecordStore};
pub use tasks::{
    DeleteOutput, DeleteTask, FetchType, Fetched, InsertOutput, InsertTask, ReadOutput, ReadTask, Task, TaskOutput,
    UpdateTask,
};
pub use types::{
    Action, ConnectionParameters, DeleteResult, Document, DocumentRecord, InsertResult, OperationTarget, UpdateResult,
};
