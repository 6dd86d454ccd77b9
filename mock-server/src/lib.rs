//! In-memory stand-in for a DocumentDB HTTP data API.
//!
//! Serves `POST /data/v1/action/{action}` for the eight CRUD actions plus
//! `GET /health`, with Basic authentication against one configured user.

pub mod query;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub use query::Document;

pub const DEFAULT_USERNAME: &str = "testuser";
pub const DEFAULT_PASSWORD: &str = "testpass";

/// Collections keyed by (database, collection), documents in insertion order.
pub type Db = Arc<RwLock<HashMap<(String, String), Vec<Document>>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    credentials: Arc<(String, String)>,
}

/// Body shared by every action; each handler reads the fields it needs.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub database: String,
    pub collection: String,
    pub document: Option<Document>,
    pub documents: Option<Vec<Document>>,
    pub filter: Option<Document>,
    pub update: Option<Document>,
    pub pipeline: Option<Vec<Document>>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl ActionRequest {
    fn key(&self) -> (String, String) {
        (self.database.clone(), self.collection.clone())
    }

    fn filter(&self) -> Document {
        self.filter.clone().unwrap_or_default()
    }
}

/// An error response: `{"error": message}` with the given status.
#[derive(Debug)]
pub struct ApiFailure(StatusCode, String);

impl ApiFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.0, error = %self.1, "action failed");
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ActionResult = Result<Json<Value>, ApiFailure>;

/// Router accepting the default test credentials.
pub fn app() -> Router {
    app_with_credentials(DEFAULT_USERNAME, DEFAULT_PASSWORD)
}

pub fn app_with_credentials(username: &str, password: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(HashMap::new())),
        credentials: Arc::new((username.to_string(), password.to_string())),
    };
    Router::new()
        .route("/health", get(health))
        .route("/data/v1/action/insertOne", post(insert_one))
        .route("/data/v1/action/insertMany", post(insert_many))
        .route("/data/v1/action/find", post(find))
        .route("/data/v1/action/aggregate", post(aggregate))
        .route("/data/v1/action/updateOne", post(update_one))
        .route("/data/v1/action/updateMany", post(update_many))
        .route("/data/v1/action/deleteOne", post(delete_one))
        .route("/data/v1/action/deleteMany", post(delete_many))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    let unauthorized = || ApiFailure(StatusCode::UNAUTHORIZED, "Unauthorized".to_string());

    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or_else(unauthorized)?;
    let decoded = STANDARD.decode(encoded).map_err(|_| unauthorized())?;
    let decoded = String::from_utf8(decoded).map_err(|_| unauthorized())?;
    let (user, pass) = decoded.split_once(':').ok_or_else(unauthorized)?;

    let (expected_user, expected_pass) = state.credentials.as_ref();
    if user == expected_user && pass == expected_pass {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

/// Give `doc` a 24-hex `_id` if it has none; return the id as text.
fn assign_id(doc: &mut Document) -> String {
    match doc.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Object(envelope)) if envelope.contains_key("$oid") => {
            envelope["$oid"].as_str().unwrap_or_default().to_string()
        }
        Some(other) => other.to_string(),
        None => {
            let id = Uuid::new_v4().simple().to_string()[..24].to_string();
            doc.insert("_id".to_string(), Value::String(id.clone()));
            id
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "DocumentDB API server is running" }))
}

async fn insert_one(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let mut document = req.document.clone().ok_or_else(|| ApiFailure::bad_request("document is required"))?;
    let id = assign_id(&mut document);

    state.db.write().await.entry(req.key()).or_default().push(document);
    Ok(Json(json!({ "insertedId": id, "insertedCount": 1 })))
}

async fn insert_many(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let mut documents = req.documents.clone().ok_or_else(|| ApiFailure::bad_request("documents is required"))?;
    let ids: Vec<String> = documents.iter_mut().map(assign_id).collect();

    state.db.write().await.entry(req.key()).or_default().extend(documents);
    Ok(Json(json!({ "insertedIds": ids, "insertedCount": ids.len() })))
}

async fn find(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let filter = req.filter();
    let db = state.db.read().await;

    let mut documents = Vec::new();
    for doc in db.get(&req.key()).into_iter().flatten() {
        if query::matches(doc, &filter).map_err(ApiFailure::bad_request)? {
            documents.push(doc.clone());
        }
    }
    let skip = req.skip.unwrap_or(0) as usize;
    // A zero or absent limit means no limit.
    let limit = req.limit.filter(|&n| n > 0).map_or(usize::MAX, |n| n as usize);
    let documents: Vec<Document> = documents.into_iter().skip(skip).take(limit).collect();

    Ok(Json(json!({ "documents": documents })))
}

async fn aggregate(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let pipeline = req.pipeline.clone().ok_or_else(|| ApiFailure::bad_request("pipeline is required"))?;
    let docs = state.db.read().await.get(&req.key()).cloned().unwrap_or_default();

    let documents = query::run_pipeline(docs, &pipeline).map_err(ApiFailure::bad_request)?;
    Ok(Json(json!({ "documents": documents })))
}

async fn update_one(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let (matched, modified) = update(&state, &req, false).await?;
    Ok(Json(json!({ "matchedCount": matched, "modifiedCount": modified, "upsertedId": null })))
}

async fn update_many(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let (matched, modified) = update(&state, &req, true).await?;
    Ok(Json(json!({ "matchedCount": matched, "modifiedCount": modified })))
}

async fn update(state: &AppState, req: &ActionRequest, many: bool) -> Result<(u64, u64), ApiFailure> {
    let update = req.update.clone().ok_or_else(|| ApiFailure::bad_request("update is required"))?;
    let filter = req.filter();
    let mut db = state.db.write().await;
    let Some(docs) = db.get_mut(&req.key()) else {
        return Ok((0, 0));
    };

    let (mut matched, mut modified) = (0, 0);
    for doc in docs.iter_mut() {
        if !query::matches(doc, &filter).map_err(ApiFailure::bad_request)? {
            continue;
        }
        matched += 1;
        if query::apply_update(doc, &update).map_err(ApiFailure::bad_request)? {
            modified += 1;
        }
        if !many {
            break;
        }
    }
    Ok((matched, modified))
}

async fn delete_one(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let deleted = delete(&state, &req, false).await?;
    Ok(Json(json!({ "deletedCount": deleted })))
}

async fn delete_many(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ActionRequest>) -> ActionResult {
    authorize(&state, &headers)?;
    let deleted = delete(&state, &req, true).await?;
    Ok(Json(json!({ "deletedCount": deleted })))
}

async fn delete(state: &AppState, req: &ActionRequest, many: bool) -> Result<u64, ApiFailure> {
    let filter = req.filter();
    let mut db = state.db.write().await;
    let Some(docs) = db.get_mut(&req.key()) else {
        return Ok(0);
    };

    let mut hits = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        if query::matches(doc, &filter).map_err(ApiFailure::bad_request)? {
            hits.push(i);
            if !many {
                break;
            }
        }
    }
    for &i in hits.iter().rev() {
        docs.remove(i);
    }
    Ok(hits.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_id_generates_24_hex_chars() {
        let mut doc = Document::new();
        let id = assign_id(&mut doc);
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(doc["_id"], Value::String(id));
    }

    #[test]
    fn assign_id_keeps_existing_ids() {
        let mut doc = json!({"_id": "mine"}).as_object().unwrap().clone();
        assert_eq!(assign_id(&mut doc), "mine");

        let mut doc = json!({"_id": {"$oid": "abc"}}).as_object().unwrap().clone();
        assert_eq!(assign_id(&mut doc), "abc");
    }

    #[test]
    fn action_request_optional_fields_default_to_none() {
        let req: ActionRequest = serde_json::from_str(r#"{"database":"d","collection":"c"}"#).unwrap();
        assert!(req.filter.is_none());
        assert!(req.limit.is_none());
        assert!(req.filter().is_empty());
    }

    #[tokio::test]
    async fn update_on_unknown_collection_creates_nothing() {
        let state = AppState {
            db: Db::default(),
            credentials: Arc::new((DEFAULT_USERNAME.to_string(), DEFAULT_PASSWORD.to_string())),
        };
        let req: ActionRequest =
            serde_json::from_value(json!({"database": "d", "collection": "ghost", "update": {"$set": {"a": 1}}}))
                .unwrap();

        assert_eq!(update(&state, &req, true).await.unwrap(), (0, 0));
        assert!(state.db.read().await.is_empty());
    }

    #[test]
    fn action_request_rejects_missing_collection() {
        let result: Result<ActionRequest, _> = serde_json::from_str(r#"{"database":"d"}"#);
        assert!(result.is_err());
    }
}
