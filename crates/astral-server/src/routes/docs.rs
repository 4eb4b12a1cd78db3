use astral_api::{ApiError, ApiResponse};
use astral_cache::{Document, DocumentId, NewDocument, ResolvedIdentity, SyncRequest};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::{format_description::BorrowedFormatItem, macros::format_description};

use super::json_body;
use crate::error::store_error;
use crate::state::{AppState, caller_token};

const CREATED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocsQuery {
    pub token: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadMeta {
    pub name: String,
    pub file: bool,
    pub public: bool,
    pub token: String,
    pub mime: String,
    pub grant: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadFile {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub meta: UploadMeta,
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub file: UploadFile,
}

/// One entry of a document listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocResponse {
    pub id: i64,
    pub name: String,
    pub mime: String,
    pub file: bool,
    pub public: bool,
    pub created: String,
    pub grant: Vec<String>,
}

impl DocResponse {
    fn from_document(doc: Document) -> Result<Self, ApiError> {
        let created = doc
            .created
            .format(CREATED_FORMAT)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(Self {
            id: doc.id.0,
            name: doc.filename,
            mime: doc.mime,
            file: true,
            public: doc.public,
            created,
            grant: doc.grant,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(0);
    };
    let limit: i64 = raw.parse().map_err(|e| {
        ApiError::bad_request(format!("Limit parameter must be integer. Error: {e}"))
    })?;
    // Non-positive limits mean "no limit".
    Ok(usize::try_from(limit).unwrap_or(0))
}

fn parse_document_id(raw: &str) -> Result<DocumentId, ApiError> {
    raw.parse::<i64>().map(DocumentId).map_err(|e| {
        ApiError::bad_request(format!("Doc id parameter must be integer. Error: {e}"))
    })
}

fn can_read(doc: &Document, identity: &ResolvedIdentity) -> bool {
    doc.public || doc.owner == identity.user_id || doc.is_granted_to(identity.user_id)
}

/// Resolve the caller and the document they may read.
fn readable_document(
    state: &AppState,
    query: &DocsQuery,
    headers: &HeaderMap,
    raw_id: &str,
) -> Result<Document, ApiError> {
    let identity = state.identity(&caller_token(query.token.as_deref(), headers))?;
    let id = parse_document_id(raw_id)?;

    let doc = state
        .resolver
        .lookup_document_by_id(id)
        .ok_or_else(|| ApiError::not_found("File doesn't exist"))?;
    if !can_read(&doc, &identity) {
        return Err(ApiError::forbidden(format!("Access to file {id} denied")));
    }
    Ok(doc)
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/docs`
pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let input = json_body(payload)?;
    let meta = input.meta;

    let identity = state.identity(&caller_token(Some(&meta.token), &headers))?;

    if meta.name.is_empty() {
        return Err(ApiError::bad_request("File name must not be empty"));
    }
    if state.resolver.lookup_document_by_name(&meta.name).is_some() {
        return Err(ApiError::bad_request(format!("File {} exists", meta.name)));
    }

    let data = BASE64.decode(input.file.data.as_bytes()).map_err(|e| {
        ApiError::bad_request(format!("Failed to decode string from base64. Error: {e}"))
    })?;

    // The store's filename uniqueness decides racing uploads; only the
    // winner writes content.
    let doc = state
        .store
        .create_document(NewDocument {
            filename: meta.name.clone(),
            public: meta.public,
            mime: meta.mime,
            owner: identity.user_id,
            grant: meta.grant,
        })
        .await
        .map_err(|e| {
            if e.is_conflict() {
                ApiError::bad_request(format!("File {} exists", meta.name))
            } else {
                store_error(e)
            }
        })?;

    if let Err(e) = state.blobs.put(&doc.filename, Bytes::from(data)).await {
        if let Err(store_err) = state.store.delete_document(doc.id).await {
            tracing::warn!(doc_id = %doc.id, error = %store_err, "failed to remove document without content");
        }
        return Err(e.into());
    }

    state.notifier.notify(SyncRequest::RefreshDocuments);
    tracing::info!(doc_id = %doc.id, filename = %doc.filename, owner = %doc.owner, "document stored");

    Ok(ApiResponse::data(json!({
        "json": {},
        "file": doc.filename,
    })))
}

/// `GET /api/docs`
pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DocsQuery>,
) -> Result<ApiResponse, ApiError> {
    state.identity(&caller_token(query.token.as_deref(), &headers))?;
    let limit = parse_limit(query.limit.as_deref())?;

    let docs = state
        .resolver
        .list_documents(limit)
        .into_iter()
        .map(DocResponse::from_document)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApiResponse::data(json!({ "docs": docs })))
}

/// `HEAD /api/docs`
pub async fn head_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DocsQuery>,
) -> Result<StatusCode, ApiError> {
    state.identity(&caller_token(query.token.as_deref(), &headers))?;
    parse_limit(query.limit.as_deref())?;
    Ok(StatusCode::OK)
}

/// `GET /api/docs/{id}`
pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Query(query): Query<DocsQuery>,
) -> Result<ApiResponse, ApiError> {
    let doc = readable_document(&state, &query, &headers, &raw_id)?;
    let data = state.blobs.get(&doc.filename).await?;

    Ok(ApiResponse::data(json!({
        "name": doc.filename,
        "mime": doc.mime,
        "file": BASE64.encode(&data),
    })))
}

/// `HEAD /api/docs/{id}`
pub async fn head_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Query(query): Query<DocsQuery>,
) -> Result<StatusCode, ApiError> {
    readable_document(&state, &query, &headers, &raw_id)?;
    Ok(StatusCode::OK)
}

/// `DELETE /api/docs/{id}`
///
/// Deleting a document the store does not know succeeds.
pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Query(query): Query<DocsQuery>,
) -> Result<ApiResponse, ApiError> {
    let identity = state.identity(&caller_token(query.token.as_deref(), &headers))?;
    let id = parse_document_id(&raw_id)?;

    // Ownership is checked against the store so a stale snapshot cannot
    // authorise deleting someone else's document.
    if let Some(doc) = state.store.find_document(id).await.map_err(store_error)? {
        if doc.owner != identity.user_id {
            return Err(ApiError::forbidden(format!("Access to file {id} denied")));
        }
        // Content goes first: a new upload of this filename cannot commit
        // until the metadata row below is gone.
        state.blobs.delete(&doc.filename).await?;
        state.store.delete_document(id).await.map_err(store_error)?;
        state.notifier.notify(SyncRequest::RefreshDocuments);
        tracing::info!(doc_id = %id, filename = %doc.filename, "document deleted");
    }

    let mut body = Map::new();
    body.insert(raw_id, Value::Bool(true));
    Ok(ApiResponse::response(Value::Object(body)))
}
