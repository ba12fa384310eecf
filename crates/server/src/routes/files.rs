// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File upload/download endpoints over the file store.

use crate::error::ApiFailure;
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use runcell_core::{ApiError, Event, FileEntry, FileId, RequestId, SessionId};
use serde::Serialize;

fn svc(request_id: RequestId) -> impl Fn(runcell_store::StoreError) -> ApiFailure {
    move |e| {
        ApiFailure::new(
            ApiError::unavailable("File Storage", format!("File store error: {e}")),
            request_id,
        )
    }
}

#[derive(Serialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub files: Vec<UploadedFile>,
}

/// `POST /upload` — multipart upload. An optional `session_id` text field
/// targets an existing session; otherwise a new session is created.
pub async fn upload(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiFailure> {
    let mut session_id: Option<SessionId> = None;
    let mut pending: Vec<(String, String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiFailure::new(
            ApiError::validation(format!("Malformed multipart body: {e}")),
            request_id,
        )
    })? {
        if field.name() == Some("session_id") {
            let value = field.text().await.unwrap_or_default();
            if !value.is_empty() {
                session_id = Some(SessionId::from_string(&value));
            }
            continue;
        }

        let Some(filename) = field.file_name().map(str::to_string) else { continue };
        if filename.is_empty() {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field.bytes().await.map_err(|e| {
            ApiFailure::new(
                ApiError::validation(format!("Failed to read upload: {e}")),
                request_id,
            )
        })?;
        pending.push((filename, content_type, bytes.to_vec()));
    }

    if pending.is_empty() {
        return Err(ApiFailure::new(
            ApiError::validation_field(
                "No files in upload",
                "files",
                "At least one file part is required",
                "no_files",
            ),
            request_id,
        ));
    }

    // Resolve or create the owning session.
    let sid = match session_id {
        Some(sid) => match app.sessions.get(&sid).await.map_err(svc(request_id))? {
            Some(session) if session.is_active() => sid,
            _ => {
                return Err(ApiFailure::new(
                    ApiError::not_found("Session", sid.to_string()),
                    request_id,
                ))
            }
        },
        None => {
            let session = app
                .sessions
                .create(Default::default())
                .await
                .map_err(svc(request_id))?;
            app.bus
                .publish(Event::SessionCreated {
                    session_id: session.session_id,
                    entity_id: None,
                    user_id: None,
                })
                .await;
            session.session_id
        }
    };

    let mut uploaded = Vec::new();
    for (filename, content_type, bytes) in pending {
        let size = bytes.len() as u64;
        let file_id = app
            .files
            .store_uploaded_file(&sid, &filename, bytes, Some(&content_type))
            .await
            .map_err(svc(request_id))?;
        app.bus
            .publish(Event::FileUploaded {
                file_id,
                session_id: sid,
                filename: filename.clone(),
            })
            .await;
        uploaded.push(UploadedFile {
            file_id: file_id.to_string(),
            filename,
            size,
            content_type,
        });
    }

    Ok(Json(UploadResponse { session_id: sid.to_string(), files: uploaded }))
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
    pub total_count: usize,
    pub total_size: u64,
}

pub async fn list(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
) -> Result<Json<FileListResponse>, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    let files = app.files.list(&sid).await.map_err(svc(request_id))?;
    let total_size = files.iter().map(|f| f.size).sum();
    Ok(Json(FileListResponse { total_count: files.len(), total_size, files }))
}

pub async fn content(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<Response, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    let fid = FileId::from_string(&file_id);

    let Some(entry) = app.files.entry(&sid, &fid).await.map_err(svc(request_id))? else {
        return Err(ApiFailure::new(ApiError::not_found("File", file_id), request_id));
    };
    let Some(bytes) = app.files.content(&sid, &fid).await.map_err(svc(request_id))? else {
        return Err(ApiFailure::new(ApiError::not_found("File", file_id), request_id));
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, entry.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", entry.filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn download_url(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    let fid = FileId::from_string(&file_id);

    let Some(url) = app.files.download_url(&sid, &fid).await.map_err(svc(request_id))? else {
        return Err(ApiFailure::new(ApiError::not_found("File", file_id), request_id));
    };
    Ok(Json(serde_json::json!({
        "file_id": file_id,
        "download_url": url,
    })))
}

pub async fn delete(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    let fid = FileId::from_string(&file_id);

    if !app.files.delete(&sid, &fid).await.map_err(svc(request_id))? {
        return Err(ApiFailure::new(ApiError::not_found("File", file_id), request_id));
    }
    app.bus.publish(Event::FileDeleted { file_id: fid, session_id: sid }).await;
    Ok(StatusCode::NO_CONTENT)
}
