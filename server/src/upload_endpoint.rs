use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gpx_routes_data_management::DataManagerError;
use gpx_routes_lib::tag::split_tag_input;
use serde_json::json;

use crate::server_state::ServerState;
use crate::views::{BulkUploadView, RouteView};

// GPX exports from watches can get big, but not this big.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Single-file upload: multipart form with `gpx_file`, optional `name` and
/// optional comma-separated `tags`.
pub async fn upload(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut name: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("Rejecting unreadable multipart request: {err}");
                return bad_request("could not read multipart body");
            }
        };

        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "gpx_file" => {
                let file_name = field.file_name().unwrap_or("upload.gpx").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, bytes.to_vec())),
                    Err(err) => {
                        tracing::warn!("Failed to read uploaded file: {err}");
                        return bad_request("could not read uploaded file");
                    }
                }
            }
            "name" => {
                name = field.text().await.ok().filter(|text| !text.trim().is_empty());
            }
            "tags" => {
                if let Ok(text) = field.text().await {
                    tags = split_tag_input(&text);
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return bad_request("missing gpx_file field");
    };

    match state
        .data_manager
        .ingest_upload(&file_name, &bytes, name, &tags)
        .await
    {
        Ok(route) => {
            enqueue_enrichment(&state, route.route_id).await;
            (StatusCode::CREATED, Json(RouteView::from_route(&route))).into_response()
        }
        Err(err) => ingest_failure_response(err),
    }
}

/// Bulk upload: any number of `gpx_files` fields plus optional
/// `default_tags` applied to every file. Files succeed and fail
/// independently; the response is the end-of-batch summary.
pub async fn bulk_upload(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Response {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut default_tags: Vec<String> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("Rejecting unreadable multipart request: {err}");
                return bad_request("could not read multipart body");
            }
        };

        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "gpx_files" => {
                let file_name = field.file_name().unwrap_or("upload.gpx").to_string();
                match field.bytes().await {
                    Ok(bytes) => files.push((file_name, bytes.to_vec())),
                    Err(err) => {
                        tracing::warn!("Failed to read uploaded file {file_name}: {err}");
                        return bad_request("could not read uploaded file");
                    }
                }
            }
            "default_tags" => {
                if let Ok(text) = field.text().await {
                    default_tags = split_tag_input(&text);
                }
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return bad_request("no gpx_files in request");
    }

    let summary = state.data_manager.ingest_many(files, &default_tags).await;

    for route in &summary.uploaded {
        enqueue_enrichment(&state, route.route_id).await;
    }

    Json(BulkUploadView::from_summary(&summary)).into_response()
}

async fn enqueue_enrichment(state: &ServerState, route_id: i64) {
    // A closed queue is not fatal: the processed flag gets the route picked
    // up again on the next start.
    if state.job_tx.send(route_id).await.is_err() {
        tracing::warn!("Enrichment queue is closed, route {route_id} deferred to next start");
    }
}

fn ingest_failure_response(err: DataManagerError) -> Response {
    match err {
        DataManagerError::Ingest(track_err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": track_err.to_string() })),
        )
            .into_response(),
        other => {
            tracing::error!("Upload failed: {other:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn bad_request(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
}
