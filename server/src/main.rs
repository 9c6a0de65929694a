use std::{fs::OpenOptions, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use gpx_routes_data_management::{
    DataManager, DataManagerError, PLACEHOLDER_THUMBNAIL, ingest::RouteProcessor,
    render::render_placeholder,
};
use gpx_routes_lib::tag::split_tag_input;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server_state;
mod upload_endpoint;
mod views;
mod worker;

use server_state::ServerState;
use views::RouteView;

#[tokio::main]
async fn main() {
    std::fs::create_dir_all("server/log").unwrap();
    let log_file = "server/log/server.log";

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .unwrap();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();

    tracing::info!("Starting server...");

    let data_manager = DataManager::start().await.unwrap();
    ensure_placeholder(&data_manager);

    let processor = RouteProcessor::from_env().await;

    let (job_tx, job_rx) = mpsc::channel(100);
    let server_state = Arc::new(ServerState {
        data_manager: data_manager.clone(),
        job_tx,
    });

    tokio::spawn(worker::run(data_manager.clone(), processor, job_rx));

    let media_dir = data_manager.artifacts().root().to_path_buf();

    let app = Router::new()
        .route("/routes", get(get_routes))
        .route("/routes/upload", post(upload_endpoint::upload))
        .route("/routes/bulk_upload", post(upload_endpoint::bulk_upload))
        .route("/routes/{route_id}", get(get_route).delete(delete_route))
        .route("/routes/{route_id}/tags", post(add_route_tags))
        .route("/routes/{route_id}/tags/{tag_name}", delete(remove_route_tag))
        .route("/tags", get(get_tags))
        .route("/share/{token}", get(get_shared_route))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::max(upload_endpoint::MAX_UPLOAD_BYTES))
        .with_state(server_state.clone());

    let addr: SocketAddr = std::env::var("GPX_ROUTES_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .unwrap();

    // Serve TLS when certificates are configured, plain TCP otherwise.
    let cert = std::env::var("GPX_ROUTES_TLS_CERT");
    let key = std::env::var("GPX_ROUTES_TLS_KEY");

    match (cert, key) {
        (Ok(cert), Ok(key)) => {
            let config = RustlsConfig::from_pem_file(PathBuf::from(cert), PathBuf::from(key))
                .await
                .unwrap();

            tracing::info!("Listening on {} (TLS)", addr);
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await
                .unwrap();
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            tracing::info!("Listening on {}", listener.local_addr().unwrap());
            axum::serve(listener, app).await.unwrap();
        }
    }
}

fn ensure_placeholder(data_manager: &DataManager) {
    let placeholder = data_manager.artifacts().absolute(PLACEHOLDER_THUMBNAIL);
    if !placeholder.exists() {
        if let Err(err) = render_placeholder(&placeholder) {
            tracing::warn!("Failed to create placeholder thumbnail: {err:?}");
        }
    }
}

#[derive(Deserialize)]
struct RouteListParams {
    tag: Option<String>,
    search: Option<String>,
}

async fn get_routes(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RouteListParams>,
) -> Response {
    match state
        .data_manager
        .get_routes(params.tag.as_deref(), params.search.as_deref())
        .await
    {
        Ok(routes) => {
            let views: Vec<RouteView> = routes.iter().map(RouteView::from_route).collect();
            Json(views).into_response()
        }
        Err(err) => {
            tracing::error!("Failed to list routes: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_route(State(state): State<Arc<ServerState>>, Path(route_id): Path<i64>) -> Response {
    match state.data_manager.get_route(route_id).await {
        Ok(route) => Json(RouteView::from_route(&route)).into_response(),
        Err(DataManagerError::RouteNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!("Failed to get route {route_id}: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_route(
    State(state): State<Arc<ServerState>>,
    Path(route_id): Path<i64>,
) -> Response {
    match state.data_manager.delete_route(route_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(DataManagerError::RouteNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!("Failed to delete route {route_id}: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct TagInput {
    tags: String,
}

async fn add_route_tags(
    State(state): State<Arc<ServerState>>,
    Path(route_id): Path<i64>,
    Json(input): Json<TagInput>,
) -> Response {
    if let Err(err) = state.data_manager.get_route(route_id).await {
        return match err {
            DataManagerError::RouteNotFound(_) => StatusCode::NOT_FOUND.into_response(),
            err => {
                tracing::error!("Failed to get route {route_id}: {err:?}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    let names = split_tag_input(&input.tags);
    match state.data_manager.add_tags(route_id, &names).await {
        Ok(tags) => Json(tags).into_response(),
        Err(err) => {
            tracing::error!("Failed to tag route {route_id}: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn remove_route_tag(
    State(state): State<Arc<ServerState>>,
    Path((route_id, tag_name)): Path<(i64, String)>,
) -> Response {
    match state.data_manager.remove_tag(route_id, &tag_name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            tracing::error!("Failed to remove tag from route {route_id}: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_tags(State(state): State<Arc<ServerState>>) -> Response {
    match state.data_manager.get_tags().await {
        Ok(tags) => Json(tags).into_response(),
        Err(err) => {
            tracing::error!("Failed to list tags: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Public share link: read-only view of one route, no listing, no ids
/// beyond what the token already grants. An unknown token is a plain 404,
/// indistinguishable from a token that never existed.
async fn get_shared_route(
    State(state): State<Arc<ServerState>>,
    Path(token): Path<String>,
) -> Response {
    match state.data_manager.get_route_by_token(&token).await {
        Ok(Some(route)) => Json(RouteView::from_route(&route)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!("Failed to resolve share token: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
