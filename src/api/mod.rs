//! HTTP interface over the application context.
//!
//! Reads return registry snapshots; mutations go through [`App`] so that the
//! monitoring engine follows every change.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use tokio::net::ToSocketAddrs;

use crate::app::App;
use crate::node::{Node, NodeId, NodePatch};
use crate::probe::Prober;
use crate::registry::TreeNode;

mod error;
mod models;

pub use error::ApiError;
pub use models::{Created, CreateNode, MoveNode, Removed};

type Result<T> = std::result::Result<T, ApiError>;

pub fn router<P: Prober>(app: Arc<App<P>>) -> Router {
    Router::new()
        .route("/nodes", get(list_tree::<P>).post(create_node::<P>))
        .route(
            "/nodes/{id}",
            get(get_node::<P>)
                .patch(update_node::<P>)
                .delete(remove_node::<P>),
        )
        .route("/nodes/{id}/parent", put(move_node::<P>))
        .route("/devices", get(list_devices::<P>))
        .with_state(app)
}

/// Serves the API on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot be bound or the server fails.
pub async fn serve<P: Prober>(
    app: Arc<App<P>>,
    addr: impl ToSocketAddrs,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(app).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

fn parse_id(raw: &str) -> Result<NodeId> {
    Ok(NodeId::new(raw)?)
}

async fn list_tree<P: Prober>(State(app): State<Arc<App<P>>>) -> Json<Vec<TreeNode>> {
    Json(app.registry().tree())
}

async fn list_devices<P: Prober>(State(app): State<Arc<App<P>>>) -> Json<Vec<Node>> {
    Json(app.registry().list_devices())
}

async fn get_node<P: Prober>(
    State(app): State<Arc<App<P>>>,
    Path(id): Path<String>,
) -> Result<Json<Node>> {
    let id = parse_id(&id)?;
    Ok(Json(app.registry().get(&id)?))
}

async fn create_node<P: Prober>(
    State(app): State<Arc<App<P>>>,
    request: std::result::Result<Json<CreateNode>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>)> {
    let Json(request) = request?;
    let (node, parent_id) = request.into_parts();
    let id = app.add_node(node, parent_id.as_ref()).await?;
    log::info!(target: "api", "created node `{}`", id);
    Ok((StatusCode::CREATED, Json(Created { id })))
}

async fn update_node<P: Prober>(
    State(app): State<Arc<App<P>>>,
    Path(id): Path<String>,
    patch: std::result::Result<Json<NodePatch>, JsonRejection>,
) -> Result<Json<Node>> {
    let id = parse_id(&id)?;
    let Json(patch) = patch?;
    Ok(Json(app.update_node(&id, patch).await?))
}

async fn move_node<P: Prober>(
    State(app): State<Arc<App<P>>>,
    Path(id): Path<String>,
    request: std::result::Result<Json<MoveNode>, JsonRejection>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    let Json(request) = request?;
    app.move_node(&id, request.parent_id.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_node<P: Prober>(
    State(app): State<Arc<App<P>>>,
    Path(id): Path<String>,
) -> Result<Json<Removed>> {
    let id = parse_id(&id)?;
    let removed = app.remove_node(&id).await?;
    log::info!(target: "api", "removed {} nodes below `{}`", removed.len(), id);
    Ok(Json(Removed { removed }))
}
