use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::controller::{CopyError, PageController, PageView};

async fn status() -> &'static str {
    "ok"
}

async fn page(State(controller): State<Arc<PageController>>) -> Json<PageView> {
    Json(controller.view())
}

async fn fetch_token(State(controller): State<Arc<PageController>>) -> Json<PageView> {
    controller.fetch_token().await;
    Json(controller.view())
}

async fn copy_token(
    State(controller): State<Arc<PageController>>,
) -> Result<Json<PageView>, StatusCode> {
    match controller.copy_token() {
        Ok(()) => Ok(Json(controller.view())),
        Err(CopyError::NoToken) => Err(StatusCode::CONFLICT),
        Err(error) => {
            tracing::error!(%error, "Copy to clipboard failed.");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn app(controller: Arc<PageController>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/page", get(page))
        .route("/token", post(fetch_token))
        .route("/token/copy", post(copy_token))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

pub async fn serve(port: Option<u16>, controller: Arc<PageController>) -> anyhow::Result<()> {
    let port: u16 = if let Some(port) = port {
        port
    } else if let Ok(port) = std::env::var("PORT") {
        port.parse()?
    } else {
        8080
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app(controller)).await?;

    Ok(())
}
