use crate::web::api::{detect_handler, AppState};
use crate::web::assets::{index_handler, static_handler};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/detect", post(detect_handler))
        .route("/*path", get(static_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds to `host:port`, moving up one port at a time while the address is taken.
fn bind_first_free(host: IpAddr, port: u16) -> Result<TcpListener> {
    let mut current_port = port;
    loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Must be non-blocking before handing it to Tokio
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("No available ports found"))?;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to bind to {}", addr)),
        }
    }
}

pub async fn run_server(
    host: IpAddr,
    port: u16,
    state: Arc<AppState>,
    max_upload_bytes: usize,
) -> Result<()> {
    let listener = bind_first_free(host, port)?;
    let app = build_router(state, max_upload_bytes);

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Pothole detection server started on http://{}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
