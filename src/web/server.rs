//! Web server using Axum.

use std::io::ErrorKind;
use tokio::net::TcpListener;

use super::router::create_app_router;
use super::state::AppState;
use crate::config::WebSettings;
use crate::error::{Error, Result};

/// Bind the HTTP listener. Host names such as `localhost` are resolved.
pub async fn bind(settings: &WebSettings) -> Result<TcpListener> {
    TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => Error::Web(format!("Port {} already in use", settings.port)),
            _ => Error::Web(format!(
                "Failed to bind {}:{}: {}",
                settings.host, settings.port, e
            )),
        })
}

/// Serve the operator page and submission endpoint until shutdown is
/// signalled through the state's process control.
pub async fn run_web_server(listener: TcpListener, state: AppState) -> Result<()> {
    let control = state.control.clone();
    let app = create_app_router(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Web UI: http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = control.wait().await;
            tracing::info!("Web server stopping: {}", reason);
        })
        .await?;

    Ok(())
}
