mod config;
mod students;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use cr_chain_client::WalletProvider;
use cr_chain_evm::EvmWallet;
use cr_registry_core::{Bootstrapper, ViewController};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub(crate) struct AppState {
    pub(crate) controller: ViewController,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;

    let wallet = match config.private_key.as_deref() {
        Some(key) => Some(EvmWallet::from_private_key(Some(config.rpc_url.clone()), key)?),
        None => {
            warn!("REGISTRY_PRIVATE_KEY not set; running without a wallet");
            None
        }
    };

    let controller = ViewController::new(
        Bootstrapper::new(config.contract_address.clone()),
        config.confirmations,
    );
    let state = Arc::new(AppState { controller });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("registry-service listening on {}", config.bind_addr);

    // The node may be slow to answer; /connection reports `connecting` meanwhile.
    spawn_bootstrap(state.clone(), wallet);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_bootstrap<W>(state: Arc<AppState>, wallet: Option<W>) -> JoinHandle<()>
where
    W: WalletProvider + 'static,
{
    tokio::spawn(async move {
        let connection = state
            .controller
            .mount(wallet.as_ref().map(|wallet| wallet as &dyn WalletProvider))
            .await;
        info!("connection state after bootstrap: {:?}", connection);
    })
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/connection", get(students::connection))
        .route("/view", get(students::view))
        .route("/form", put(students::edit_form))
        .route("/students/register", post(students::register_student))
        .route("/students/{id}", delete(students::remove_student))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
    }
    info!("shutting down");
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "registry-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "registry-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}
