use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_provider_mock::MockProvider;
use chat_server::{router, spawn_quota_janitor, AppState, ChatGate, SharedSecretVerifier};
use chatwire::{logging, ServerConfig};
use session_store::{InMemoryMessageStore, JsonlMessageStore, MessageStore};

const QUOTA_JANITOR_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = ServerConfig::from_env().map_err(io::Error::other)?;
    logging::init(&config.log_filter);

    let store: Arc<dyn MessageStore> = match config.store_dir.as_ref() {
        Some(root) => Arc::new(JsonlMessageStore::open(root).map_err(io::Error::other)?),
        None => {
            tracing::warn!("CHATWIRE_STORE_DIR unset; sessions are kept in memory only");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let mut gate = ChatGate::new(Arc::new(MockProvider::default()), store)
        .with_settings(config.gate_settings());
    let profile = gate.provider_profile();
    tracing::info!(
        provider = %profile.provider_id,
        model = %profile.model_id,
        "model provider ready"
    );
    if let Some(token) = config.api_token.as_deref() {
        gate = gate.with_verifier(Arc::new(SharedSecretVerifier::new(token)));
    }

    let state = AppState::new(gate);
    let janitor = spawn_quota_janitor(Arc::clone(&state.gate), QUOTA_JANITOR_INTERVAL);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, store = ?config.store_dir, "chatwire server listening");

    let served = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    janitor.abort();
    served
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
