mod configuration;
mod error;
mod routes;
mod state;

use autoclaims::chat::InsuranceChatAgent;
use autoclaims::config::{load_config, Settings};
use autoclaims::key_manager::{KeyRetrievalStrategy, Secrets};
use configuration::ServerSettings;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(None)?;
    let settings = Settings::from_config(&config)?;
    let server = ServerSettings::from_config(&config)?;

    // Model serving passes credentials through the environment
    let secrets = Secrets::load(KeyRetrievalStrategy::EnvironmentOnly, &settings.provider)?;
    let mut agent = InsuranceChatAgent::from_settings(&settings, &secrets)?;
    if let Some(store) = server.context_store() {
        info!(capacity = server.conversation_capacity, "conversation memory enabled");
        agent = agent.with_context_store(store);
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state::AppState::new(agent))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(server.socket_addr()?).await?;
    info!(
        model = settings.provider.model(),
        "listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}
