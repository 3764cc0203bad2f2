//! Takeout FOH - conversational DSCR lead capture
//!
//! A front-of-house chat service: per-session turn loops around a hosted
//! completion backend, with finished transcripts handed off to a lead sink.

mod api;
mod config;
mod conversation;
mod instruction;
mod lead;
mod lead_extractor;
mod llm;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::AppConfig;
use instruction::SystemInstruction;
use lead::LoggingLeadSink;
use llm::{AnthropicGateway, CompletionGateway, LoggingGateway};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "takeout_foh=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    let api_key = config
        .anthropic_api_key
        .clone()
        .ok_or("ANTHROPIC_API_KEY environment variable is required")?;

    let instruction = Arc::new(SystemInstruction::load(
        config.instruction_path.as_deref(),
        config.greeting.clone(),
    )?);

    let gateway: Arc<dyn CompletionGateway> = Arc::new(LoggingGateway::new(Arc::new(
        AnthropicGateway::new(api_key, config.model.clone(), config.base_url.as_deref()),
    )));

    tracing::info!(
        model = %config.model,
        delivery = ?config.delivery,
        "completion gateway initialized"
    );

    let sessions = Arc::new(SessionManager::new(
        gateway,
        Arc::new(LoggingLeadSink),
        instruction,
        config.delivery,
        config.max_tokens,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(sessions)).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Takeout FOH listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
