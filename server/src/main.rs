use std::{net::SocketAddr, sync::Arc};

use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tracing::{info, warn};

use server::config::ServerConfig;
use server::{router, AppState};
use tts_core::{ElevenLabsClient, ElevenLabsConfig, SpeechProvider, VoiceDesignProvider};
use voice_store::{MemoryVoiceStore, PostgrestConfig, PostgrestVoiceStore, VoiceStore};

// Largest JSON body accepted; speech text is capped at 5000 characters.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice studio server...");

    // Load configuration from environment
    let config = ServerConfig::from_env();

    let api_key = config
        .elevenlabs_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ELEVENLABS_API_KEY is not set"))?;
    let mut provider_config = ElevenLabsConfig::new(api_key);
    if let Some(base_url) = &config.elevenlabs_base_url {
        provider_config = provider_config.with_base_url(base_url.clone());
    }
    if let Some(model_id) = &config.elevenlabs_model_id {
        provider_config = provider_config.with_model(model_id.clone());
    }
    let client = Arc::new(
        ElevenLabsClient::new(provider_config)
            .map_err(|e| anyhow::anyhow!("Failed to create ElevenLabs client: {e}"))?,
    );
    info!(
        "ElevenLabs client ready (model {}, format {})",
        client.model_id(),
        client.output_format()
    );

    let store: Arc<dyn VoiceStore> = match config.supabase() {
        Some((url, key)) => {
            info!("Using Supabase voice store at {}", url);
            Arc::new(
                PostgrestVoiceStore::new(PostgrestConfig::new(url, key))
                    .map_err(|e| anyhow::anyhow!("Failed to create Supabase store: {e}"))?,
            )
        }
        None => {
            warn!("SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY not set, voices are kept in memory only");
            Arc::new(MemoryVoiceStore::new())
        }
    };

    let speech: Arc<dyn SpeechProvider> = client.clone();
    let designer: Arc<dyn VoiceDesignProvider> = client;
    let state = AppState::new(config.clone(), speech, designer, store);
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, stream_timeout={:?}, relay_capacity={}",
        config.port,
        config.rate_limit_per_minute,
        config.stream_timeout(),
        config.relay_channel_capacity
    );

    let allowed_methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    // CORS configuration - environment-aware
    let cors = match &config.cors_allowed_origins {
        Some(allowed_origins) => {
            let origins: Vec<HeaderValue> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect();
            if origins.is_empty() {
                warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
                CorsLayer::new().allow_origin(Any)
            } else {
                info!("CORS configured for {} origin(s)", origins.len());
                CorsLayer::new().allow_origin(AllowOrigin::list(origins))
            }
        }
        None => {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
            CorsLayer::new().allow_origin(Any)
        }
    }
    .allow_methods(allowed_methods)
    .allow_headers(Any)
    .allow_credentials(false);

    // One global bucket: client IPs are unreliable behind proxies.
    // Replenish one request every 60s / limit, bursting up to the whole minute's quota.
    let rate = config.rate_limit();
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit_interval_ms())
            .burst_size(rate)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", rate);

    // The timeout covers handlers up to the response head, not streamed bodies.
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(MapResponseBodyLayer::new(axum::body::Body::new))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .into_inner();

    let app = router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
