mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use crate::db::{db::{DBClient, MarketStore}, memorydb::MemoryStore};
use service::{
    agreement_service::AgreementService,
    chat_service::ChatService,
    events::{BroadcastPublisher, EventPublisher},
    provider_status::ProviderStatusService,
    quote_service::QuoteService,
    request_service::RequestService,
    workflow_service::WorkflowService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub store: Arc<dyn MarketStore>,
    // Services
    pub request_service: Arc<RequestService>,
    pub provider_status_service: Arc<ProviderStatusService>,
    pub quote_service: Arc<QuoteService>,
    pub agreement_service: Arc<AgreementService>,
    pub workflow_service: Arc<WorkflowService>,
    pub chat_service: Arc<ChatService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MarketStore>) -> Self {
        let events: Arc<dyn EventPublisher> =
            Arc::new(BroadcastPublisher::new(config.event_channel_capacity));

        Self {
            request_service: Arc::new(RequestService::new(store.clone(), events.clone())),
            provider_status_service: Arc::new(ProviderStatusService::new(store.clone())),
            quote_service: Arc::new(QuoteService::new(store.clone(), events.clone())),
            agreement_service: Arc::new(AgreementService::new(store.clone(), events.clone())),
            workflow_service: Arc::new(WorkflowService::new(store.clone(), events)),
            chat_service: Arc::new(ChatService::new(store.clone())),
            env: config,
            store,
        }
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn MarketStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, running on the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await?;
    tracing::info!("Connection to the database is successful");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied");

    Ok(Arc::new(DBClient::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();
    let store = connect_store(&config).await?;

    let allowed_origins = vec![
        HeaderValue::from_static("http://localhost:5173"),
        HeaderValue::from_static("http://localhost:8000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(config.clone(), store));

    let app = create_router(app_state.clone()).layer(cors);

    // Start background jobs
    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_quote_expiry_job(app_state_clone).await;
    });

    tracing::info!(
        "Server is running on http://localhost:{} ({} store)",
        config.port,
        app_state.store.backend()
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
