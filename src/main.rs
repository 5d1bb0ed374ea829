//! Storefront order service entrypoint.

use anyhow::Result;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{self, AppState};
use storefront::external::{LogNotifier, SimulatedGateway, SimulatedTracking};
use storefront::service::{EventBus, OrderService};
use storefront::store::memory::MemoryStore;
use storefront::store::postgres::PgStore;
use storefront::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PgStore::connect(&url).await?),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo data");
            Arc::new(MemoryStore::with_demo_data())
        }
    };

    let nats = match std::env::var("NATS_URL") {
        Ok(url) => match async_nats::connect(&url).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(%err, "NATS unavailable, events disabled");
                None
            }
        },
        Err(_) => None,
    };

    let service = Arc::new(OrderService::new(
        store.clone(),
        Arc::new(LogNotifier),
        Arc::new(SimulatedTracking),
        Arc::new(SimulatedGateway),
        EventBus::new(nats),
    ));

    let app = api::router(AppState { store, service })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port = std::env::var("PORT").unwrap_or_else(|_| "8083".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("storefront listening on 0.0.0.0:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
