//! Bloom Haven Commerce - order management backend for a flower and gift shop

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use bloom_haven::http::{router, AppState};
use bloom_haven::paystack::PaystackClient;
use bloom_haven::store::PgStore;
use bloom_haven::{Config, OrderCoordinator};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let mut orders = OrderCoordinator::new(store.clone(), config.order_tx_timeout);
    if let Some(url) = &config.nats_url {
        match async_nats::connect(url.as_str()).await {
            Ok(client) => orders = orders.with_events(client),
            Err(e) => tracing::warn!(error = %e, "nats unavailable, order events disabled"),
        }
    }

    let gateway = Arc::new(PaystackClient::new(
        config.paystack_secret_key.clone(),
        config.paystack_callback_url.clone(),
        config.paystack_base_url.clone(),
    ));
    let state = AppState::new(store, orders, gateway, &config.paystack_secret_key);

    let cors = match &config.frontend_url {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>().context("FRONTEND_URL is not a valid origin")?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };
    let app = router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("Bloom Haven listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
