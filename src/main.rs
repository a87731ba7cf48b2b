// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Deklaracje modułów
mod auth;
mod auth_models;
mod category_cache;
mod category_utils;
mod cms_handlers;
mod config;
mod errors;
mod extractor;
mod filters;
mod handlers;
mod middleware;
mod models;
mod pagination;
mod router;
mod services;
mod state;

use crate::config::Config;
use crate::router::{build_router, cors_layer};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Inicjalizacja systemu logowania (tracing), np. RUST_LOG=info cargo run
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Inicjalizacja serwera...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Błąd konfiguracji: {}", err);
            std::process::exit(1);
        }
    };

    // --- Połączenie z bazą danych ---
    // Ten sam limit czasu dla pobrania połączenia i dla pojedynczego zapytania
    let statement_timeout_ms = config.db_timeout.as_millis();
    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = {}", statement_timeout_ms))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Pomyślnie połączono z bazą danych");
            pool
        }
        Err(err) => {
            tracing::error!("Nie można połączyć z bazą danych: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Błąd migracji bazy danych: {:?}", err);
        std::process::exit(1);
    }

    let cors = match cors_layer(config.cors_allowed_origin.as_deref()) {
        Ok(cors) => cors,
        Err(err) => {
            tracing::error!("Nieprawidłowy CORS_ALLOWED_ORIGIN: {}", err);
            std::process::exit(1);
        }
    };

    // Cache kategorii tworzony raz i przekazywany handlerom przez stan
    let app_state = Arc::new(AppState::new(
        pool,
        config.jwt_secret,
        config.jwt_expiration_hours,
        config.category_cache_ttl,
    ));
    tracing::info!(
        "Cache kategorii aktywny (TTL: {}s)",
        config.category_cache_ttl.as_secs()
    );

    let app = build_router(app_state, cors);

    // Nasłuchuj na wszystkich interfejsach
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Serwer nasłuchuje na {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Nie można powiązać adresu {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Błąd serwera: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Nie można nasłuchiwać sygnału zamknięcia: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Otrzymano sygnał zamknięcia, kończenie pracy serwera");
}
