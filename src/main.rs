//! Courier SMS delivery service.
//!
//! Main entry point for the Courier server. Initializes all subsystems
//! and coordinates graceful startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use courier_api::{ApiState, Config};
use courier_core::{status::StatusUpdater, storage::Storage};
use courier_delivery::{DeliveryEngine, PostgresDeliveryStorage, TwilioClient};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Courier SMS delivery service");

    let config = Config::load()?;
    let server_addr = config.parse_server_addr()?;
    info!(
        database_url = %config.database_url_masked(),
        server_addr = %server_addr,
        worker_pool_size = config.worker_pool_size,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    run_migrations(&db_pool).await?;
    info!("Database migrations completed");

    let storage = Storage::new(db_pool.clone());
    let updater = StatusUpdater::new(storage.clone(), "twilio");

    // Delivery engine over the shared status updater.
    let delivery_storage = Arc::new(PostgresDeliveryStorage::new(
        Arc::new(storage.clone()),
        updater.clone(),
    ));
    let client = Arc::new(TwilioClient::new().context("Failed to build provider client")?);
    let mut engine = DeliveryEngine::new(
        delivery_storage,
        client,
        config.to_twilio_config(),
        config.to_engine_config(),
    );
    engine.start();

    // HTTP surface: webhook callbacks and health probes.
    let state = ApiState {
        storage,
        updater,
        webhook_secret: config
            .twilio_webhook_secret
            .clone()
            .or_else(|| Some(config.twilio_auth_token.clone()).filter(|s| !s.is_empty())),
        public_url: config.public_url.clone(),
    };

    let server_handle = tokio::spawn(async move {
        if let Err(e) = courier_api::start_server(state, server_addr).await {
            error!(error = %e, "Server failed");
        }
    });

    info!(addr = %server_addr, "Courier is ready");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    engine.shutdown().await;

    // Give in-flight requests time to complete.
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(30)) => {
            info!("Shutdown grace period expired");
        }
        _ = server_handle => {
            info!("Server stopped");
        }
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("Courier shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,courier=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Runs database migrations.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            workspace_id UUID NOT NULL,
            content TEXT NOT NULL,
            channel TEXT NOT NULL,
            direction TEXT NOT NULL,
            from_number TEXT NOT NULL,
            to_number TEXT NOT NULL,
            status TEXT NOT NULL,
            external_id TEXT UNIQUE,
            error_code TEXT,
            error_message TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            metadata JSONB NOT NULL DEFAULT '{}',
            next_retry_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create messages table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            message_id UUID NOT NULL UNIQUE REFERENCES messages(id),
            provider TEXT NOT NULL,
            status TEXT NOT NULL,
            external_delivery_id TEXT UNIQUE,
            attempts INTEGER NOT NULL DEFAULT 0,
            error_code TEXT,
            error_message TEXT,
            webhook_url TEXT,
            callback_status TEXT NOT NULL DEFAULT 'pending',
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create deliveries table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consents (
            phone_number TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            source TEXT,
            consent_type TEXT,
            verification_method TEXT,
            legal_basis TEXT,
            opt_in_date TIMESTAMPTZ,
            opt_out_date TIMESTAMPTZ,
            version INTEGER NOT NULL DEFAULT 1,
            audit_trail JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create consents table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_messages_claimable
        ON messages(status, next_retry_at)
        WHERE status = 'queued' AND deleted_at IS NULL
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create messages claim index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_messages_workspace
        ON messages(workspace_id, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create messages workspace index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deliveries_external
        ON deliveries(external_delivery_id)
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create deliveries external id index")?;

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
