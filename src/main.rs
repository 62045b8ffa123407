use std::net::TcpListener;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;

use cardiolink_backend::config::settings::{get_config, StorageBackendKind};
use cardiolink_backend::run;
use cardiolink_backend::storage::Storage;
use cardiolink_backend::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Panic if we can't read the config
    let config = get_config().expect("Failed to read the config.");

    let subscriber = get_subscriber(
        "cardiolink-backend".into(),
        config.application.log_level.clone(),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let storage = match config.storage.backend {
        StorageBackendKind::Memory => {
            tracing::warn!("Using the in-memory storage backend - data will not survive a restart");
            Storage::memory()
        }
        StorageBackendKind::Postgres => {
            // Only try to establish a connection when actually used
            let pool = PgPoolOptions::new()
                .max_connections(32)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect_lazy(&config.database.connection_string().expose_secret())
                .expect("Failed to create Postgres connection pool");
            let storage = Storage::postgres(pool);
            if let Storage::Postgres(ref pg) = storage {
                if let Err(e) = pg.migrate().await {
                    tracing::error!("Failed to run database migrations: {}", e);
                    std::process::exit(1);
                }
            }
            storage
        }
    };

    let address = format!("{}:{}", config.application.host, config.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Starting server on {}", address);

    run(listener, storage)?.await
}
