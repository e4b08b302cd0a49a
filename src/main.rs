use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use labelops::app_state::AppState;
use labelops::config::AppConfig;
use labelops::db::{self, memory::MemoryStore, PgStore};
use labelops::routes;
use labelops::services::audit::AuditStore;
use labelops::services::printer::build_bridge;
use labelops::services::store::{JobStore, LabelStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing labelops server");

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    let (labels, jobs, audit): (Arc<dyn LabelStore>, Arc<dyn JobStore>, Arc<dyn AuditStore>) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to PostgreSQL database");
                let pool = db::init_pool(url)
                    .await
                    .expect("Failed to connect to database");

                tracing::info!("Running database migrations");
                db::run_migrations(&pool)
                    .await
                    .expect("Failed to run database migrations");

                let store = Arc::new(PgStore::new(pool));
                (
                    store.clone() as Arc<dyn LabelStore>,
                    store.clone() as Arc<dyn JobStore>,
                    store as Arc<dyn AuditStore>,
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; labels and print jobs are kept in memory only");
                let store = Arc::new(MemoryStore::new());
                (
                    store.clone() as Arc<dyn LabelStore>,
                    store.clone() as Arc<dyn JobStore>,
                    store as Arc<dyn AuditStore>,
                )
            }
        };

    let bridge = build_bridge(&config).expect("Invalid printer configuration");
    tracing::info!(backend = bridge.backend(), "Printer bridge ready");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, labels, jobs, audit, bridge);
    let app = routes::build_router(state, Some(Arc::new(prometheus_handle)));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
