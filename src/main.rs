use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use featuregate::config::Config;
use featuregate::db::{create_pool, queries, schema, AppState};
use featuregate::gateways::GatewayRegistry;
use featuregate::handlers;
use featuregate::models::CreateOrder;

#[derive(Parser, Debug)]
#[command(name = "featuregate")]
#[command(about = "Order and payment lifecycle engine for digital feature sales")]
struct Cli {
    /// Seed the database with dev data (a couple of pending orders)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for manual testing.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_orders(&conn).expect("Failed to count orders");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let orders = [
        CreateOrder {
            buyer_id: "buyer_dev_1".to_string(),
            feature_id: "advanced-export".to_string(),
            amount_cents: 999,
            discount_cents: 0,
            currency: "usd".to_string(),
            billing_name: Some("Dev Buyer".to_string()),
            billing_email: Some("dev@featuregate.local".to_string()),
            metadata: None,
        },
        CreateOrder {
            buyer_id: "buyer_dev_2".to_string(),
            feature_id: "cloud-sync".to_string(),
            amount_cents: 2500,
            discount_cents: 500,
            currency: "usd".to_string(),
            billing_name: None,
            billing_email: None,
            metadata: Some(r#"{"campaign":"launch"}"#.to_string()),
        },
    ];

    for input in &orders {
        let order = queries::create_order(&conn, input).expect("Failed to create dev order");
        tracing::info!(
            "Order: {} ({} {} for {})",
            order.id,
            order.final_cents,
            order.currency,
            order.feature_id
        );
    }

    tracing::info!("============================================");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "featuregate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        schema::init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        schema::init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let gateways = GatewayRegistry::from_config(&config);
    for (name, configured) in [
        ("stripe", gateways.stripe.is_some()),
        ("alipay", gateways.alipay.is_some()),
        ("wechat", gateways.wechat.is_some()),
    ] {
        if configured {
            tracing::info!("Gateway enabled: {}", name);
        } else {
            tracing::warn!("Gateway not configured: {}", name);
        }
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        gateways: Arc::new(gateways),
        base_url: config.base_url.clone(),
        audit_log_enabled: config.audit_log_enabled,
    };

    // Purge old audit entries on startup (0 = never purge)
    if config.audit_log_retention_days > 0 {
        let conn = state.audit.get().expect("Failed to get audit connection for purge");
        match queries::purge_old_webhook_audit(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} webhook audit entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old webhook audit entries: {}", e);
            }
        }
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set FEATUREGATE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Featuregate server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
