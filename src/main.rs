use anyhow::{Context, Result};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use scrip_engine::{
    api::{
        create_admin_router, create_health_router, create_points_router,
        create_redemptions_router, create_users_router, principal_middleware, AdminApiState,
        PointsApiState, RedemptionsApiState, UsersApiState,
    },
    spawn_reconciler, AumSource, AwardEngine, DatabasePool, EngineConfig, HttpAumSource,
    HttpNotary, Notary, PgHashSink, RedemptionEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - a bad environment should fail before
    // anything binds or connects
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check SCRIP_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting Scrip points ledger engine");
    info!(
        "Notarization: enabled={}, race timeout={}ms",
        config.notary.enabled, config.notary.race_timeout_ms
    );

    // Storage
    let db = DatabasePool::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.init_schema()
        .await
        .context("Failed to initialize database schema")?;
    let pool = db.pool().clone();

    // Notarization client plus the background backfill worker
    let notary: Arc<dyn Notary> = Arc::new(
        HttpNotary::from_config(&config.notary).context("Failed to create notary client")?,
    );
    let sink = Arc::new(PgHashSink::new(pool.clone()));
    let reconciler = spawn_reconciler(
        notary.clone(),
        sink,
        Duration::from_millis(config.notary.call_timeout_ms),
    );

    // Advisory wealth reads for the daily yield
    let aum: Arc<dyn AumSource> = Arc::new(
        HttpAumSource::from_config(&config.economy).context("Failed to create wealth client")?,
    );

    let redemptions = RedemptionEngine::new(pool.clone());
    let awards = AwardEngine::new(pool.clone());
    let race_timeout = Duration::from_millis(config.notary.race_timeout_ms);

    // Build the application with per-area routers
    let app = Router::new()
        // Registration (anonymous)
        .nest(
            "/users",
            create_users_router(UsersApiState {
                pool: pool.clone(),
                users: db.users().clone(),
                notary: notary.clone(),
                economy: config.economy.clone(),
                race_timeout,
            }),
        )
        // Points: balances, history, daily claims, purchase credits
        .nest(
            "/points",
            create_points_router(PointsApiState {
                pool: pool.clone(),
                awards,
                aum,
                reconciler: reconciler.clone(),
                economy: config.economy.clone(),
            }),
        )
        // Redemption lifecycle
        .nest(
            "/redemptions",
            create_redemptions_router(RedemptionsApiState {
                pool: pool.clone(),
                engine: redemptions,
                notary: notary.clone(),
                reconciler: reconciler.clone(),
                race_timeout,
            }),
        )
        // Admin surface (adjustments, ledger audits)
        .nest("/admin", create_admin_router(AdminApiState { pool }))
        // Health check
        .merge(create_health_router())
        .layer(middleware::from_fn(principal_middleware))
        .layer(TraceLayer::new_for_http());

    // Start the server on configured host/port
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Points engine listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize logging at the configured level.
fn init_logging(config: &EngineConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
