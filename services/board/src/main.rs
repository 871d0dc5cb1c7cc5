use std::{sync::Arc, time::Duration};

use anyhow::Result;
use auth::{
    LogMailer, PgUserRepository, SessionStore,
    session::{InMemorySessionStore, PgSessionStore, RedisSessionStore},
};
use board::{
    AppState, SessionBackend, Settings, create_router, repositories::PgVacancyRepository,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use mockable::DefaultClock;
use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting job board service");

    let settings = Settings::load()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool, &MIGRATOR).await?;

    let session_store: Arc<dyn SessionStore> = match settings.session_backend {
        SessionBackend::Postgres => {
            let store = PgSessionStore::new(pool.clone());
            spawn_session_purge(store.clone());
            Arc::new(store)
        }
        SessionBackend::Redis => {
            let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
            if !redis_pool.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            Arc::new(RedisSessionStore::new(redis_pool))
        }
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
    };
    info!("Using {:?} session backend", settings.session_backend);

    let address = settings.bind_address();
    let state = AppState::new(
        settings,
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgVacancyRepository::new(pool)),
        session_store,
        Arc::new(LogMailer),
        Arc::new(DefaultClock),
    );

    // Start the web server
    let app = create_router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Job board listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_purge(store: PgSessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = store.purge_expired().await {
                error!("Failed to purge expired sessions: {}", e);
            }
        }
    });
}
