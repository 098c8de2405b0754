//! Labitory authentication server.
//!
//! Connects to PostgreSQL (or keeps everything in memory with `--memory`),
//! picks Redis or the in-process cache for attempt counters, and serves the
//! authentication API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use lab_server::{
    api::{self, AppState, rate_limiter::IpRateLimiter},
    config::ServerConfig,
    logging, metrics,
};
use labitory::{
    AuthConfig, AuthManager, AuthStores, CacheStore, MemoryCache, RedisCache,
    db::{
        Database, MemorySecurityEventRepository, MemoryTokenRepository, MemoryUserRepository,
        PgSecurityEventRepository, PgTokenRepository, PgUserRepository,
    },
};
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run the Labitory authentication server

USAGE:
  lab_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Keep users and tokens in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8000)
  DATABASE_URL             PostgreSQL connection string
  REDIS_URL                Shared cache for attempt counters (optional)
  JWT_SECRET               JWT signing secret (at least 32 characters)
  PASSWORD_PEPPER          Password hashing pepper (at least 16 characters)
  METRICS_BIND             Prometheus scrape address (optional)
  (See .env file for all configuration options)
";

/// How often expired entries are swept from the in-process cache
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs
            .opt_value_from_str("--bind")
            .context("Invalid --bind address")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory: pargs.contains("--memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exported on {}", addr);
    }

    let cache: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            let cache = MemoryCache::new();
            spawn_cache_purge(cache.clone());
            info!("REDIS_URL not set, using in-process cache");
            Arc::new(cache)
        }
    };

    let stores = if args.memory {
        info!("Using in-memory user and token stores");
        AuthStores {
            users: Arc::new(MemoryUserRepository::new()),
            tokens: Arc::new(MemoryTokenRepository::new()),
            events: Arc::new(MemorySecurityEventRepository::new()),
            cache: cache.clone(),
        }
    } else {
        let db = Database::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        db.migrate().await.context("Failed to run migrations")?;
        info!("Database connected successfully");

        let pool = db.pool().clone();
        AuthStores {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            tokens: Arc::new(PgTokenRepository::new(pool.clone())),
            events: Arc::new(PgSecurityEventRepository::new(pool)),
            cache: cache.clone(),
        }
    };

    let auth = AuthManager::new(
        stores,
        AuthConfig {
            pepper: config.security.password_pepper.clone(),
            jwt_secret: config.security.jwt_secret.clone(),
            security: config.auth.clone(),
            tokens: config.tokens,
        },
    );

    let state = AppState {
        auth: Arc::new(auth),
        cache,
        rate_limiter: Arc::new(IpRateLimiter::new(config.rate_limit)),
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");

    Ok(())
}

fn spawn_cache_purge(cache: MemoryCache) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
}
