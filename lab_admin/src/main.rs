//! Operator CLI for account lockouts and token housekeeping.
//!
//! Connects to the same PostgreSQL database and cache as the server so that
//! locks, counters and tokens are the ones the server enforces.

use std::sync::Arc;

use anyhow::{Context, Result};
use lab_admin::{
    commands::{Command, parse_args},
    ops, render,
};
use labitory::{
    AuthConfig, AuthManager, AuthStores, CacheStore, MemoryCache, RedisCache, SecuritySettings,
    auth::TokenSettings,
    db::{
        Database, DatabaseConfig, PgSecurityEventRepository, PgTokenRepository, PgUserRepository,
    },
};
use pico_args::Arguments;

const HELP: &str = "\
Manage Labitory account lockouts and API tokens

USAGE:
  lab_admin <COMMAND> [OPTIONS]

COMMANDS:
  unlock <USERNAME>        Unlock an account locked after failed logins
      --clear-attempts     Also reset the stored failed login counter
  status                   Show lockout configuration and account state
      --locked-only        Only list locked accounts
      --detailed           Include cache health and failure counters
  cleanup-tokens           Delete expired tokens
      --dry-run            Report what would be deleted without deleting
      --days N             Also delete tokens revoked more than N days ago

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string (required)
  REDIS_URL                Shared cache holding attempt counters and locks
  (Lockout settings use the same AUTH_* variables as the server)
";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let command = parse_args(pargs.finish())?;
    let (auth, cache) = connect().await?;

    match command {
        Command::Unlock {
            username,
            clear_attempts,
        } => {
            let outcome = ops::unlock(&auth, &username, clear_attempts).await?;
            println!("{}", render::render_unlock(&username, outcome));
        }
        Command::Status {
            locked_only,
            detailed,
        } => {
            let report = ops::status(&auth, cache.as_ref()).await?;
            print!("{}", render::render_report(&report, locked_only, detailed));
        }
        Command::CleanupTokens { dry_run, days } => {
            let summary = ops::cleanup_tokens(auth.tokens(), days, dry_run).await?;
            println!("{}", render::render_cleanup(&summary));
        }
    }

    Ok(())
}

async fn connect() -> Result<(AuthManager, Arc<dyn CacheStore>)> {
    let db_config = DatabaseConfig::from_env().context("DATABASE_URL must be set")?;
    let db = Database::new(&db_config)
        .await
        .context("Failed to connect to database")?;
    let pool = db.pool().clone();

    let cache: Arc<dyn CacheStore> = match std::env::var("REDIS_URL") {
        Ok(url) => Arc::new(
            RedisCache::connect(&url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        Err(_) => {
            log::warn!("REDIS_URL not set; cache counters and locks held by the server are not visible");
            Arc::new(MemoryCache::new())
        }
    };

    let auth = AuthManager::new(
        AuthStores {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            tokens: Arc::new(PgTokenRepository::new(pool.clone())),
            events: Arc::new(PgSecurityEventRepository::new(pool)),
            cache: cache.clone(),
        },
        AuthConfig {
            pepper: std::env::var("PASSWORD_PEPPER").unwrap_or_default(),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            security: SecuritySettings::from_env(),
            tokens: TokenSettings::from_env(),
        },
    );

    Ok((auth, cache))
}
