/// Application context and dependency injection
use crate::{
    account::AccountManager,
    auth::TokenIssuer,
    config::{ServerConfig, DEFAULT_BOOTSTRAP_PASSWORD},
    db::{self, AccountStore, SqliteAccountStore},
    error::ApiResult,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub token_issuer: Arc<TokenIssuer>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..db::DatabaseOptions::default()
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let store: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(db.clone()));
        let token_issuer = Arc::new(TokenIssuer::new(&config.authentication));
        let account_manager = Arc::new(AccountManager::new(store, token_issuer.clone()));

        if account_manager
            .ensure_bootstrap_admin(&config.bootstrap)
            .await?
            && config.bootstrap.admin_password == DEFAULT_BOOTSTRAP_PASSWORD
        {
            tracing::warn!(
                login = %config.bootstrap.admin_login,
                "bootstrap admin uses the default password; change it"
            );
        }

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db,
            account_manager,
            token_issuer,
            rate_limiter,
        })
    }
}
