//! Database connection pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::users::UserRepository;
use crate::error::EngineError;

pub struct DatabasePool {
    pool: PgPool,
    users: UserRepository,
}

impl DatabasePool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.postgres_url)
            .await?;

        info!("Connected to PostgreSQL");

        let users = UserRepository::new(pool.clone());

        Ok(Self { pool, users })
    }

    /// Create tables and indexes if they do not exist. Statement order
    /// follows the foreign keys: users and the catalog first, then
    /// requests, then the ledger that references both.
    pub async fn init_schema(&self) -> Result<(), EngineError> {
        info!("Initializing database schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                referral_code VARCHAR(16) NOT NULL UNIQUE,
                referred_by UUID REFERENCES users(id),
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                points_balance BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reward_catalog (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                required_points BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS redeem_requests (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                reward_id UUID NOT NULL REFERENCES reward_catalog(id),
                points_used BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                tx_hash TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                id BIGSERIAL PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                amount BIGINT NOT NULL CHECK (amount <> 0),
                source VARCHAR(20) NOT NULL,
                reason TEXT NOT NULL,
                admin_id UUID,
                request_id UUID REFERENCES redeem_requests(id),
                tx_hash TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS yield_claims (
                user_id UUID NOT NULL REFERENCES users(id),
                period_key VARCHAR(16) NOT NULL,
                amount BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, period_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_entries_user ON ledger_entries(user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_entries_request ON ledger_entries(request_id) WHERE request_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_redeem_requests_user ON redeem_requests(user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
