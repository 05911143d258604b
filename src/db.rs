use sqlx::{postgres::PgPoolOptions, PgPool};

/// Idempotent schema bootstrap, applied in order at startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS crm_users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL CHECK (role IN ('Admin', 'User')),
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crm_sessions (
        token_hash TEXT PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES crm_users(id) ON DELETE CASCADE,
        persistence TEXT NOT NULL CHECK (persistence IN ('local', 'session')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crm_customers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        company TEXT,
        owner_id UUID NOT NULL REFERENCES crm_users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crm_leads (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL REFERENCES crm_customers(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL CHECK (status IN ('New', 'Contacted', 'Converted', 'Lost')),
        value NUMERIC(14, 2) NOT NULL CHECK (value >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_crm_customers_owner ON crm_customers (owner_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_crm_leads_customer ON crm_leads (customer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_crm_sessions_expiry ON crm_sessions (expires_at)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates any missing tables and indexes.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema verified ({} statements)", SCHEMA.len());
        Ok(())
    }
}
