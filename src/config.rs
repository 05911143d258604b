use phonenumber::country::Id as CountryId;
use std::str::FromStr;

/// Which storage engine backs the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process mock store; data is lost on restart.
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    /// Lifetime of a login without "remember me".
    pub session_ttl_hours: i64,
    /// Lifetime of a "remember me" login.
    pub remember_me_ttl_days: i64,
    /// Region used to parse phone numbers written without a country code.
    pub default_phone_region: CountryId,
    pub seed_demo_data: bool,
    pub seed_admin_email: String,
    pub seed_admin_password: String,
    pub rate_limit_enabled: bool,
}

impl Default for Config {
    /// Memory-backed defaults, suitable for tests and local runs.
    fn default() -> Self {
        Self {
            port: 3000,
            storage_backend: StorageBackend::Memory,
            database_url: None,
            session_ttl_hours: 12,
            remember_me_ttl_days: 30,
            default_phone_region: CountryId::US,
            seed_demo_data: false,
            seed_admin_email: "admin@crm.local".to_string(),
            seed_admin_password: "change-me-now".to_string(),
            rate_limit_enabled: false,
        }
    }
}

fn env_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<bool>> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("{} must be a boolean (true/false)", key),
        },
        None => Ok(None),
    }
}

fn env_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> anyhow::Result<i64> {
    match lookup(key) {
        Some(raw) => {
            let value: i64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a whole number", key))?;
            if value <= 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            Ok(value)
        }
        None => Ok(default),
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let storage_backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "memory".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" | "mock" => StorageBackend::Memory,
            "postgres" | "postgresql" => StorageBackend::Postgres,
            other => anyhow::bail!(
                "STORAGE_BACKEND must be 'memory' or 'postgres', got '{}'",
                other
            ),
        };

        let database_url = lookup("DB_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|url| !url.trim().is_empty());

        if storage_backend == StorageBackend::Postgres {
            match &database_url {
                None => anyhow::bail!(
                    "DATABASE_URL environment variable required when STORAGE_BACKEND=postgres"
                ),
                Some(url)
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") =>
                {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://")
                }
                Some(_) => {}
            }
        }

        let default_phone_region = match lookup("DEFAULT_PHONE_REGION") {
            Some(raw) => CountryId::from_str(raw.trim().to_ascii_uppercase().as_str()).map_err(
                |_| anyhow::anyhow!("DEFAULT_PHONE_REGION must be an ISO-3166 alpha-2 code"),
            )?,
            None => CountryId::US,
        };

        let seed_admin_password =
            lookup("SEED_ADMIN_PASSWORD").unwrap_or_else(|| "change-me-now".to_string());
        if seed_admin_password.len() < 8 {
            anyhow::bail!("SEED_ADMIN_PASSWORD must be at least 8 characters");
        }

        let config = Self {
            port: lookup("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            storage_backend,
            database_url,
            session_ttl_hours: env_positive(&lookup, "SESSION_TTL_HOURS", 12)?,
            remember_me_ttl_days: env_positive(&lookup, "REMEMBER_ME_TTL_DAYS", 30)?,
            default_phone_region,
            seed_demo_data: env_bool(&lookup, "SEED_DEMO_DATA")?
                .unwrap_or(storage_backend == StorageBackend::Memory),
            seed_admin_email: lookup("SEED_ADMIN_EMAIL")
                .unwrap_or_else(|| "admin@crm.local".to_string())
                .trim()
                .to_lowercase(),
            seed_admin_password,
            rate_limit_enabled: env_bool(&lookup, "RATE_LIMIT_ENABLED")?.unwrap_or(true),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Storage backend: {:?}", config.storage_backend);
        tracing::debug!(
            "Session TTL: {}h, remember-me TTL: {}d",
            config.session_ttl_hours,
            config.remember_me_ttl_days
        );
        tracing::debug!("Default phone region: {:?}", config.default_phone_region);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
