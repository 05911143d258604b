//! Router assembly shared by the server binary and the integration tests.

use crate::handlers::{self, AppState};
use crate::openapi::ApiDoc;
use crate::{auth_handlers, config::Config, db::Database, memory_store::MemoryStore};
use crate::{config::StorageBackend, pg_store::PgStore, store::Store};
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted request body. CRM forms are small.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Opens the configured store, bootstrapping schema or demo data as needed.
pub async fn open_store(config: &Config) -> anyhow::Result<Store> {
    let store = match config.storage_backend {
        StorageBackend::Memory => {
            let memory = MemoryStore::new();
            if config.seed_demo_data {
                memory
                    .seed_demo_data(crate::store::NewUser {
                        name: "Demo Admin".to_string(),
                        email: config.seed_admin_email.clone(),
                        password_hash: crate::auth::hash_password_blocking(
                            config.seed_admin_password.clone(),
                        )
                        .await?,
                        role: Some(crate::models::Role::Admin),
                    })
                    .await?;
            }
            tracing::info!("Using in-memory mock store");
            Store::Memory(memory)
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres storage"))?;
            let db = Database::new(url).await?;
            db.migrate().await?;
            tracing::info!("Database connection pool established");
            Store::Postgres(PgStore::new(db.pool))
        }
    };
    match store.count_users().await? {
        0 => tracing::warn!("No users yet; the first account to register becomes admin"),
        n => tracing::info!("{} user account(s) on record", n),
    }
    Ok(store)
}

/// Builds the full HTTP application.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    // Credential endpoints: one token every 2 seconds per IP, burst of 5
    let auth_routes = Router::new()
        .route("/api/v1/auth/register", post(auth_handlers::register))
        .route("/api/v1/auth/login", post(auth_handlers::login));

    let auth_routes = if state.config.rate_limit_enabled {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(2)
                .burst_size(5)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
        );
        auth_routes.layer(GovernorLayer {
            config: governor_conf,
        })
    } else {
        auth_routes
    };

    let api_routes = Router::new()
        .route("/api/v1/auth/logout", post(auth_handlers::logout))
        .route("/api/v1/auth/me", get(auth_handlers::me))
        .route("/api/v1/users", get(auth_handlers::list_users))
        .route(
            "/api/v1/customers",
            get(handlers::list_customers).post(handlers::create_customer),
        )
        .route(
            "/api/v1/customers/:id",
            get(handlers::get_customer)
                .put(handlers::update_customer)
                .delete(handlers::delete_customer),
        )
        .route(
            "/api/v1/customers/:id/leads",
            get(handlers::list_leads).post(handlers::create_lead),
        )
        .route(
            "/api/v1/customers/:id/leads/:lead_id",
            get(handlers::get_lead)
                .put(handlers::update_lead)
                .delete(handlers::delete_lead),
        )
        .route(
            "/api/v1/customers/:id/leads/:lead_id/status",
            patch(handlers::update_lead_status),
        )
        .route("/api/v1/dashboard", get(handlers::get_dashboard));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(auth_routes)
        .merge(api_routes)
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
