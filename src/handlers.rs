use crate::auth::{AuthUser, SessionCache};
use crate::config::Config;
use crate::dashboard::{self, DashboardSummary};
use crate::errors::AppError;
use crate::models::*;
use crate::store::{CustomerFilter, OwnerScope, Store};
use crate::validation::{validate_customer, validate_lead};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Customer, lead, user and session storage.
    pub store: Store,
    /// Application configuration.
    pub config: Config,
    /// Recently validated sessions, keyed by token hash.
    pub sessions: SessionCache,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            store,
            config,
            sessions: SessionCache::new(),
        }
    }
}

/// Health check endpoint.
///
/// Returns the service status, version and storage backend.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-crm-api",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": state.store.backend_name(),
        })),
    )
}

/// Resolves a customer in the caller's scope or fails with 404.
async fn visible_customer(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
) -> Result<Customer, AppError> {
    state
        .store
        .get_customer(OwnerScope::for_user(&auth.user), id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer with id {} not found", id)))
}

fn lead_not_found(lead_id: Uuid) -> AppError {
    AppError::NotFound(format!("Lead with id {} not found", lead_id))
}

// ============ Customers ============

/// GET /api/v1/customers
///
/// Lists the caller's customers (all customers for admins), newest first.
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    params(CustomerListQuery),
    responses((status = 200, body = CustomerPage)),
    security(("bearer" = [])),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<CustomerListQuery>,
) -> Result<Json<CustomerPage>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    tracing::debug!(
        "GET /customers - user={} page={} per_page={} search={:?}",
        auth.user.id,
        page,
        per_page,
        search
    );

    let filter = CustomerFilter {
        search,
        offset: ((page - 1) as usize) * per_page as usize,
        limit: per_page as usize,
    };
    let (total, customers) = state
        .store
        .list_customers(OwnerScope::for_user(&auth.user), &filter)
        .await?;

    Ok(Json(CustomerPage {
        total,
        page,
        per_page,
        customers,
    }))
}

/// POST /api/v1/customers
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = CustomerInput,
    responses((status = 201, body = Customer), (status = 422, description = "Validation failed")),
    security(("bearer" = [])),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CustomerInput>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let input = validate_customer(&payload, state.config.default_phone_region)?;
    let customer = state.store.create_customer(auth.user.id, input).await?;

    tracing::info!("Customer {} created by user {}", customer.id, auth.user.id);
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /api/v1/customers/:id
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses((status = 200, body = Customer), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "customers"
)]
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, AppError> {
    visible_customer(&state, &auth, id).await.map(Json)
}

/// PUT /api/v1/customers/:id
///
/// Replaces every editable field of the customer.
#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = CustomerInput,
    responses((status = 200, body = Customer), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "customers"
)]
pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomerInput>,
) -> Result<Json<Customer>, AppError> {
    let input = validate_customer(&payload, state.config.default_phone_region)?;
    let customer = state
        .store
        .update_customer(OwnerScope::for_user(&auth.user), id, input)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer with id {} not found", id)))?;

    tracing::info!("Customer {} updated by user {}", id, auth.user.id);
    Ok(Json(customer))
}

/// DELETE /api/v1/customers/:id
///
/// Deletes the customer together with all of its leads.
#[utoipa::path(
    delete,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses((status = 204), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "customers"
)]
pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .store
        .delete_customer(OwnerScope::for_user(&auth.user), id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(format!("Customer with id {} not found", id)));
    }

    tracing::info!("Customer {} deleted by user {}", id, auth.user.id);
    Ok(StatusCode::NO_CONTENT)
}

// ============ Leads ============

/// GET /api/v1/customers/:id/leads
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/leads",
    params(("id" = Uuid, Path, description = "Customer id"), LeadListQuery),
    responses((status = 200, body = Vec<Lead>)),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(customer_id): Path<Uuid>,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    let leads = state.store.list_leads(customer.id, params.status).await?;
    Ok(Json(leads))
}

/// POST /api/v1/customers/:id/leads
#[utoipa::path(
    post,
    path = "/api/v1/customers/{id}/leads",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = LeadInput,
    responses((status = 201, body = Lead), (status = 422, description = "Validation failed")),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<LeadInput>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    let input = validate_lead(&payload)?;
    let lead = state.store.create_lead(customer.id, input).await?;

    tracing::info!(
        "Lead {} ({}) created for customer {}",
        lead.id,
        lead.status,
        customer.id
    );
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/v1/customers/:id/leads/:lead_id
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/leads/{lead_id}",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("lead_id" = Uuid, Path, description = "Lead id")
    ),
    responses((status = 200, body = Lead), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Lead>, AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    state
        .store
        .get_lead(customer.id, lead_id)
        .await?
        .map(Json)
        .ok_or_else(|| lead_not_found(lead_id))
}

/// PUT /api/v1/customers/:id/leads/:lead_id
#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}/leads/{lead_id}",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("lead_id" = Uuid, Path, description = "Lead id")
    ),
    request_body = LeadInput,
    responses((status = 200, body = Lead), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, lead_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LeadInput>,
) -> Result<Json<Lead>, AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    let input = validate_lead(&payload)?;
    let lead = state
        .store
        .update_lead(customer.id, lead_id, input)
        .await?
        .ok_or_else(|| lead_not_found(lead_id))?;

    tracing::info!("Lead {} updated by user {}", lead.id, auth.user.id);
    Ok(Json(lead))
}

/// PATCH /api/v1/customers/:id/leads/:lead_id/status
#[utoipa::path(
    patch,
    path = "/api/v1/customers/{id}/leads/{lead_id}/status",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("lead_id" = Uuid, Path, description = "Lead id")
    ),
    request_body = LeadStatusUpdate,
    responses((status = 200, body = Lead), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, lead_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LeadStatusUpdate>,
) -> Result<Json<Lead>, AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    let lead = state
        .store
        .set_lead_status(customer.id, lead_id, payload.status)
        .await?
        .ok_or_else(|| lead_not_found(lead_id))?;

    tracing::info!("Lead {} moved to {}", lead.id, lead.status);
    Ok(Json(lead))
}

/// DELETE /api/v1/customers/:id/leads/:lead_id
#[utoipa::path(
    delete,
    path = "/api/v1/customers/{id}/leads/{lead_id}",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("lead_id" = Uuid, Path, description = "Lead id")
    ),
    responses((status = 204), (status = 404, description = "Not found")),
    security(("bearer" = [])),
    tag = "leads"
)]
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((customer_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let customer = visible_customer(&state, &auth, customer_id).await?;
    if !state.store.delete_lead(customer.id, lead_id).await? {
        return Err(lead_not_found(lead_id));
    }

    tracing::info!("Lead {} deleted by user {}", lead_id, auth.user.id);
    Ok(StatusCode::NO_CONTENT)
}

// ============ Dashboard ============

/// GET /api/v1/dashboard
///
/// Aggregates over every customer the caller can see.
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses((status = 200, body = DashboardSummary)),
    security(("bearer" = [])),
    tag = "dashboard"
)]
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<DashboardSummary>, AppError> {
    let (customers, leads) = state
        .store
        .dashboard_data(OwnerScope::for_user(&auth.user))
        .await?;

    Ok(Json(dashboard::summarize(&customers, &leads, Utc::now())))
}
