use crate::auth::{self, require_admin, AuthUser};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, User};
use crate::store::NewUser;
use crate::validation::validate_registration;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

/// POST /api/v1/auth/register
///
/// The first account ever registered becomes an admin.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, body = User),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let request = validate_registration(&payload)?;
    let password_hash = auth::hash_password_blocking(request.password).await?;

    let user = state
        .store
        .create_user(NewUser {
            name: request.name,
            email: request.email,
            password_hash,
            role: None,
        })
        .await?
        .public();

    tracing::info!("User {} registered as {}", user.id, user.role.as_str());
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/auth/login
///
/// `remember_me` selects a long-lived `local` session instead of a
/// short-lived `session` one.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, description = "Bad credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();

    let record = state.store.find_user_by_email(&email).await?;
    let stored_hash = record.as_ref().map(|r| r.password_hash.clone());
    let verified = auth::check_credentials(payload.password, stored_hash).await?;
    let Some(record) = record.filter(|_| verified) else {
        return Err(AppError::Unauthorized(format!(
            "Failed login attempt for {}",
            email
        )));
    };

    let response =
        auth::issue_session(&state.store, &state.config, record.public(), payload.remember_me)
            .await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/logout
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 204)),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    auth::end_session(&state.store, &state.sessions, &auth.token).await?;
    tracing::info!("User {} logged out", auth.user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses((status = 200, body = User), (status = 401, description = "Not logged in")),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// GET /api/v1/users
///
/// Admin-only list of every account.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses((status = 200, body = Vec<User>), (status = 403, description = "Not an admin")),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<User>>, AppError> {
    require_admin(&auth)?;
    Ok(Json(state.store.list_users().await?))
}
