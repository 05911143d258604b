/// End-to-end tests of the HTTP API against the in-memory store.
/// Every request goes through the full router, extractors and error mapping.
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_crm_api::app::build_router;
use rust_crm_api::config::Config;
use rust_crm_api::handlers::AppState;
use rust_crm_api::memory_store::MemoryStore;
use rust_crm_api::store::Store;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> Router {
    let state = AppState::new(Store::Memory(MemoryStore::new()), Config::default());
    build_router(Arc::new(state)).unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers and logs in a user, returning the bearer token.
async fn sign_up(app: &Router, name: &str, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_customer(app: &Router, token: &str, name: &str, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/customers",
        Some(token),
        Some(json!({ "name": name, "email": email, "phone": "+1 212 736 5000" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_storage_backend() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_first_user_is_admin_and_later_users_are_not() {
    let app = test_app();
    let (status, first) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "name": "Ana", "email": "Ana@CRM.io", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["role"], "Admin");
    assert_eq!(first["email"], "ana@crm.io");
    assert!(first.get("password_hash").is_none());

    let (_, second) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "name": "Ben", "email": "ben@crm.io", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(second["role"], "User");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = test_app();
    sign_up(&app, "Ana", "ana@crm.io").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "name": "Other", "email": "ANA@crm.io", "password": "another-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_validation_lists_fields() {
    let app = test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({ "name": "", "email": "nope", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["name"].is_string());
    assert!(body["fields"]["email"].is_string());
    assert!(body["fields"]["password"].is_string());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = test_app();
    sign_up(&app, "Ana", "ana@crm.io").await;

    let (wrong_pw, body_pw) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ana@crm.io", "password": "wrong-password" })),
    )
    .await;
    let (unknown, body_unknown) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ghost@crm.io", "password": "wrong-password" })),
    )
    .await;

    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(body_pw, body_unknown);
}

#[tokio::test]
async fn test_remember_me_selects_local_persistence() {
    let app = test_app();
    sign_up(&app, "Ana", "ana@crm.io").await;

    let (_, session) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ana@crm.io", "password": "s3cret-pass" })),
    )
    .await;
    let (_, local) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ana@crm.io", "password": "s3cret-pass", "remember_me": true })),
    )
    .await;

    assert_eq!(session["persistence"], "session");
    assert_eq!(local["persistence"], "local");
    assert_ne!(session["token"], local["token"]);
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/api/v1/customers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_the_token() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;

    let (status, me) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ana@crm.io");

    let (status, _) = send(&app, Method::POST, "/api/v1/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_list_is_admin_only() {
    let app = test_app();
    let admin = sign_up(&app, "Ana", "ana@crm.io").await;
    let user = sign_up(&app, "Ben", "ben@crm.io").await;

    let (status, users) = send(&app, Method::GET, "/api/v1/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::GET, "/api/v1/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_customer_crud() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    let id = create_customer(&app, &token, "Acme Corp", "buyer@acme.com").await;

    let uri = format!("/api/v1/customers/{}", id);
    let (status, customer) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(customer["phone"], "+12127365000");

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "name": "Acme Inc", "email": "sales@acme.com", "company": "Acme" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Acme Inc");
    assert_eq!(updated["company"], "Acme");
    // Full replacement: omitted phone is cleared
    assert!(updated["phone"].is_null());

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_customer_validation_returns_field_errors() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/customers",
        Some(&token),
        Some(json!({ "name": "  ", "email": "broken", "phone": "12" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["fields"]["name"].is_string());
    assert!(body["fields"]["email"].is_string());
    assert!(body["fields"]["phone"].is_string());
}

#[tokio::test]
async fn test_customers_are_scoped_to_their_owner() {
    let app = test_app();
    let admin = sign_up(&app, "Ana", "ana@crm.io").await;
    let ben = sign_up(&app, "Ben", "ben@crm.io").await;
    let cara = sign_up(&app, "Cara", "cara@crm.io").await;

    let id = create_customer(&app, &ben, "Ben's Client", "client@ben.com").await;
    let uri = format!("/api/v1/customers/{}", id);

    let (status, _) = send(&app, Method::GET, &uri, Some(&cara), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&cara), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, page) = send(&app, Method::GET, "/api/v1/customers", Some(&cara), None).await;
    assert_eq!(page["total"], 0);

    let (status, _) = send(&app, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, page) = send(&app, Method::GET, "/api/v1/customers", Some(&admin), None).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_customer_search_and_pagination() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    for i in 0..5 {
        let name = format!("Globex {}", i);
        create_customer(&app, &token, &name, &format!("g{}@globex.com", i)).await;
    }
    create_customer(&app, &token, "Initech", "peter@initech.com").await;

    let (_, page) = send(
        &app,
        Method::GET,
        "/api/v1/customers?search=GLOBEX&page=2&per_page=2",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(page["total"], 5);
    assert_eq!(page["page"], 2);
    assert_eq!(page["per_page"], 2);
    assert_eq!(page["customers"].as_array().unwrap().len(), 2);

    let (_, clamped) = send(
        &app,
        Method::GET,
        "/api/v1/customers?per_page=1000",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(clamped["per_page"], 100);
    assert_eq!(clamped["total"], 6);
}

#[tokio::test]
async fn test_lead_lifecycle() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    let customer = create_customer(&app, &token, "Acme Corp", "buyer@acme.com").await;
    let leads_uri = format!("/api/v1/customers/{}/leads", customer);

    let (status, lead) = send(
        &app,
        Method::POST,
        &leads_uri,
        Some(&token),
        Some(json!({ "title": "Annual plan", "value": "1200.5" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", lead);
    assert_eq!(lead["status"], "New");
    assert_eq!(lead["value"], "1200.50");
    let lead_uri = format!("{}/{}", leads_uri, lead["id"].as_str().unwrap());

    let (status, lead) = send(
        &app,
        Method::PATCH,
        &format!("{}/status", lead_uri),
        Some(&token),
        Some(json!({ "status": "Converted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["status"], "Converted");

    let (_, converted) = send(
        &app,
        Method::GET,
        &format!("{}?status=Converted", leads_uri),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(converted.as_array().unwrap().len(), 1);
    let open_uri = format!("{}?status=New", leads_uri);
    let (_, open) = send(&app, Method::GET, &open_uri, Some(&token), None).await;
    assert!(open.as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::DELETE, &lead_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &lead_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lead_value_must_be_non_negative_money() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    let customer = create_customer(&app, &token, "Acme Corp", "buyer@acme.com").await;
    let leads_uri = format!("/api/v1/customers/{}/leads", customer);

    for value in ["-1", "10.001", "1000000000000", "1e2000000"] {
        let (status, body) = send(
            &app,
            Method::POST,
            &leads_uri,
            Some(&token),
            Some(json!({ "title": "Deal", "value": value })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["value"].is_string());
    }
}

#[tokio::test]
async fn test_deleting_customer_removes_its_leads() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    let customer = create_customer(&app, &token, "Acme Corp", "buyer@acme.com").await;
    let leads_uri = format!("/api/v1/customers/{}/leads", customer);
    send(
        &app,
        Method::POST,
        &leads_uri,
        Some(&token),
        Some(json!({ "title": "Deal", "value": "100" })),
    )
    .await;

    let customer_uri = format!("/api/v1/customers/{}", customer);
    send(&app, Method::DELETE, &customer_uri, Some(&token), None).await;

    let (status, _) = send(&app, Method::GET, &leads_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, dashboard) = send(&app, Method::GET, "/api/v1/dashboard", Some(&token), None).await;
    assert_eq!(dashboard["total_leads"], 0);
}

#[tokio::test]
async fn test_dashboard_summarizes_visible_data() {
    let app = test_app();
    let token = sign_up(&app, "Ana", "ana@crm.io").await;
    let customer = create_customer(&app, &token, "Acme Corp", "buyer@acme.com").await;
    let leads_uri = format!("/api/v1/customers/{}/leads", customer);

    for (title, status, value) in [
        ("A", "New", "100"),
        ("B", "Contacted", "50"),
        ("C", "Converted", "300"),
        ("D", "Lost", "20"),
    ] {
        let (code, _) = send(
            &app,
            Method::POST,
            &leads_uri,
            Some(&token),
            Some(json!({ "title": title, "status": status, "value": value })),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
    }

    let (status, dashboard) =
        send(&app, Method::GET, "/api/v1/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["total_customers"], 1);
    assert_eq!(dashboard["total_leads"], 4);
    assert_eq!(dashboard["pipeline_value"], "150.00");
    assert_eq!(dashboard["converted_value"], "300.00");
    assert_eq!(dashboard["conversion_rate"], 0.5);
    assert_eq!(dashboard["by_status"].as_array().unwrap().len(), 4);
    assert_eq!(dashboard["customers_per_month"].as_array().unwrap().len(), 6);
    assert_eq!(dashboard["top_customers"][0]["name"], "Acme Corp");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = test_app();
    let (status, doc) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/customers"].is_object());
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited_per_ip() {
    let config = Config {
        rate_limit_enabled: true,
        ..Config::default()
    };
    let state = AppState::new(Store::Memory(MemoryStore::new()), config);
    let app = build_router(Arc::new(state)).unwrap();

    let attempt = |ip: &'static str| {
        let app = app.clone();
        async move {
            let request = Request::builder()
                .method(Method::POST)
                .uri("/api/v1/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", ip)
                .body(Body::from(
                    json!({ "email": "nobody@crm.io", "password": "guess-123" }).to_string(),
                ))
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        }
    };

    // Burst of 5 per IP, refilled one every 2 seconds
    for _ in 0..5 {
        assert_eq!(attempt("203.0.113.7").await, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(attempt("203.0.113.7").await, StatusCode::TOO_MANY_REQUESTS);

    // Other clients keep their own budget
    assert_eq!(attempt("198.51.100.20").await, StatusCode::UNAUTHORIZED);

    // Routes outside the credential group are not limited
    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
