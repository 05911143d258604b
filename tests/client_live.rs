/// Client against the real router on a local port, backed by the in-memory store.
use bigdecimal::BigDecimal;
use chrono::Utc;
use rust_crm_api::app::build_router;
use rust_crm_api::client::CrmClient;
use rust_crm_api::client_state::CrmState;
use rust_crm_api::config::Config;
use rust_crm_api::errors::AppError;
use rust_crm_api::handlers::AppState;
use rust_crm_api::memory_store::MemoryStore;
use rust_crm_api::models::{CustomerInput, LeadInput, LeadStatus, RegisterRequest, Role};
use rust_crm_api::store::Store;
use rust_crm_api::token_store::TokenStore;
use std::str::FromStr;
use std::sync::Arc;

async fn spawn_server() -> String {
    let state = AppState::new(Store::Memory(MemoryStore::new()), Config::default());
    let app = build_router(Arc::new(state)).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn register_request(name: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        name: name.to_string(),
        email: email.to_string(),
        password: "s3cret-pass".to_string(),
    }
}

#[tokio::test]
async fn test_full_workflow_through_client() {
    let base_url = spawn_server().await;
    let client = CrmClient::new(&base_url, TokenStore::session()).unwrap();

    let admin = client
        .register(&register_request("Ana", "ana@crm.io"))
        .await
        .unwrap();
    assert_eq!(admin.role, Role::Admin);

    client.login("ana@crm.io", "s3cret-pass", false).await.unwrap();
    let mut state = CrmState::new(client);

    let customer = state
        .create_customer(&CustomerInput {
            name: "Acme Corp".to_string(),
            email: "Buyer@Acme.com".to_string(),
            phone: None,
            company: Some("Acme".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(customer.email, "buyer@acme.com");

    let lead = state
        .create_lead(
            customer.id,
            &LeadInput {
                title: "Annual plan".to_string(),
                description: None,
                status: None,
                value: BigDecimal::from_str("900").unwrap(),
            },
        )
        .await
        .unwrap();
    assert_eq!(lead.status, LeadStatus::New);

    state
        .set_lead_status(customer.id, lead.id, LeadStatus::Converted)
        .await
        .unwrap();

    let remote = state.client().dashboard().await.unwrap();
    let local = state.summary(Utc::now());
    assert_eq!(remote.converted_value, local.converted_value);
    assert_eq!(remote.total_leads, 1);
    assert_eq!(remote.conversion_rate, 1.0);

    state.logout().await.unwrap();
    assert!(state.customers().is_empty());
    assert!(state.current_user().is_none());
    assert!(matches!(
        state.client().dashboard().await,
        Err(AppError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_other_users_customers_are_invisible_to_client() {
    let base_url = spawn_server().await;
    let admin = CrmClient::new(&base_url, TokenStore::session()).unwrap();
    admin.register(&register_request("Ana", "ana@crm.io")).await.unwrap();
    let user = CrmClient::new(&base_url, TokenStore::session()).unwrap();
    user.register(&register_request("Ben", "ben@crm.io")).await.unwrap();

    admin.login("ana@crm.io", "s3cret-pass", false).await.unwrap();
    user.login("ben@crm.io", "s3cret-pass", false).await.unwrap();

    let customer = admin
        .create_customer(&CustomerInput {
            name: "Private".to_string(),
            email: "private@example.com".to_string(),
            phone: None,
            company: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        user.get_customer(customer.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(user.list_users().await, Err(AppError::Forbidden(_))));
    assert_eq!(admin.list_users().await.unwrap().len(), 2);
}
