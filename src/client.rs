use crate::dashboard::DashboardSummary;
use crate::errors::{AppError, ValidationErrors};
use crate::models::{
    Customer, CustomerInput, CustomerListQuery, CustomerPage, Lead, LeadInput, LeadListQuery,
    LeadStatus, LeadStatusUpdate, LoginRequest, LoginResponse, RegisterRequest, User,
};
use crate::token_store::TokenStore;
use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Typed client for the CRM API.
///
/// Every authenticated call sends the token held by the [`TokenStore`]; a
/// 401 answering such a call clears it, as the session is no longer usable.
#[derive(Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenStore>,
}

impl CrmClient {
    /// Creates a new `CrmClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the API, e.g. `https://crm.example.com`.
    /// * `tokens` - Where the login token lives between calls.
    pub fn new(base_url: &str, tokens: TokenStore) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::BadRequest(format!("Invalid API base URL: {}", e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::BadRequest(
                "API base URL must start with http:// or https://".to_string(),
            ));
        }
        // Relative joins need a trailing slash to keep any path prefix
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::ExternalApiError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            tokens: Arc::new(tokens),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// The logged-in user, if a usable token is held.
    pub fn current_user(&self) -> Option<User> {
        self.tokens.token().and(self.tokens.user())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.token().is_some()
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::BadRequest(format!("Invalid API path '{}': {}", path, e)))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, AppError> {
        let token = self
            .tokens
            .token()
            .ok_or_else(|| AppError::Unauthorized("Not logged in".to_string()))?;
        Ok(builder.bearer_auth(token))
    }

    /// Sends a request and maps non-2xx responses back to `AppError`.
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let request = builder
            .build()
            .map_err(|e| AppError::BadRequest(format!("Invalid CRM request: {}", e)))?;
        let carried_token = request.headers().contains_key(header::AUTHORIZATION);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| AppError::ExternalApiError(format!("CRM request failed: {}", e)))?;
        self.check(response, carried_token).await
    }

    /// A 401 clears the stored token only when the request carried it; a
    /// failed login leaves a remembered one alone.
    async fn check(&self, response: Response, carried_token: bool) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error")
            .to_string();

        if status == StatusCode::UNAUTHORIZED && carried_token {
            tracing::warn!("CRM API rejected the session, clearing stored token");
            self.tokens.clear()?;
        }

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let fields = body
                .get("fields")
                .cloned()
                .and_then(|f| serde_json::from_value::<ValidationErrors>(f).ok())
                .unwrap_or_default();
            return Err(AppError::Validation(fields));
        }

        Err(AppError::from_status(status, message))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, AppError> {
        let response = self.execute(builder).await?;
        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse CRM response: {}", e))
        })
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), AppError> {
        self.execute(builder).await?;
        Ok(())
    }

    // ============ Auth ============

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, AppError> {
        let url = self.url("api/v1/auth/register")?;
        self.send_json(self.http.post(url).json(request)).await
    }

    /// Logs in and stores the token according to `remember_me`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<User, AppError> {
        let url = self.url("api/v1/auth/login")?;
        tracing::info!("Logging in to CRM as {}", email);

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            remember_me,
        };
        let login: LoginResponse = self.send_json(self.http.post(url).json(&request)).await?;
        self.tokens.save(&login)?;
        Ok(login.user)
    }

    /// Ends the session on the server and forgets the token locally.
    ///
    /// The local token is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), AppError> {
        let result = match self.tokens.token() {
            Some(token) => {
                let url = self.url("api/v1/auth/logout")?;
                self.send_empty(self.http.post(url).bearer_auth(token)).await
            }
            None => Ok(()),
        };
        self.tokens.clear()?;

        match result {
            Err(AppError::Unauthorized(_)) => Ok(()),
            other => other,
        }
    }

    pub async fn me(&self) -> Result<User, AppError> {
        let url = self.url("api/v1/auth/me")?;
        self.send_json(self.authorized(self.http.get(url))?).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let url = self.url("api/v1/users")?;
        self.send_json(self.authorized(self.http.get(url))?).await
    }

    // ============ Customers ============

    pub async fn list_customers(
        &self,
        query: &CustomerListQuery,
    ) -> Result<CustomerPage, AppError> {
        let url = self.url("api/v1/customers")?;
        self.send_json(self.authorized(self.http.get(url).query(query))?)
            .await
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<Customer, AppError> {
        let url = self.url(&format!("api/v1/customers/{}", id))?;
        self.send_json(self.authorized(self.http.get(url))?).await
    }

    pub async fn create_customer(&self, input: &CustomerInput) -> Result<Customer, AppError> {
        let url = self.url("api/v1/customers")?;
        self.send_json(self.authorized(self.http.post(url).json(input))?)
            .await
    }

    pub async fn update_customer(
        &self,
        id: Uuid,
        input: &CustomerInput,
    ) -> Result<Customer, AppError> {
        let url = self.url(&format!("api/v1/customers/{}", id))?;
        self.send_json(self.authorized(self.http.put(url).json(input))?)
            .await
    }

    pub async fn delete_customer(&self, id: Uuid) -> Result<(), AppError> {
        let url = self.url(&format!("api/v1/customers/{}", id))?;
        self.send_empty(self.authorized(self.http.delete(url))?).await
    }

    // ============ Leads ============

    pub async fn list_leads(
        &self,
        customer_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, AppError> {
        let url = self.url(&format!("api/v1/customers/{}/leads", customer_id))?;
        let query = LeadListQuery { status };
        self.send_json(self.authorized(self.http.get(url).query(&query))?)
            .await
    }

    pub async fn get_lead(&self, customer_id: Uuid, lead_id: Uuid) -> Result<Lead, AppError> {
        let url = self.url(&format!("api/v1/customers/{}/leads/{}", customer_id, lead_id))?;
        self.send_json(self.authorized(self.http.get(url))?).await
    }

    pub async fn create_lead(
        &self,
        customer_id: Uuid,
        input: &LeadInput,
    ) -> Result<Lead, AppError> {
        let url = self.url(&format!("api/v1/customers/{}/leads", customer_id))?;
        self.send_json(self.authorized(self.http.post(url).json(input))?)
            .await
    }

    pub async fn update_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        input: &LeadInput,
    ) -> Result<Lead, AppError> {
        let url = self.url(&format!("api/v1/customers/{}/leads/{}", customer_id, lead_id))?;
        self.send_json(self.authorized(self.http.put(url).json(input))?)
            .await
    }

    pub async fn set_lead_status(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError> {
        let url = self.url(&format!(
            "api/v1/customers/{}/leads/{}/status",
            customer_id, lead_id
        ))?;
        let body = LeadStatusUpdate { status };
        self.send_json(self.authorized(self.http.patch(url).json(&body))?)
            .await
    }

    pub async fn delete_lead(&self, customer_id: Uuid, lead_id: Uuid) -> Result<(), AppError> {
        let url = self.url(&format!("api/v1/customers/{}/leads/{}", customer_id, lead_id))?;
        self.send_empty(self.authorized(self.http.delete(url))?).await
    }

    // ============ Dashboard ============

    pub async fn dashboard(&self) -> Result<DashboardSummary, AppError> {
        let url = self.url("api/v1/dashboard")?;
        self.send_json(self.authorized(self.http.get(url))?).await
    }
}
