//! OpenAPI document served under `/api-docs/openapi.json` and `/docs`.

use crate::dashboard::{CustomerValue, DashboardSummary, MonthlyCount, StatusBreakdown};
use crate::models::{
    Customer, CustomerInput, CustomerPage, Lead, LeadInput, LeadStatus, LeadStatusUpdate,
    LoginRequest, LoginResponse, RegisterRequest, Role, TokenPersistence, User,
};
use crate::{auth_handlers, handlers};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "CRM API", description = "Customers, leads and dashboard for CRM users"),
    paths(
        auth_handlers::register,
        auth_handlers::login,
        auth_handlers::logout,
        auth_handlers::me,
        auth_handlers::list_users,
        handlers::list_customers,
        handlers::create_customer,
        handlers::get_customer,
        handlers::update_customer,
        handlers::delete_customer,
        handlers::list_leads,
        handlers::create_lead,
        handlers::get_lead,
        handlers::update_lead,
        handlers::update_lead_status,
        handlers::delete_lead,
        handlers::get_dashboard,
    ),
    components(schemas(
        Customer,
        CustomerInput,
        CustomerPage,
        Lead,
        LeadInput,
        LeadStatus,
        LeadStatusUpdate,
        LoginRequest,
        LoginResponse,
        RegisterRequest,
        Role,
        TokenPersistence,
        User,
        DashboardSummary,
        StatusBreakdown,
        MonthlyCount,
        CustomerValue,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and sessions"),
        (name = "customers", description = "Customer records"),
        (name = "leads", description = "Sales opportunities per customer"),
        (name = "dashboard", description = "Aggregate chart data"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/api/v1/customers/{id}/leads/{lead_id}/status"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/dashboard"));
        assert_eq!(paths.len(), 11);
    }
}
