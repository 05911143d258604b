//! Storage facade used by the HTTP handlers.
//!
//! `Store` dispatches to either the in-memory mock or PostgreSQL. Both
//! backends apply the same ownership scoping and the same customer → lead
//! cascade, so handlers never branch on the backend.

use crate::errors::AppError;
use crate::memory_store::MemoryStore;
use crate::models::{
    Customer, CustomerInput, Lead, LeadInput, LeadStatus, Role, Session, User, UserRecord,
};
use crate::pg_store::PgStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Which customers a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    /// Admins see every customer.
    All,
    /// Regular users see only customers they own.
    Owner(Uuid),
}

impl OwnerScope {
    pub fn for_user(user: &User) -> Self {
        if user.is_admin() {
            OwnerScope::All
        } else {
            OwnerScope::Owner(user.id)
        }
    }

    pub fn allows(&self, owner_id: Uuid) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::Owner(id) => *id == owner_id,
        }
    }

    pub(crate) fn owner_id(&self) -> Option<Uuid> {
        match self {
            OwnerScope::All => None,
            OwnerScope::Owner(id) => Some(*id),
        }
    }
}

/// Search and pagination window for customer listings.
#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    /// Lowercased search needle; matched against name, email and company.
    pub search: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl CustomerFilter {
    pub(crate) fn matches(&self, customer: &Customer) -> bool {
        let Some(ref needle) = self.search else {
            return true;
        };
        customer.name.to_lowercase().contains(needle)
            || customer.email.to_lowercase().contains(needle)
            || customer
                .company
                .as_deref()
                .map(|c| c.to_lowercase().contains(needle))
                .unwrap_or(false)
    }
}

/// A user about to be stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// `None` makes the very first user an admin and everyone after a user.
    pub role: Option<Role>,
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Postgres(PgStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Store::Memory($store) => $call.await,
            Store::Postgres($store) => $call.await,
        }
    };
}

impl Store {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Postgres(_) => "postgres",
        }
    }

    // ---- users ----

    /// Stores a user. Fails with `Conflict` if the email is taken.
    pub async fn create_user(&self, user: NewUser) -> Result<UserRecord, AppError> {
        dispatch!(self, s => s.create_user(user))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        dispatch!(self, s => s.find_user_by_email(email))
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        dispatch!(self, s => s.find_user(id))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        dispatch!(self, s => s.list_users())
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        dispatch!(self, s => s.count_users())
    }

    // ---- sessions ----

    pub async fn create_session(&self, session: Session) -> Result<(), AppError> {
        dispatch!(self, s => s.create_session(session))
    }

    pub async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        dispatch!(self, s => s.find_session(token_hash))
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), AppError> {
        dispatch!(self, s => s.delete_session(token_hash))
    }

    /// Removes sessions that expired at or before `now`; returns how many.
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        dispatch!(self, s => s.purge_expired_sessions(now))
    }

    // ---- customers ----

    /// Returns the total number of matches and the requested window,
    /// newest first.
    pub async fn list_customers(
        &self,
        scope: OwnerScope,
        filter: &CustomerFilter,
    ) -> Result<(usize, Vec<Customer>), AppError> {
        dispatch!(self, s => s.list_customers(scope, filter))
    }

    pub async fn get_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
    ) -> Result<Option<Customer>, AppError> {
        dispatch!(self, s => s.get_customer(scope, id))
    }

    pub async fn create_customer(
        &self,
        owner_id: Uuid,
        input: CustomerInput,
    ) -> Result<Customer, AppError> {
        dispatch!(self, s => s.create_customer(owner_id, input))
    }

    pub async fn update_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
        input: CustomerInput,
    ) -> Result<Option<Customer>, AppError> {
        dispatch!(self, s => s.update_customer(scope, id, input))
    }

    /// Deletes a customer and all of its leads.
    pub async fn delete_customer(&self, scope: OwnerScope, id: Uuid) -> Result<bool, AppError> {
        dispatch!(self, s => s.delete_customer(scope, id))
    }

    // ---- leads ----
    //
    // Lead operations trust that the caller already resolved `customer_id`
    // within its scope; they only guarantee a lead is never reached through
    // a different customer.

    pub async fn list_leads(
        &self,
        customer_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, AppError> {
        dispatch!(self, s => s.list_leads(customer_id, status))
    }

    pub async fn get_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Lead>, AppError> {
        dispatch!(self, s => s.get_lead(customer_id, lead_id))
    }

    pub async fn create_lead(&self, customer_id: Uuid, input: LeadInput) -> Result<Lead, AppError> {
        dispatch!(self, s => s.create_lead(customer_id, input))
    }

    pub async fn update_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        input: LeadInput,
    ) -> Result<Option<Lead>, AppError> {
        dispatch!(self, s => s.update_lead(customer_id, lead_id, input))
    }

    pub async fn set_lead_status(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        dispatch!(self, s => s.set_lead_status(customer_id, lead_id, status))
    }

    pub async fn delete_lead(&self, customer_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        dispatch!(self, s => s.delete_lead(customer_id, lead_id))
    }

    /// Every customer and lead visible in `scope`, for dashboard aggregation.
    pub async fn dashboard_data(
        &self,
        scope: OwnerScope,
    ) -> Result<(Vec<Customer>, Vec<Lead>), AppError> {
        dispatch!(self, s => s.dashboard_data(scope))
    }
}
