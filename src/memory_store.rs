//! In-memory mock store.
//!
//! Backs the API when no database is configured. All maps live behind one
//! `tokio::sync::RwLock` so a customer delete and its lead cascade are a
//! single critical section.

use crate::errors::AppError;
use crate::models::{
    Customer, CustomerInput, Lead, LeadInput, LeadStatus, Role, Session, User, UserRecord,
};
use crate::store::{CustomerFilter, NewUser, OwnerScope};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryData {
    users: HashMap<Uuid, UserRecord>,
    sessions: HashMap<String, Session>,
    customers: HashMap<Uuid, Customer>,
    leads: HashMap<Uuid, Lead>,
}

impl MemoryData {
    fn visible_customers(&self, scope: OwnerScope) -> Vec<Customer> {
        let mut customers: Vec<Customer> = self
            .customers
            .values()
            .filter(|c| scope.allows(c.owner_id))
            .cloned()
            .collect();
        sort_newest_first(&mut customers, |c| (c.created_at, c.id));
        customers
    }
}

fn sort_newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- users ----

    pub async fn create_user(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let mut data = self.data.write().await;

        if data.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "A user with email {} already exists",
                user.email
            )));
        }

        let role = user.role.unwrap_or(if data.users.is_empty() {
            Role::Admin
        } else {
            Role::User
        });

        let record = UserRecord {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        data.users.insert(record.id, record.clone());
        Ok(record)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let data = self.data.read().await;
        Ok(data.users.values().find(|u| u.email == email).cloned())
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let data = self.data.read().await;
        let mut users: Vec<User> = data.users.values().map(UserRecord::public).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        Ok(self.data.read().await.users.len() as i64)
    }

    // ---- sessions ----

    pub async fn create_session(&self, session: Session) -> Result<(), AppError> {
        let mut data = self.data.write().await;
        data.sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    pub async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        Ok(self.data.read().await.sessions.get(token_hash).cloned())
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), AppError> {
        self.data.write().await.sessions.remove(token_hash);
        Ok(())
    }

    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut data = self.data.write().await;
        let before = data.sessions.len();
        data.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - data.sessions.len()) as u64)
    }

    // ---- customers ----

    pub async fn list_customers(
        &self,
        scope: OwnerScope,
        filter: &CustomerFilter,
    ) -> Result<(usize, Vec<Customer>), AppError> {
        let data = self.data.read().await;
        let matching: Vec<Customer> = data
            .visible_customers(scope)
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok((total, page))
    }

    pub async fn get_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
    ) -> Result<Option<Customer>, AppError> {
        let data = self.data.read().await;
        Ok(data
            .customers
            .get(&id)
            .filter(|c| scope.allows(c.owner_id))
            .cloned())
    }

    pub async fn create_customer(
        &self,
        owner_id: Uuid,
        input: CustomerInput,
    ) -> Result<Customer, AppError> {
        let customer = Customer {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            company: input.company,
            owner_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.data
            .write()
            .await
            .customers
            .insert(customer.id, customer.clone());
        Ok(customer)
    }

    pub async fn update_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
        input: CustomerInput,
    ) -> Result<Option<Customer>, AppError> {
        let mut data = self.data.write().await;
        let Some(customer) = data
            .customers
            .get_mut(&id)
            .filter(|c| scope.allows(c.owner_id))
        else {
            return Ok(None);
        };

        customer.name = input.name;
        customer.email = input.email;
        customer.phone = input.phone;
        customer.company = input.company;
        customer.updated_at = Some(Utc::now());
        Ok(Some(customer.clone()))
    }

    pub async fn delete_customer(&self, scope: OwnerScope, id: Uuid) -> Result<bool, AppError> {
        let mut data = self.data.write().await;
        let visible = data
            .customers
            .get(&id)
            .map(|c| scope.allows(c.owner_id))
            .unwrap_or(false);
        if !visible {
            return Ok(false);
        }

        data.customers.remove(&id);
        let before = data.leads.len();
        data.leads.retain(|_, lead| lead.customer_id != id);
        tracing::debug!(
            "Deleted customer {} and {} lead(s)",
            id,
            before - data.leads.len()
        );
        Ok(true)
    }

    // ---- leads ----

    pub async fn list_leads(
        &self,
        customer_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, AppError> {
        let data = self.data.read().await;
        let mut leads: Vec<Lead> = data
            .leads
            .values()
            .filter(|l| l.customer_id == customer_id)
            .filter(|l| status.map(|s| l.status == s).unwrap_or(true))
            .cloned()
            .collect();
        sort_newest_first(&mut leads, |l| (l.created_at, l.id));
        Ok(leads)
    }

    pub async fn get_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Lead>, AppError> {
        let data = self.data.read().await;
        Ok(data
            .leads
            .get(&lead_id)
            .filter(|l| l.customer_id == customer_id)
            .cloned())
    }

    pub async fn create_lead(&self, customer_id: Uuid, input: LeadInput) -> Result<Lead, AppError> {
        let mut data = self.data.write().await;
        if !data.customers.contains_key(&customer_id) {
            return Err(AppError::NotFound(format!(
                "Customer with id {} not found",
                customer_id
            )));
        }

        let lead = Lead {
            id: Uuid::new_v4(),
            customer_id,
            title: input.title,
            description: input.description,
            status: input.status.unwrap_or(LeadStatus::New),
            value: input.value,
            created_at: Utc::now(),
            updated_at: None,
        };
        data.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    pub async fn update_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        input: LeadInput,
    ) -> Result<Option<Lead>, AppError> {
        let mut data = self.data.write().await;
        let Some(lead) = data
            .leads
            .get_mut(&lead_id)
            .filter(|l| l.customer_id == customer_id)
        else {
            return Ok(None);
        };

        lead.title = input.title;
        lead.description = input.description;
        if let Some(status) = input.status {
            lead.status = status;
        }
        lead.value = input.value;
        lead.updated_at = Some(Utc::now());
        Ok(Some(lead.clone()))
    }

    pub async fn set_lead_status(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        let mut data = self.data.write().await;
        let Some(lead) = data
            .leads
            .get_mut(&lead_id)
            .filter(|l| l.customer_id == customer_id)
        else {
            return Ok(None);
        };

        lead.status = status;
        lead.updated_at = Some(Utc::now());
        Ok(Some(lead.clone()))
    }

    pub async fn delete_lead(&self, customer_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let mut data = self.data.write().await;
        let owned = data
            .leads
            .get(&lead_id)
            .map(|l| l.customer_id == customer_id)
            .unwrap_or(false);
        if owned {
            data.leads.remove(&lead_id);
        }
        Ok(owned)
    }

    pub async fn dashboard_data(
        &self,
        scope: OwnerScope,
    ) -> Result<(Vec<Customer>, Vec<Lead>), AppError> {
        let data = self.data.read().await;
        let customers = data.visible_customers(scope);
        let leads = data
            .leads
            .values()
            .filter(|l| customers.iter().any(|c| c.id == l.customer_id))
            .cloned()
            .collect();
        Ok((customers, leads))
    }

    /// Populates an empty store with an admin account and sample customers.
    ///
    /// Does nothing if any user already exists.
    pub async fn seed_demo_data(&self, admin: NewUser) -> Result<(), AppError> {
        let mut data = self.data.write().await;
        if !data.users.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let admin = UserRecord {
            id: Uuid::new_v4(),
            name: admin.name,
            email: admin.email,
            role: Role::Admin,
            password_hash: admin.password_hash,
            created_at: now,
        };

        let samples: [(&str, &str, Option<&str>, i64, &[(&str, LeadStatus, &str)]); 4] = [
            (
                "Ada Lovelace",
                "ada@analytical.io",
                Some("Analytical Engines Ltd"),
                150,
                &[
                    ("Engine maintenance plan", LeadStatus::Converted, "12000.00"),
                    ("Difference engine upgrade", LeadStatus::Contacted, "4500.00"),
                ],
            ),
            (
                "Grace Hopper",
                "grace@cobol.dev",
                Some("Compiler Works"),
                75,
                &[("Compiler licensing", LeadStatus::New, "8000.00")],
            ),
            (
                "Alan Turing",
                "alan@bletchley.uk",
                None,
                30,
                &[
                    ("Cipher consulting", LeadStatus::Lost, "2500.00"),
                    ("Training workshop", LeadStatus::New, "1200.00"),
                ],
            ),
            ("Katherine Johnson", "katherine@orbit.space", Some("Orbital Math"), 5, &[]),
        ];

        for (name, email, company, age_days, leads) in samples {
            let created_at = now - Duration::days(age_days);
            let customer = Customer {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                phone: None,
                company: company.map(str::to_string),
                owner_id: admin.id,
                created_at,
                updated_at: None,
            };
            for (title, status, value) in leads {
                let lead = Lead {
                    id: Uuid::new_v4(),
                    customer_id: customer.id,
                    title: title.to_string(),
                    description: None,
                    status: *status,
                    value: BigDecimal::from_str(value)
                        .map_err(|e| AppError::InternalError(format!("bad seed value: {}", e)))?,
                    created_at,
                    updated_at: None,
                };
                data.leads.insert(lead.id, lead);
            }
            data.customers.insert(customer.id, customer);
        }

        tracing::info!(
            "Seeded demo data: admin {} with {} customers",
            admin.email,
            data.customers.len()
        );
        data.users.insert(admin.id, admin);
        Ok(())
    }
}
