//! Client-side cache of the customers and leads a user can see.
//!
//! `CrmState` keeps the last known server state so a front end can render
//! lists and charts without a round trip per view. Every mutation goes to the
//! server first and the cache is only updated with what the server returned.

use crate::client::CrmClient;
use crate::dashboard::{self, DashboardSummary};
use crate::errors::AppError;
use crate::models::{
    Customer, CustomerInput, CustomerListQuery, Lead, LeadInput, LeadStatus, User,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Page size used when pulling the full customer list.
const LOAD_PAGE_SIZE: u32 = 100;

pub struct CrmState {
    client: CrmClient,
    customers: Vec<Customer>,
    leads: HashMap<Uuid, Vec<Lead>>,
    loaded: bool,
}

impl CrmState {
    pub fn new(client: CrmClient) -> Self {
        Self {
            client,
            customers: Vec::new(),
            leads: HashMap::new(),
            loaded: false,
        }
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    pub fn current_user(&self) -> Option<User> {
        self.client.current_user()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn customer(&self, id: Uuid) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    /// Cached leads for a customer; empty until `load_leads` has run.
    pub fn leads(&self, customer_id: Uuid) -> &[Lead] {
        self.leads
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_leads(&self) -> Vec<Lead> {
        self.leads.values().flatten().cloned().collect()
    }

    // ============ Customers ============

    /// Replaces the cached customer list with every page from the server.
    pub async fn load_customers(&mut self) -> Result<&[Customer], AppError> {
        let mut customers = Vec::new();
        let mut page = 1;
        loop {
            let query = CustomerListQuery {
                search: None,
                page: Some(page),
                per_page: Some(LOAD_PAGE_SIZE),
            };
            let result = self.client.list_customers(&query).await?;
            let fetched = result.customers.len();
            customers.extend(result.customers);
            if fetched == 0 || customers.len() >= result.total {
                break;
            }
            page += 1;
        }

        tracing::debug!("Loaded {} customer(s)", customers.len());
        // Leads of customers that disappeared server-side go too
        self.leads
            .retain(|id, _| customers.iter().any(|c| c.id == *id));
        self.customers = customers;
        self.loaded = true;
        Ok(&self.customers)
    }

    pub async fn create_customer(&mut self, input: &CustomerInput) -> Result<Customer, AppError> {
        let customer = self.client.create_customer(input).await?;
        self.customers.insert(0, customer.clone());
        Ok(customer)
    }

    pub async fn update_customer(
        &mut self,
        id: Uuid,
        input: &CustomerInput,
    ) -> Result<Customer, AppError> {
        let customer = self.client.update_customer(id, input).await?;
        match self.customers.iter_mut().find(|c| c.id == id) {
            Some(cached) => *cached = customer.clone(),
            None => self.customers.insert(0, customer.clone()),
        }
        Ok(customer)
    }

    /// Deletes a customer along with its cached leads.
    pub async fn delete_customer(&mut self, id: Uuid) -> Result<(), AppError> {
        self.client.delete_customer(id).await?;
        self.customers.retain(|c| c.id != id);
        self.leads.remove(&id);
        Ok(())
    }

    // ============ Leads ============

    pub async fn load_leads(&mut self, customer_id: Uuid) -> Result<&[Lead], AppError> {
        let leads = self.client.list_leads(customer_id, None).await?;
        let slot = self.leads.entry(customer_id).or_default();
        *slot = leads;
        Ok(slot.as_slice())
    }

    /// Loads leads for every cached customer, fetching customers first if
    /// nothing has been loaded yet.
    pub async fn load_all_leads(&mut self) -> Result<usize, AppError> {
        if !self.loaded {
            self.load_customers().await?;
        }
        let ids: Vec<Uuid> = self.customers.iter().map(|c| c.id).collect();
        let mut total = 0;
        for id in ids {
            total += self.load_leads(id).await?.len();
        }
        Ok(total)
    }

    pub async fn create_lead(
        &mut self,
        customer_id: Uuid,
        input: &LeadInput,
    ) -> Result<Lead, AppError> {
        let lead = self.client.create_lead(customer_id, input).await?;
        self.leads
            .entry(customer_id)
            .or_default()
            .insert(0, lead.clone());
        Ok(lead)
    }

    pub async fn update_lead(
        &mut self,
        customer_id: Uuid,
        lead_id: Uuid,
        input: &LeadInput,
    ) -> Result<Lead, AppError> {
        let lead = self.client.update_lead(customer_id, lead_id, input).await?;
        self.replace_lead(lead.clone());
        Ok(lead)
    }

    pub async fn set_lead_status(
        &mut self,
        customer_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError> {
        let lead = self
            .client
            .set_lead_status(customer_id, lead_id, status)
            .await?;
        self.replace_lead(lead.clone());
        Ok(lead)
    }

    pub async fn delete_lead(&mut self, customer_id: Uuid, lead_id: Uuid) -> Result<(), AppError> {
        self.client.delete_lead(customer_id, lead_id).await?;
        if let Some(leads) = self.leads.get_mut(&customer_id) {
            leads.retain(|l| l.id != lead_id);
        }
        Ok(())
    }

    fn replace_lead(&mut self, lead: Lead) {
        let leads = self.leads.entry(lead.customer_id).or_default();
        match leads.iter_mut().find(|l| l.id == lead.id) {
            Some(cached) => *cached = lead,
            None => leads.insert(0, lead),
        }
    }

    // ============ Dashboard ============

    /// Dashboard figures computed from the cache alone.
    pub fn summary(&self, now: DateTime<Utc>) -> DashboardSummary {
        dashboard::summarize(&self.customers, &self.all_leads(), now)
    }

    /// Logs out and drops everything cached for the previous user.
    pub async fn logout(&mut self) -> Result<(), AppError> {
        let result = self.client.logout().await;
        self.reset();
        result
    }

    pub fn reset(&mut self) {
        self.customers.clear();
        self.leads.clear();
        self.loaded = false;
    }
}
