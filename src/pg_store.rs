use crate::circuit_breaker::{create_db_circuit_breaker, guarded, DbCircuitBreaker};
use crate::errors::{AppError, ResultExt};
use crate::models::{
    Customer, CustomerInput, Lead, LeadInput, LeadStatus, Session, User, UserRecord,
};
use crate::store::{CustomerFilter, NewUser, OwnerScope};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed store. Every query runs through a shared circuit breaker.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    breaker: DbCircuitBreaker,
}

/// Escapes LIKE metacharacters and wraps the needle for a contains match.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn map_write_error(err: AppError, conflict: &str, missing: &str) -> AppError {
    if let AppError::DatabaseError(ref e) = err {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict(conflict.to_string());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::NotFound(missing.to_string());
            }
        }
    }
    err
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            breaker: create_db_circuit_breaker(),
        }
    }

    // ---- users ----

    pub async fn create_user(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let conflict = format!("A user with email {} already exists", user.email);
        guarded(
            &self.breaker,
            sqlx::query_as::<_, UserRecord>(
                r#"
                INSERT INTO crm_users (id, name, email, role, password_hash, created_at)
                VALUES (
                    $1, $2, $3,
                    COALESCE($4, CASE WHEN EXISTS (SELECT 1 FROM crm_users) THEN 'User' ELSE 'Admin' END),
                    $5, now()
                )
                RETURNING id, name, email, role, password_hash, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.map(|r| r.as_str()))
            .bind(&user.password_hash)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| map_write_error(e, &conflict, "user"))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, UserRecord>(
                "SELECT id, name, email, role, password_hash, created_at FROM crm_users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, UserRecord>(
                "SELECT id, name, email, role, password_hash, created_at FROM crm_users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let records = guarded(
            &self.breaker,
            sqlx::query_as::<_, UserRecord>(
                "SELECT id, name, email, role, password_hash, created_at FROM crm_users ORDER BY created_at, email",
            )
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(records.iter().map(UserRecord::public).collect())
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crm_users").fetch_one(&self.pool),
        )
        .await
    }

    // ---- sessions ----

    pub async fn create_session(&self, session: Session) -> Result<(), AppError> {
        guarded(
            &self.breaker,
            sqlx::query(
                r#"
                INSERT INTO crm_sessions (token_hash, user_id, persistence, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&session.token_hash)
            .bind(session.user_id)
            .bind(session.persistence.as_str())
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn find_session(&self, token_hash: &str) -> Result<Option<Session>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Session>(
                "SELECT token_hash, user_id, persistence, created_at, expires_at FROM crm_sessions WHERE token_hash = $1",
            )
            .bind(token_hash)
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), AppError> {
        guarded(
            &self.breaker,
            sqlx::query("DELETE FROM crm_sessions WHERE token_hash = $1")
                .bind(token_hash)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = guarded(
            &self.breaker,
            sqlx::query("DELETE FROM crm_sessions WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await
        .context("purging expired sessions")?;
        Ok(result.rows_affected())
    }

    // ---- customers ----

    pub async fn list_customers(
        &self,
        scope: OwnerScope,
        filter: &CustomerFilter,
    ) -> Result<(usize, Vec<Customer>), AppError> {
        let owner = scope.owner_id();
        let pattern = filter.search.as_deref().map(like_pattern);

        let where_clause = r#"
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL
                   OR lower(name) LIKE $2
                   OR lower(email) LIKE $2
                   OR lower(coalesce(company, '')) LIKE $2)
        "#;

        let count_sql = format!("SELECT COUNT(*) FROM crm_customers {}", where_clause);
        let total: i64 = guarded(
            &self.breaker,
            sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(owner)
                .bind(pattern.as_deref())
                .fetch_one(&self.pool),
        )
        .await?;

        let page_sql = format!(
            "SELECT * FROM crm_customers {} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            where_clause
        );
        let customers = guarded(
            &self.breaker,
            sqlx::query_as::<_, Customer>(&page_sql)
                .bind(owner)
                .bind(pattern.as_deref())
                .bind(filter.limit as i64)
                .bind(filter.offset as i64)
                .fetch_all(&self.pool),
        )
        .await?;

        Ok((total.max(0) as usize, customers))
    }

    pub async fn get_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
    ) -> Result<Option<Customer>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Customer>(
                "SELECT * FROM crm_customers WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
            )
            .bind(id)
            .bind(scope.owner_id())
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn create_customer(
        &self,
        owner_id: Uuid,
        input: CustomerInput,
    ) -> Result<Customer, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Customer>(
                r#"
                INSERT INTO crm_customers (id, name, email, phone, company, owner_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.company)
            .bind(owner_id)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| map_write_error(e, "customer already exists", "owner not found"))
    }

    pub async fn update_customer(
        &self,
        scope: OwnerScope,
        id: Uuid,
        input: CustomerInput,
    ) -> Result<Option<Customer>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Customer>(
                r#"
                UPDATE crm_customers
                SET name = $3, email = $4, phone = $5, company = $6, updated_at = now()
                WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(scope.owner_id())
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.company)
            .fetch_optional(&self.pool),
        )
        .await
    }

    /// Leads go with the customer through `ON DELETE CASCADE`.
    pub async fn delete_customer(&self, scope: OwnerScope, id: Uuid) -> Result<bool, AppError> {
        let result = guarded(
            &self.breaker,
            sqlx::query(
                "DELETE FROM crm_customers WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
            )
            .bind(id)
            .bind(scope.owner_id())
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- leads ----

    pub async fn list_leads(
        &self,
        customer_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>(
                r#"
                SELECT * FROM crm_leads
                WHERE customer_id = $1 AND ($2::text IS NULL OR status = $2)
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .bind(customer_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool),
        )
        .await
    }

    pub async fn get_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Lead>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>("SELECT * FROM crm_leads WHERE id = $1 AND customer_id = $2")
                .bind(lead_id)
                .bind(customer_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn create_lead(&self, customer_id: Uuid, input: LeadInput) -> Result<Lead, AppError> {
        let missing = format!("Customer with id {} not found", customer_id);
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>(
                r#"
                INSERT INTO crm_leads (id, customer_id, title, description, status, value, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(customer_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.status.unwrap_or(LeadStatus::New).as_str())
            .bind(&input.value)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| map_write_error(e, "lead already exists", &missing))
    }

    pub async fn update_lead(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        input: LeadInput,
    ) -> Result<Option<Lead>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>(
                r#"
                UPDATE crm_leads
                SET title = $3,
                    description = $4,
                    status = COALESCE($5, status),
                    value = $6,
                    updated_at = now()
                WHERE id = $1 AND customer_id = $2
                RETURNING *
                "#,
            )
            .bind(lead_id)
            .bind(customer_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.status.map(|s| s.as_str()))
            .bind(&input.value)
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn set_lead_status(
        &self,
        customer_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>(
                r#"
                UPDATE crm_leads SET status = $3, updated_at = now()
                WHERE id = $1 AND customer_id = $2
                RETURNING *
                "#,
            )
            .bind(lead_id)
            .bind(customer_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn delete_lead(&self, customer_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let result = guarded(
            &self.breaker,
            sqlx::query("DELETE FROM crm_leads WHERE id = $1 AND customer_id = $2")
                .bind(lead_id)
                .bind(customer_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn dashboard_data(
        &self,
        scope: OwnerScope,
    ) -> Result<(Vec<Customer>, Vec<Lead>), AppError> {
        let owner = scope.owner_id();
        let customers = guarded(
            &self.breaker,
            sqlx::query_as::<_, Customer>(
                "SELECT * FROM crm_customers WHERE ($1::uuid IS NULL OR owner_id = $1) ORDER BY created_at DESC, id DESC",
            )
            .bind(owner)
            .fetch_all(&self.pool),
        )
        .await
        .context("loading dashboard customers")?;

        let leads = guarded(
            &self.breaker,
            sqlx::query_as::<_, Lead>(
                r#"
                SELECT l.* FROM crm_leads l
                JOIN crm_customers c ON c.id = l.customer_id
                WHERE ($1::uuid IS NULL OR c.owner_id = $1)
                ORDER BY l.created_at DESC, l.id DESC
                "#,
            )
            .bind(owner)
            .fetch_all(&self.pool),
        )
        .await
        .with_context(|| format!("loading dashboard leads for {:?}", scope))?;

        Ok((customers, leads))
    }
}
