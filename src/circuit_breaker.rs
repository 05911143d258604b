use crate::errors::AppError;
use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::futures::CircuitBreaker as _;
use failsafe::{Config, StateMachine};
use std::future::Future;
use std::time::Duration;

/// Circuit breaker guarding PostgreSQL queries.
pub type DbCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for database operations to prevent cascading failures.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, queries pass through.
/// - **OPEN**: Too many failures, queries fail fast with `ServiceUnavailable`.
/// - **HALF_OPEN**: Testing if the database recovered.
pub fn create_db_circuit_breaker() -> DbCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// SQLSTATE for `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Whether an error says the database is unhealthy, as opposed to a
/// request the database correctly refused.
///
/// Constraint violations and missing rows are caused by the caller and
/// must not trip the breaker.
pub fn is_infrastructure_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::RowNotFound => false,
        sqlx::Error::Database(db_err) => {
            let refused = db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_check_violation()
                || db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE);
            !refused
        }
        _ => true,
    }
}

/// Runs a query future through the breaker, mapping rejections to 503.
pub async fn guarded<T, F>(breaker: &DbCircuitBreaker, query: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match breaker.call_with(is_infrastructure_failure, query).await {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(AppError::DatabaseError(e)),
        Err(failsafe::Error::Rejected) => {
            tracing::warn!("Database circuit breaker is open, rejecting query");
            Err(AppError::ServiceUnavailable(
                "Database circuit breaker is open".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    /// Database error carrying only a SQLSTATE code.
    #[derive(Debug)]
    struct SqlState(&'static str);

    impl fmt::Display for SqlState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl StdError for SqlState {}

    impl DatabaseError for SqlState {
        fn message(&self) -> &str {
            self.0
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                "23505" => ErrorKind::UniqueViolation,
                "23503" => ErrorKind::ForeignKeyViolation,
                "23514" => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(SqlState(code)))
    }

    #[test]
    fn test_refused_writes_are_not_infrastructure_failures() {
        for code in ["23505", "23503", "23514", NUMERIC_OUT_OF_RANGE] {
            assert!(!is_infrastructure_failure(&db_error(code)), "{}", code);
        }
        assert!(!is_infrastructure_failure(&sqlx::Error::RowNotFound));
        assert!(is_infrastructure_failure(&db_error("57P01")));
        assert!(is_infrastructure_failure(&sqlx::Error::PoolTimedOut));
    }

    #[tokio::test]
    async fn test_duplicate_writes_keep_circuit_closed() {
        let cb = create_db_circuit_breaker();

        for _ in 0..10 {
            let result: Result<(), AppError> =
                guarded(&cb, async { Err(db_error("23505")) }).await;
            assert!(matches!(result, Err(AppError::DatabaseError(_))));
        }

        let result = guarded(&cb, async { Ok::<i32, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = create_db_circuit_breaker();

        // Simulate 5 consecutive failures
        for _ in 0..5 {
            let result: Result<(), AppError> =
                guarded(&cb, async { Err(sqlx::Error::PoolTimedOut) }).await;
            assert!(matches!(result, Err(AppError::DatabaseError(_))));
        }

        // Next call should be rejected without running the query
        let result: Result<(), AppError> = guarded(&cb, async { Ok(()) }).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_allows_success() {
        let cb = create_db_circuit_breaker();

        let result = guarded(&cb, async { Ok::<i32, sqlx::Error>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }
}
