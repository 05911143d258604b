//! CRM API Library
//!
//! Customers, their leads and a dashboard summary for authenticated CRM
//! users, served over HTTP with either an in-memory mock store or
//! PostgreSQL behind it, plus a typed client for the same API.
//!
//! # Modules
//!
//! - `api`: HTTP handlers, grouped.
//! - `core`: Domain models, validation and dashboard aggregation.
//! - `data`: Storage backends.
//! - `integrations`: API client and client-side state.
//! - `app`: Store bootstrap and router assembly.
//! - `auth`: Password hashing, session tokens and the auth extractor.
//! - `auth_handlers`: Register, login, logout and user endpoints.
//! - `circuit_breaker`: Circuit breaker around database calls.
//! - `client`: Typed HTTP client for the API.
//! - `client_state`: Cached customers and leads for a front end.
//! - `config`: Configuration management.
//! - `dashboard`: Dashboard aggregation.
//! - `db`: Database connection, pool and schema.
//! - `errors`: Error handling types.
//! - `handlers`: Customer, lead and dashboard endpoints.
//! - `memory_store`: In-memory mock backend.
//! - `models`: Core data models.
//! - `openapi`: OpenAPI document.
//! - `pg_store`: PostgreSQL backend.
//! - `store`: Backend dispatch and ownership scoping.
//! - `token_store`: Client-side token persistence.
//! - `validation`: Field validation and normalization.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod app;
pub mod auth;
pub mod auth_handlers;
pub mod circuit_breaker;
pub mod client;
pub mod client_state;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod openapi;
pub mod pg_store;
pub mod store;
pub mod token_store;
pub mod validation;
