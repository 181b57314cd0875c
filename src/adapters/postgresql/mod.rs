//! PostgreSQL submission store
//!
//! Schema: `migrations/001_batch_submissions.sql`, applied by
//! [`PostgreSQLClient::ensure_schema`].

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
