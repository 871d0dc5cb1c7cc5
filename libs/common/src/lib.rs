//! Common library for the devjobs application
//!
//! This crate provides the storage plumbing shared by the authentication
//! and job board services: PostgreSQL pooling, the Redis client used by the
//! optional session backend, and the error types repositories report.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     assert!(health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
