//! Repositories for database operations

pub mod user;

pub use user::{InMemoryUserRepository, PgUserRepository, UserRepository, UserStore};
