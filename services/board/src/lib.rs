//! devjobs job board
//!
//! Authors publish vacancies, visitors apply with a PDF résumé and authors
//! review who applied. Authentication and sessions come from the `auth`
//! crate; this crate owns vacancies, uploads and the HTTP surface.

pub mod candidates;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod slug;
pub mod state;
pub mod upload;

pub use config::{SessionBackend, Settings};
pub use error::{AppError, AppResult};
pub use routes::create_router;
pub use state::AppState;
