//! Authentication for the devjobs job board
//!
//! Credential storage, session-backed sign in, the password reset token
//! lifecycle and the axum middleware that guards authenticated routes.

pub mod authenticator;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repositories;
pub mod reset;
pub mod session;
pub mod validation;

pub use authenticator::{AuthError, CredentialVerifier, LocalPasswordVerifier, SessionAuthenticator};
pub use middleware::{CurrentUser, LOGIN_PATH, require_auth, session_middleware};
pub use repositories::{InMemoryUserRepository, PgUserRepository, UserRepository, UserStore};
pub use reset::{LogMailer, PasswordResetService, ResetError, ResetMailer};
pub use session::{Session, SessionManager, SessionStore};
