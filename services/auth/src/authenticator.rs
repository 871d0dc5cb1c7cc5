//! Credential verification and session sign in/out

use std::sync::Arc;

use async_trait::async_trait;
use common::error::RepositoryError;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    models::{LoginCredentials, User},
    password::{PasswordError, verify_password},
    repositories::UserStore,
    session::Session,
    validation::normalize_email,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Both fields are required")]
    MissingFields,

    /// Deliberately the same for an unknown email and a wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl AuthError {
    /// Whether the error should be shown to the user rather than logged
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AuthError::MissingFields | AuthError::InvalidCredentials)
    }
}

/// Strategy that turns submitted credentials into a known user
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credentials: &LoginCredentials) -> Result<User, AuthError>;
}

/// Email + password checked against the stored argon2 hash
pub struct LocalPasswordVerifier {
    users: UserStore,
}

impl LocalPasswordVerifier {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CredentialVerifier for LocalPasswordVerifier {
    async fn verify(&self, credentials: &LoginCredentials) -> Result<User, AuthError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if verify_password(&user.password_hash, &credentials.password)? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Signs users in and out of their session
#[derive(Clone)]
pub struct SessionAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
}

impl SessionAuthenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify `credentials` and, on success, bind the user to `session`
    pub async fn authenticate(
        &self,
        session: &Session,
        credentials: &LoginCredentials,
    ) -> Result<User, AuthError> {
        match self.verifier.verify(credentials).await {
            Ok(user) => {
                session.login(user.id);
                info!("User {} signed in", user.id);
                Ok(user)
            }
            Err(e) => {
                warn!("Sign in rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_authenticated(&self, session: &Session) -> bool {
        session.is_authenticated()
    }

    pub fn logout(&self, session: &Session) {
        if let Some(user_id) = session.user_id() {
            info!("User {} signed out", user_id);
        }
        session.logout();
    }
}
