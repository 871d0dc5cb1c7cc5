//! Password reset flow
//!
//! `NoToken -> TokenIssued -> (Redeemed | Expired)`. A token is 20 random
//! bytes, hex encoded, valid for one hour from issue. Expired and unknown
//! tokens produce the same error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::error::RepositoryError;
use mockable::Clock;
use rand::RngCore;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    models::{ResetToken, User},
    password::{PasswordError, hash_password},
    repositories::UserStore,
    validation::{normalize_email, validate_password},
};

/// Random bytes in a reset token before hex encoding
pub const RESET_TOKEN_BYTES: usize = 20;

/// Lifetime of a reset token
pub const RESET_TOKEN_TTL_SECONDS: i64 = 3600;

/// Path prefix of the redemption form
pub const RESET_PATH: &str = "/reestablecer-password";

#[derive(Debug, Error)]
pub enum ResetError {
    // Leaks whether an account exists; kept until product decides otherwise.
    #[error("No account exists for that email")]
    UnknownAccount,

    #[error("The form is no longer valid, try again")]
    InvalidToken,

    #[error("{0}")]
    InvalidPassword(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl ResetError {
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ResetError::UnknownAccount | ResetError::InvalidToken | ResetError::InvalidPassword(_)
        )
    }
}

/// Message handed to the mail transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetEmail {
    pub recipient: String,
    pub subject: String,
    pub reset_url: String,
    pub template: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport unavailable: {0}")]
    Transport(String),
}

/// Outbound e-mail hook for reset links
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send(&self, email: ResetEmail) -> Result<(), MailError>;
}

/// Mailer that only logs the reset link
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send(&self, email: ResetEmail) -> Result<(), MailError> {
        info!(
            recipient = %email.recipient,
            template = %email.template,
            "Password reset link: {}",
            email.reset_url
        );
        Ok(())
    }
}

/// Issues and redeems password reset tokens
pub struct PasswordResetService {
    users: UserStore,
    mailer: Arc<dyn ResetMailer>,
    clock: Arc<dyn Clock + Send + Sync>,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        users: UserStore,
        mailer: Arc<dyn ResetMailer>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            users,
            mailer,
            clock,
            ttl: Duration::seconds(RESET_TOKEN_TTL_SECONDS),
        }
    }

    /// Generate a fresh hex token from a cryptographically secure RNG
    pub fn generate_token() -> String {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Issue a token for the account registered under `email` and mail the
    /// redemption link rooted at `base_url`
    pub async fn issue(&self, email: &str, base_url: &str) -> Result<ResetToken, ResetError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(ResetError::UnknownAccount);
        };

        let reset = ResetToken {
            token: Self::generate_token(),
            expires_at: self.clock.utc() + self.ttl,
        };
        self.users.store_reset_token(user.id, &reset).await?;
        info!("Issued password reset token for user {}", user.id);

        let message = ResetEmail {
            recipient: user.email.clone(),
            subject: "Password Reset".to_string(),
            reset_url: format!(
                "{}{}/{}",
                base_url.trim_end_matches('/'),
                RESET_PATH,
                reset.token
            ),
            template: "reset".to_string(),
        };
        // Delivery problems are not reported back to the requester.
        if let Err(e) = self.mailer.send(message).await {
            warn!("Failed to dispatch reset email for user {}: {}", user.id, e);
        }

        Ok(reset)
    }

    /// Resolve the user a live token belongs to
    pub async fn validate(&self, token: &str) -> Result<User, ResetError> {
        self.users
            .find_by_reset_token(token, self.clock.utc())
            .await?
            .ok_or(ResetError::InvalidToken)
    }

    /// Replace the password of the token holder and consume the token
    pub async fn redeem(&self, token: &str, new_password: &str) -> Result<(), ResetError> {
        let user = self.validate(token).await?;
        validate_password(new_password).map_err(ResetError::InvalidPassword)?;

        let password_hash = hash_password(new_password)?;
        if !self
            .users
            .complete_reset(token, self.clock.utc(), &password_hash)
            .await?
        {
            return Err(ResetError::InvalidToken);
        }

        info!("Password reset completed for user {}", user.id);
        Ok(())
    }
}
