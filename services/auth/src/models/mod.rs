//! Authentication service models

pub mod session;
pub mod user;

// Re-export for convenience
pub use session::{FlashKind, FlashMessage, SessionRecord};
pub use user::{LoginCredentials, NewUser, ResetToken, UpdateUser, User};
