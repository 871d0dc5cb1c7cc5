//! Vacancy ownership checks

use auth::models::User;

use crate::{error::AppError, models::Vacancy};

/// Whether `user` authored `vacancy`. A vacancy without an author belongs to nobody.
pub fn is_owner(vacancy: &Vacancy, user: &User) -> bool {
    vacancy.author_id.is_some_and(|author_id| author_id == user.id)
}

/// Fail with [`AppError::Forbidden`] unless `user` authored `vacancy`
pub fn ensure_owner(vacancy: &Vacancy, user: &User) -> Result<(), AppError> {
    if is_owner(vacancy, user) {
        Ok(())
    } else {
        tracing::warn!(
            "User {} attempted to modify vacancy {} owned by someone else",
            user.id,
            vacancy.id
        );
        Err(AppError::Forbidden)
    }
}
