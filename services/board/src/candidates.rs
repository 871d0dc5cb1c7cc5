//! Résumé submission for a vacancy

use auth::validation::{normalize_email, validate_email, validate_name};
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::Candidate,
    repositories::VacancyStore,
    upload::{self, UploadConfig, UploadError, UploadForm},
};

/// Multipart field carrying the résumé
pub const RESUME_FIELD: &str = "cv";

/// Attach the candidate described by `form` to the vacancy at `url`.
///
/// The résumé is written to disk only after every other check passed and is
/// removed again if the vacancy cannot take the candidate.
pub async fn submit(
    vacancies: &VacancyStore,
    config: &UploadConfig,
    url: &str,
    form: UploadForm,
) -> Result<Candidate, AppError> {
    if vacancies.find_by_url(url).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let name = form.field("name").trim().to_string();
    let email = normalize_email(form.field("email"));
    let errors: Vec<String> = [validate_name(&name), validate_email(&email)]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let file = form.file.ok_or(UploadError::MissingFile)?;
    let resume = file.store(config).await?;
    let candidate = Candidate {
        name,
        email,
        resume,
    };

    match vacancies.append_candidate(url, &candidate).await {
        Ok(true) => {
            info!("Candidate {} applied to vacancy {}", candidate.email, url);
            Ok(candidate)
        }
        Ok(false) => {
            discard(config, &candidate.resume).await;
            Err(AppError::NotFound)
        }
        Err(e) => {
            discard(config, &candidate.resume).await;
            Err(e.into())
        }
    }
}

async fn discard(config: &UploadConfig, file_name: &str) {
    if let Err(e) = upload::remove(config, file_name).await {
        warn!("Failed to remove orphaned résumé {}: {}", file_name, e);
    }
}
