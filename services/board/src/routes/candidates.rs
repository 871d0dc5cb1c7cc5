//! Résumé submission and the author's candidate list

use auth::{CurrentUser, Session};
use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use uuid::Uuid;

use super::views::{page, signed_in};
use crate::{
    candidates::{self, RESUME_FIELD},
    error::{AppError, AppResult},
    guard::is_owner,
    slug::is_valid_slug,
    state::AppState,
    upload::receive,
};

/// Accept a résumé for the vacancy at `url`.
///
/// Problems with the form are flashed and the visitor is sent back to the vacancy.
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    Path(url): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    if !is_valid_slug(&url) {
        return Err(AppError::NotFound);
    }
    let back = Redirect::to(&format!("/vacantes/{url}"));
    let config = &state.uploads.resumes;

    let form = match receive(multipart, RESUME_FIELD, config).await {
        Ok(form) => form,
        Err(e) if e.is_user_facing() => {
            session.flash_error(e.to_string());
            return Ok(back.into_response());
        }
        Err(e) => return Err(e.into()),
    };

    match candidates::submit(&state.vacancies, config, &url, form).await {
        Ok(_) => {
            session.flash_success("Your résumé was sent");
            Ok(Redirect::to("/").into_response())
        }
        Err(AppError::Validation(errors)) => {
            for error in errors {
                session.flash_error(error);
            }
            Ok(back.into_response())
        }
        Err(AppError::Upload(e)) if e.is_user_facing() => {
            session.flash_error(e.to_string());
            Ok(back.into_response())
        }
        Err(e) => Err(e),
    }
}

/// Candidates of a vacancy; anyone but the author gets a 404
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let vacancy = state
        .vacancies
        .find_by_id(id)
        .await?
        .filter(|vacancy| is_owner(vacancy, &user))
        .ok_or(AppError::NotFound)?;

    Ok(page(
        &session,
        format!("Candidates - {}", vacancy.title),
        json!({
            "user": signed_in(&user),
            "candidates": vacancy.candidates,
        }),
    ))
}
