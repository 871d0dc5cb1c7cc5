//! Forgotten password: request a link, then choose a new password

use auth::{
    LOGIN_PATH, ResetError, Session,
    reset::RESET_PATH,
};
use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::views::page;
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewPassword {
    #[serde(default)]
    pub password: String,
}

/// Base url for links in outgoing mail
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(public_url) = &state.settings.public_url {
        return public_url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

pub async fn request_form(session: Session) -> impl IntoResponse {
    page(
        &session,
        "Reset your password",
        json!({
            "tagline": "If you already have an account but forgot your password, enter your email",
        }),
    )
}

pub async fn send_token(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<ResetRequest>,
) -> AppResult<Redirect> {
    match state
        .password_reset
        .issue(&form.email, &base_url(&state, &headers))
        .await
    {
        Ok(_) => session.flash_success("Check your email for instructions"),
        Err(e) if e.is_user_facing() => session.flash_error(e.to_string()),
        Err(e) => return Err(e.into()),
    }
    Ok(Redirect::to(LOGIN_PATH))
}

pub async fn reset_form(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> AppResult<Response> {
    match state.password_reset.validate(&token).await {
        Ok(_) => Ok(page(&session, "New password", json!({ "token": token })).into_response()),
        Err(ResetError::InvalidToken) => {
            session.flash_error(ResetError::InvalidToken.to_string());
            Ok(Redirect::to(RESET_PATH).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn save_password(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
    Form(form): Form<NewPassword>,
) -> AppResult<Redirect> {
    match state.password_reset.redeem(&token, &form.password).await {
        Ok(()) => {
            session.flash_success("Password updated");
            Ok(Redirect::to(LOGIN_PATH))
        }
        Err(ResetError::InvalidToken) => {
            session.flash_error(ResetError::InvalidToken.to_string());
            Ok(Redirect::to(RESET_PATH))
        }
        Err(ResetError::InvalidPassword(message)) => {
            session.flash_error(message);
            Ok(Redirect::to(&format!("{RESET_PATH}/{token}")))
        }
        Err(e) => Err(AppError::from(e)),
    }
}
