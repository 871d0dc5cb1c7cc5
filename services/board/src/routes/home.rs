//! Home page, search and health

use auth::Session;
use axum::{
    Form, Json,
    extract::State,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::views::page;
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub q: String,
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "board"
    }))
}

/// Every vacancy, newest first
pub async fn index(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let vacancies = state.vacancies.list_recent().await?;

    Ok(page(
        &session,
        "devJobs",
        json!({
            "tagline": "Find and post jobs for web developers",
            "search_bar": true,
            "vacancies": vacancies,
        }),
    ))
}

pub async fn search(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SearchForm>,
) -> AppResult<impl IntoResponse> {
    let vacancies = state.vacancies.search(&form.q).await?;
    tracing::debug!("Search for {:?} matched {} vacancies", form.q, vacancies.len());

    Ok(page(
        &session,
        format!("Results for: {}", form.q.trim()),
        json!({
            "search_bar": true,
            "query": form.q,
            "vacancies": vacancies,
        }),
    ))
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
