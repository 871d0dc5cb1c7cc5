//! Vacancy pages: create, show, edit and delete

use auth::{CurrentUser, Session};
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use common::error::RepositoryError;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::views::{form_errors, page, signed_in};
use crate::{
    error::{AppError, AppResult},
    guard::ensure_owner,
    models::{NewVacancy, Vacancy, VacancyForm},
    slug::{is_valid_slug, vacancy_url},
    state::AppState,
};

// A fresh random suffix makes a second collision very unlikely.
const URL_ATTEMPTS: usize = 3;

fn vacancy_path(vacancy: &Vacancy) -> String {
    format!("/vacantes/{}", vacancy.url)
}

async fn find_by_url(state: &AppState, url: &str) -> AppResult<Vacancy> {
    if !is_valid_slug(url) {
        return Err(AppError::NotFound);
    }
    state
        .vacancies
        .find_by_url(url)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn new_form(CurrentUser(user): CurrentUser, session: Session) -> impl IntoResponse {
    page(
        &session,
        "New vacancy",
        json!({
            "tagline": "Fill in the form and publish your vacancy",
            "user": signed_in(&user),
        }),
    )
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Form(form): Form<VacancyForm>,
) -> AppResult<Response> {
    let fields = match form.validate() {
        Ok(fields) => fields,
        Err(errors) => {
            return Ok(form_errors(
                &session,
                "New vacancy",
                errors,
                json!({ "user": signed_in(&user), "form": form }),
            ));
        }
    };

    let mut attempt = 0;
    let vacancy = loop {
        attempt += 1;
        let new_vacancy = NewVacancy {
            url: vacancy_url(&fields.title),
            author_id: user.id,
            fields: fields.clone(),
        };
        match state.vacancies.create(&new_vacancy).await {
            Ok(vacancy) => break vacancy,
            Err(RepositoryError::Conflict(_)) if attempt < URL_ATTEMPTS => {
                warn!("Vacancy url {} already taken, retrying", new_vacancy.url);
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!("User {} published vacancy {}", user.id, vacancy.url);
    Ok(Redirect::to(&vacancy_path(&vacancy)).into_response())
}

pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(url): Path<String>,
) -> AppResult<impl IntoResponse> {
    let vacancy = find_by_url(&state, &url).await?;

    let author = match vacancy.author_id {
        Some(author_id) => state.users.find_by_id(author_id).await?,
        None => None,
    };
    let author = author.map(|author| {
        json!({
            "name": author.name,
            "email": author.email,
            "image": author.profile_image,
        })
    });

    Ok(page(
        &session,
        vacancy.title.clone(),
        json!({
            "search_bar": true,
            "vacancy": vacancy,
            "author": author,
        }),
    ))
}

pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(url): Path<String>,
) -> AppResult<impl IntoResponse> {
    let vacancy = find_by_url(&state, &url).await?;
    ensure_owner(&vacancy, &user)?;

    let form = VacancyForm {
        title: vacancy.title.clone(),
        company: vacancy.company.clone(),
        location: vacancy.location.clone(),
        salary: vacancy.salary.clone().unwrap_or_default(),
        contract_type: vacancy.contract_type.clone(),
        description: vacancy.description.clone().unwrap_or_default(),
        skills: vacancy.skills.join(","),
    };

    Ok(page(
        &session,
        format!("Edit - {}", vacancy.title),
        json!({
            "user": signed_in(&user),
            "vacancy": vacancy,
            "form": form,
        }),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(url): Path<String>,
    Form(form): Form<VacancyForm>,
) -> AppResult<Response> {
    let vacancy = find_by_url(&state, &url).await?;
    ensure_owner(&vacancy, &user)?;

    let fields = match form.validate() {
        Ok(fields) => fields,
        Err(errors) => {
            return Ok(form_errors(
                &session,
                format!("Edit - {}", vacancy.title),
                errors,
                json!({ "user": signed_in(&user), "vacancy": vacancy, "form": form }),
            ));
        }
    };

    let updated = state
        .vacancies
        .replace(&url, &fields)
        .await?
        .ok_or(AppError::NotFound)?;

    info!("User {} updated vacancy {}", user.id, updated.url);
    Ok(Redirect::to(&vacancy_path(&updated)).into_response())
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let vacancy = state
        .vacancies
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_owner(&vacancy, &user)?;

    if !state.vacancies.delete(id).await? {
        return Err(AppError::NotFound);
    }

    info!("User {} deleted vacancy {}", user.id, id);
    Ok((StatusCode::OK, "Vacancy deleted"))
}
