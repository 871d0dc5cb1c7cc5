//! Registration, sign in/out, admin panel and profile

use auth::{
    CurrentUser, LOGIN_PATH, Session,
    models::{LoginCredentials, NewUser, UpdateUser},
    password::hash_password,
    validation::{Registration, normalize_email, validate_email, validate_name, validate_password},
};
use axum::{
    Form,
    extract::{Multipart, State},
    response::{IntoResponse, Redirect, Response},
};
use common::error::RepositoryError;
use serde_json::json;
use tracing::{info, warn};

use super::views::{form_errors, page, signed_in};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    upload::{self, receive},
};

/// Where a successful sign in lands
pub const PANEL_PATH: &str = "/administracion";

const PROFILE_PATH: &str = "/editar-perfil";
const IMAGE_FIELD: &str = "image";
const EMAIL_TAKEN: &str = "That email is already registered";

pub async fn register_form(session: Session) -> impl IntoResponse {
    page(
        &session,
        "Create your devJobs account",
        json!({ "tagline": "Start publishing your vacancies for free" }),
    )
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<Registration>,
) -> AppResult<Response> {
    let title = "Create your devJobs account";
    let echo = json!({ "form": { "name": form.name, "email": form.email } });

    if let Err(errors) = form.validate() {
        return Ok(form_errors(&session, title, errors, echo));
    }

    let password_hash = hash_password(&form.password).map_err(anyhow::Error::from)?;
    let new_user = NewUser {
        name: form.name.trim().to_string(),
        email: normalize_email(&form.email),
        password_hash,
    };

    match state.users.create(&new_user).await {
        Ok(user) => {
            info!("Registered user {}", user.id);
            session.flash_success("Account created, you can sign in now");
            Ok(Redirect::to(LOGIN_PATH).into_response())
        }
        Err(RepositoryError::Conflict(_)) => Ok(form_errors(
            &session,
            title,
            vec![EMAIL_TAKEN.to_string()],
            echo,
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn login_form(session: Session) -> impl IntoResponse {
    page(&session, "Sign in to devJobs", json!({}))
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(credentials): Form<LoginCredentials>,
) -> AppResult<Redirect> {
    match state.authenticator.authenticate(&session, &credentials).await {
        Ok(_) => Ok(Redirect::to(PANEL_PATH)),
        Err(e) if e.is_user_facing() => {
            session.flash_error(e.to_string());
            Ok(Redirect::to(LOGIN_PATH))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(State(state): State<AppState>, session: Session) -> Redirect {
    state.authenticator.logout(&session);
    session.flash_success("You signed out");
    Redirect::to(LOGIN_PATH)
}

pub async fn panel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let vacancies = state.vacancies.list_by_author(user.id).await?;

    Ok(page(
        &session,
        "Admin panel",
        json!({
            "tagline": "Create and manage your vacancies from here",
            "user": signed_in(&user),
            "vacancies": vacancies,
        }),
    ))
}

pub async fn profile_form(CurrentUser(user): CurrentUser, session: Session) -> impl IntoResponse {
    page(
        &session,
        "Edit your profile",
        json!({
            "user": signed_in(&user),
            "form": { "name": user.name, "email": user.email },
        }),
    )
}

/// Multipart profile update: name, email, optional new password and image
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    multipart: Multipart,
) -> AppResult<Response> {
    let config = &state.uploads.profile_images;

    let form = match receive(multipart, IMAGE_FIELD, config).await {
        Ok(form) => form,
        Err(e) if e.is_user_facing() => {
            session.flash_error(e.to_string());
            return Ok(Redirect::to(PROFILE_PATH).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let name = form.field("name").trim().to_string();
    let email = normalize_email(form.field("email"));
    let password = form.field("password");

    let mut errors: Vec<String> = [validate_name(&name), validate_email(&email)]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if !password.is_empty() {
        if let Err(e) = validate_password(password) {
            errors.push(e);
        }
    }
    let echo = json!({
        "user": signed_in(&user),
        "form": { "name": name, "email": email },
    });
    if !errors.is_empty() {
        return Ok(form_errors(&session, "Edit your profile", errors, echo));
    }

    let password_hash = if password.is_empty() {
        None
    } else {
        Some(hash_password(password).map_err(anyhow::Error::from)?)
    };
    let profile_image = match &form.file {
        Some(file) => Some(file.store(config).await?),
        None => None,
    };

    let changes = UpdateUser {
        name: Some(name),
        email: Some(email),
        password_hash,
        profile_image: profile_image.clone(),
    };

    match state.users.update(user.id, &changes).await {
        Ok(_) => {}
        Err(e) => {
            if let Some(stored) = &profile_image {
                if let Err(remove_err) = upload::remove(config, stored).await {
                    warn!("Failed to remove unused image {}: {}", stored, remove_err);
                }
            }
            return match e {
                RepositoryError::Conflict(_) => Ok(form_errors(
                    &session,
                    "Edit your profile",
                    vec![EMAIL_TAKEN.to_string()],
                    echo,
                )),
                other => Err(AppError::from(other)),
            };
        }
    }

    if let (Some(_), Some(previous)) = (&profile_image, &user.profile_image) {
        if let Err(e) = upload::remove(config, previous).await {
            warn!("Failed to remove previous image {}: {}", previous, e);
        }
    }

    info!("User {} updated their profile", user.id);
    session.flash_success("Changes saved");
    Ok(Redirect::to(PANEL_PATH).into_response())
}
