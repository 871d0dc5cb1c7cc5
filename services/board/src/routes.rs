//! Job board routes

pub mod accounts;
pub mod candidates;
pub mod home;
pub mod password_reset;
pub mod vacancies;
pub mod views;

use auth::{require_auth, session_middleware};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Upper bound on any request body; the upload rules are stricter per file
pub const MAX_REQUEST_BYTES: usize = 2 * 1024 * 1024;

/// Create the router for the job board
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/vacantes/nueva",
            get(vacancies::new_form).post(vacancies::create),
        )
        .route(
            "/vacantes/editar/:url",
            get(vacancies::edit_form).post(vacancies::update),
        )
        .route("/vacantes/eliminar/:id", delete(vacancies::remove))
        .route("/candidatos/:id", get(candidates::list))
        .route("/cerrar-sesion", get(accounts::logout))
        .route("/administracion", get(accounts::panel))
        .route(
            "/editar-perfil",
            get(accounts::profile_form).post(accounts::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(
            state.users.clone(),
            require_auth,
        ));

    Router::new()
        .route("/", get(home::index))
        .route("/health", get(home::health_check))
        .route("/buscador", post(home::search))
        .route(
            "/vacantes/:url",
            get(vacancies::show).post(candidates::submit),
        )
        .route(
            "/crear-cuenta",
            get(accounts::register_form).post(accounts::register),
        )
        .route(
            "/iniciar-sesion",
            get(accounts::login_form).post(accounts::login),
        )
        .route(
            "/reestablecer-password",
            get(password_reset::request_form).post(password_reset::send_token),
        )
        .route(
            "/reestablecer-password/:token",
            get(password_reset::reset_form).post(password_reset::save_password),
        )
        .merge(protected_routes)
        .fallback(home::not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session_middleware,
        ))
        .with_state(state)
}
