//! Middleware for session loading and route protection

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, warn};

use crate::{models::User, repositories::UserStore, session::Session, session::SessionManager};

/// Where unauthenticated visitors are sent
pub const LOGIN_PATH: &str = "/iniciar-sesion";

/// Load the session for the request and persist it once the handler is done
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let (session_id, session) = manager.load(&jar).await.map_err(|e| {
        error!("Failed to load session: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    req.extensions_mut().insert(session.clone());
    let response = next.run(req).await;

    let jar = manager
        .commit(jar, session_id, &session)
        .await
        .map_err(|e| {
            error!("Failed to persist session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((jar, response).into_response())
}

/// The signed-in user, available to handlers behind [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Redirect to the sign-in page unless the session carries a known user
pub async fn require_auth(
    State(users): State<UserStore>,
    session: Session,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = session.user_id() else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    match users.find_by_id(user_id).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => {
            warn!("Session references unknown user {}", user_id);
            session.logout();
            Redirect::to(LOGIN_PATH).into_response()
        }
        Err(e) => {
            error!("Failed to load session user: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| Redirect::to(LOGIN_PATH))
    }
}
