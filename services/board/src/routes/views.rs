//! View models handed to the front end in place of rendered pages

use auth::{Session, models::User};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

/// A page: its title, the pending flash messages and page specific data
pub fn page(session: &Session, title: impl Into<String>, data: Value) -> Json<Value> {
    let mut view = json!({
        "page": title.into(),
        "messages": session.take_flashes(),
    });
    if let (Value::Object(view), Value::Object(data)) = (&mut view, data) {
        view.extend(data);
    }
    Json(view)
}

/// Re-show a form with its validation messages
pub fn form_errors(
    session: &Session,
    title: impl Into<String>,
    errors: Vec<String>,
    data: Value,
) -> Response {
    for error in errors {
        session.flash_error(error);
    }
    (StatusCode::UNPROCESSABLE_ENTITY, page(session, title, data)).into_response()
}

/// Header data shown on every signed-in page
pub fn signed_in(user: &User) -> Value {
    json!({
        "name": user.name,
        "image": user.profile_image,
        "sign_out": true,
    })
}
