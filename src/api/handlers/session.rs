//! Session introspection for the frontend.

use crate::session::Identity;
use axum::{
    Extension, Json,
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::IntoResponse,
};

#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Session is active", body = Identity),
        (status = 204, description = "No active session")
    ),
    tag = "session"
)]
/// Report who the gate resolved the visitor to.
///
/// The lookup already happened in the route guard; this only reads the
/// identity it attached, so no second round trip to the auth service.
pub async fn session(identity: Option<Extension<Identity>>) -> impl IntoResponse {
    let no_store = [(CACHE_CONTROL, HeaderValue::from_static("no-store"))];
    match identity {
        Some(Extension(identity)) => (StatusCode::OK, no_store, Json(identity)).into_response(),
        None => (StatusCode::NO_CONTENT, no_store).into_response(),
    }
}
