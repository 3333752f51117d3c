use axum::{
    http::{header, HeaderMap},
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;

use crate::pubtkt::Ticket;

/// Echo the identity the ticket asserts.
pub async fn root(Extension(ticket): Extension<Ticket>, headers: HeaderMap) -> impl IntoResponse {
    let basic_auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some();

    Json(json!({
        "uid": ticket.uid,
        "tokens": ticket.tokens,
        "udata": ticket.udata,
        "valid_until": ticket.valid_until,
        "basic_auth": basic_auth,
    }))
}
