use std::fmt::Display;

use salvo::prelude::*;
use serde_json::json;
use tracing::error;

use crate::web::web_state;

pub mod auth;
pub mod drive;
pub mod health;
pub mod movies;
pub mod stream;
pub mod upload;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

/// Logs `err` and renders a 500. The detail is only sent to the client when
/// `server.expose_errors` is set.
pub(crate) fn render_internal_error(res: &mut Response, context: &str, err: impl Display) {
    error!("{}: {}", context, err);
    res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
    if web_state().config.server.expose_errors {
        res.render(Json(json!({
            "error": "Internal Server Error",
            "details": format!("{}: {}", context, err),
        })));
    } else {
        res.render(Json(json!({ "error": "Internal Server Error" })));
    }
}
