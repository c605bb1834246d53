use std::path::PathBuf;

use salvo::http::header::AUTHORIZATION;
use salvo::prelude::*;
use salvo::serve_static::StaticDir;
use secrecy::ExposeSecret;
use tracing::warn;

use crate::web::handlers::{
    auth::login,
    drive::{
        drive_about, drive_disconnect, drive_file, drive_status, google_auth, google_callback,
    },
    health::{health_check, root},
    movies::{cleanup_movies, delete_movie, get_movie, list_movies, record_view, update_movie},
    render_error,
    stream::{stream_local, stream_movie},
    upload::upload_movie,
};
use crate::web::metrics::metrics_endpoint;
use crate::web::middleware::headers::security_headers;
use crate::web::web_state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    Allowed,
    Missing,
    Forbidden,
}

/// Token part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn check_admin(header: Option<&str>, expected: &str) -> AdminCheck {
    match bearer_token(header) {
        None => AdminCheck::Missing,
        Some(token) if token == expected => AdminCheck::Allowed,
        Some(_) => AdminCheck::Forbidden,
    }
}

#[handler]
pub async fn require_admin(req: &mut Request, res: &mut Response, ctrl: &mut FlowCtrl) {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match check_admin(header, web_state().admin_token.expose_secret()) {
        AdminCheck::Allowed => {}
        AdminCheck::Missing => {
            render_error(res, StatusCode::UNAUTHORIZED, "Unauthorized");
            ctrl.skip_rest();
        }
        AdminCheck::Forbidden => {
            warn!("rejected admin request to {}", req.uri().path());
            render_error(res, StatusCode::FORBIDDEN, "Forbidden");
            ctrl.skip_rest();
        }
    }
}

pub fn create_router(uploads_dir: PathBuf) -> Router {
    Router::new()
        .hoop(security_headers)
        .get(root)
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics_endpoint))
        .push(
            Router::with_path("api")
                .push(
                    Router::with_path("auth")
                        .push(Router::with_path("login").post(login))
                        .push(Router::with_path("google").get(google_auth))
                        .push(Router::with_path("google/callback").get(google_callback)),
                )
                .push(Router::with_path("movies").get(list_movies))
                .push(
                    Router::with_path("movies/{id}")
                        .get(get_movie)
                        .push(
                            Router::new()
                                .hoop(require_admin)
                                .put(update_movie)
                                .delete(delete_movie),
                        ),
                )
                .push(Router::with_path("movies/{id}/view").post(record_view))
                .push(Router::with_path("movies/{id}/stream").get(stream_movie))
                .push(Router::with_path("stream/{filename}").get(stream_local))
                .push(
                    Router::new()
                        .hoop(require_admin)
                        .push(Router::with_path("upload").post(upload_movie))
                        .push(Router::with_path("admin/cleanup").delete(cleanup_movies))
                        .push(
                            Router::with_path("drive")
                                .push(Router::with_path("status").get(drive_status))
                                .push(Router::with_path("about").get(drive_about))
                                .push(Router::with_path("files/{id}").get(drive_file))
                                .push(Router::with_path("token").delete(drive_disconnect)),
                        ),
                ),
        )
        .push(Router::with_path("uploads/{**path}").get(StaticDir::new([uploads_dir])))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Some("Bearer secret"), Some("secret"); "plain")]
    #[test_case(Some("bearer secret"), Some("secret"); "lowercase scheme")]
    #[test_case(Some("  Bearer   secret  "), Some("secret"); "extra whitespace")]
    #[test_case(Some("Basic c2VjcmV0"), None; "other scheme")]
    #[test_case(Some("Bearer"), None; "no token")]
    #[test_case(Some("Bearer "), None; "blank token")]
    #[test_case(None, None; "missing header")]
    fn parses_bearer_token(header: Option<&str>, expected: Option<&str>) {
        assert_eq!(bearer_token(header), expected);
    }

    #[test_case(None, AdminCheck::Missing; "missing header is unauthorized")]
    #[test_case(Some("Token secret"), AdminCheck::Missing; "malformed header is unauthorized")]
    #[test_case(Some("Bearer nope"), AdminCheck::Forbidden; "wrong token is forbidden")]
    #[test_case(Some("Bearer secret"), AdminCheck::Allowed; "matching token")]
    fn admin_check(header: Option<&str>, expected: AdminCheck) {
        assert_eq!(check_admin(header, "secret"), expected);
    }
}
