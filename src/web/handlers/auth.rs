use salvo::prelude::*;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::render_error;
use crate::web::web_state;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// Exchanges the admin password for the admin bearer token.
#[handler]
pub async fn login(req: &mut Request, res: &mut Response) {
    let body = req.parse_json::<LoginRequest>().await.unwrap_or_default();
    let state = web_state();

    if password_matches(&body.password, state.admin_password.expose_secret()) {
        info!("admin login succeeded");
        res.render(Json(json!({ "token": state.admin_token.expose_secret() })));
    } else {
        warn!("admin login rejected");
        render_error(res, StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
}

fn password_matches(given: &str, expected: &str) -> bool {
    !given.is_empty() && given == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_configured_password() {
        assert!(password_matches("admin123", "admin123"));
    }

    #[test]
    fn rejects_other_passwords() {
        assert!(!password_matches("admin1234", "admin123"));
        assert!(!password_matches("", "admin123"));
        assert!(!password_matches("", ""));
    }

    #[test]
    fn login_request_tolerates_missing_password() {
        let body: LoginRequest = serde_json::from_str("{}").expect("parse");
        assert!(body.password.is_empty());
    }
}
