use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DriveConfig;

/// Tokens are treated as expired this long before Google says they are.
const EXPIRY_SKEW_MS: i64 = 60_000;

/// Persisted OAuth token blob, in the same shape Google's client libraries store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Body returned by the token endpoint for both code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl DriveToken {
    /// Builds a token from an endpoint response. Google omits the refresh token on
    /// refresh, so the previous one is carried over.
    pub fn from_response(
        response: TokenResponse,
        now_ms: i64,
        previous_refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            expiry_date: response.expires_in.map(|secs| now_ms + secs * 1000),
            token_type: response.token_type,
            scope: response.scope,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => now_ms + EXPIRY_SKEW_MS >= expiry,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() || self.can_refresh()
    }
}

pub fn build_auth_url(config: &DriveConfig, client_id: &str) -> Result<Url, url::ParseError> {
    let scope = config.scopes.join(" ");
    Url::parse_with_params(
        &config.auth_uri,
        &[
            ("client_id", client_id),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("scope", scope.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "ya29.new".to_string(),
            expires_in: Some(3599),
            refresh_token: refresh.map(ToOwned::to_owned),
            scope: Some("https://www.googleapis.com/auth/drive.file".to_string()),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn refresh_without_new_refresh_token_keeps_previous() {
        let token = DriveToken::from_response(response(None), 1_000, Some("1//old".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("1//old"));
        assert_eq!(token.access_token, "ya29.new");
    }

    #[test]
    fn exchange_with_refresh_token_replaces_previous() {
        let token =
            DriveToken::from_response(response(Some("1//new")), 1_000, Some("1//old".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("1//new"));
    }

    #[test]
    fn expiry_is_absolute_milliseconds() {
        let token = DriveToken::from_response(response(None), 10_000, None);
        assert_eq!(token.expiry_date, Some(10_000 + 3_599_000));
    }

    #[test]
    fn expiry_check_applies_skew() {
        let token = DriveToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expiry_date: Some(100_000),
            token_type: None,
            scope: None,
        };
        assert!(!token.is_expired(39_999));
        assert!(token.is_expired(40_000));
        assert!(token.is_expired(200_000));
    }

    #[test]
    fn token_without_expiry_never_expires() {
        let token = DriveToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expiry_date: None,
            token_type: None,
            scope: None,
        };
        assert!(!token.is_expired(i64::MAX - EXPIRY_SKEW_MS));
    }

    #[test]
    fn stored_google_blob_deserializes() {
        let blob = r#"{
            "access_token": "ya29.a0",
            "refresh_token": "1//0g",
            "scope": "https://www.googleapis.com/auth/drive.file",
            "token_type": "Bearer",
            "expiry_date": 1735689600000
        }"#;
        let token: DriveToken = serde_json::from_str(blob).expect("token blob");
        assert!(token.can_refresh());
        assert_eq!(token.expiry_date, Some(1_735_689_600_000));
    }

    #[test]
    fn refresh_only_token_is_usable() {
        let token: DriveToken =
            serde_json::from_str(r#"{"refresh_token":"1//0g"}"#).expect("token blob");
        assert!(token.access_token.is_empty());
        assert!(token.is_usable());
    }

    #[test]
    fn auth_url_requests_offline_access() {
        let config = DriveConfig::default();
        let url = build_auth_url(&config, "client-123").expect("auth url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(pairs.contains(&("client_id".to_string(), "client-123".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&(
            "scope".to_string(),
            "https://www.googleapis.com/auth/drive.file".to_string()
        )));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:5000/api/auth/google/callback".to_string()
        )));
    }
}
