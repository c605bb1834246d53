use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub supabase: Option<SupabaseConfig>,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// Include error details in JSON bodies of unhandled failures.
    #[serde(default)]
    pub expose_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            uploads_dir: default_uploads_dir(),
            expose_errors: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
            admin_password: default_admin_password(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DbType::Postgres
        } else {
            DbType::Sqlite
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            default_database_url()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default = "default_drive_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            folder_id: None,
            scopes: default_drive_scopes(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
        }
    }
}

impl DriveConfig {
    pub fn has_client(&self) -> bool {
        self.client_id.as_deref().is_some_and(|v| !v.is_empty())
            && self.client_secret.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
    #[serde(default = "default_supabase_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBackend {
    Drive,
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_video_backend")]
    pub video_backend: VideoBackend,
    #[serde(default = "default_poster")]
    pub default_poster: String,
    #[serde(default = "default_year")]
    pub default_year: String,
    /// Upper bound for a multipart upload request body, in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_backend: default_video_backend(),
            default_poster: default_poster(),
            default_year: default_year(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl Config {
    /// Loads from `path`, falling back to built-in defaults when the file is absent.
    ///
    /// Runs before logging is configured, so non-fatal problems are returned
    /// alongside the config for the caller to log.
    pub fn load(path: &Path) -> Result<(Self, Vec<String>), ConfigError> {
        let mut warnings = Vec::new();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            warnings.push(format!(
                "config file {} not found, using defaults and environment",
                path.display()
            ));
            Config::default()
        };
        config.apply_env_overrides(&mut warnings);
        config.validate()?;
        warnings.extend(config.warnings());
        Ok((config, warnings))
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.auth.admin_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.admin_token cannot be empty".to_string(),
            ));
        }

        if self.auth.admin_password.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.admin_password cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if let Some(supabase) = &self.supabase {
            if supabase.url.is_empty() || supabase.key.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "supabase.url and supabase.key must both be set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Settings that are accepted but leave part of the service unusable.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.media.video_backend == VideoBackend::Drive && !self.drive.has_client() {
            warnings.push(
                "video backend is drive but no OAuth client is configured, uploads will fail"
                    .to_string(),
            );
        }
        warnings
    }

    fn apply_env_overrides(&mut self, warnings: &mut Vec<String>) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(value) = std::env::var("ADMIN_TOKEN") {
            self.auth.admin_token = value;
        }
        if let Ok(value) = std::env::var("ADMIN_PASSWORD") {
            self.auth.admin_password = value;
        }
        if let Ok(value) = std::env::var("DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("GOOGLE_CLIENT_ID") {
            self.drive.client_id = Some(value);
        }
        if let Ok(value) = std::env::var("GOOGLE_CLIENT_SECRET") {
            self.drive.client_secret = Some(value);
        }
        if let Ok(value) = std::env::var("GOOGLE_REDIRECT_URI") {
            self.drive.redirect_uri = value;
        }
        if let Ok(value) = std::env::var("DRIVE_FOLDER_ID") {
            self.drive.folder_id = Some(value);
        }
        if let (Ok(url), Ok(key)) = (std::env::var("SUPABASE_URL"), std::env::var("SUPABASE_KEY")) {
            let bucket = std::env::var("SUPABASE_BUCKET").unwrap_or_else(|_| default_supabase_bucket());
            self.supabase = Some(SupabaseConfig { url, key, bucket });
        }
        if let Ok(value) = std::env::var("VIDEO_BACKEND") {
            match value.to_ascii_lowercase().as_str() {
                "drive" => self.media.video_backend = VideoBackend::Drive,
                "local" => self.media.video_backend = VideoBackend::Local,
                other => warnings.push(format!("ignoring unknown VIDEO_BACKEND value {}", other)),
            }
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_admin_token() -> String {
    "neon_fallback_secret".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_database_url() -> String {
    "sqlite://movies.sqlite".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/api/auth/google/callback".to_string()
}

fn default_drive_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/drive.file".to_string()]
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_supabase_bucket() -> String {
    "posters".to_string()
}

fn default_video_backend() -> VideoBackend {
    VideoBackend::Drive
}

fn default_poster() -> String {
    "default-poster.jpg".to_string()
}

fn default_year() -> String {
    "2025".to_string()
}

fn default_max_upload_size() -> u64 {
    8 * 1024 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::load_from_str("{}").expect("defaults are valid");

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.admin_token, "neon_fallback_secret");
        assert_eq!(config.auth.admin_password, "admin123");
        assert_eq!(config.media.video_backend, VideoBackend::Drive);
        assert_eq!(config.media.default_poster, "default-poster.jpg");
        assert!(config.supabase.is_none());
    }

    #[test]
    fn drive_backend_without_client_is_a_warning() {
        let config = Config::load_from_str("{}").expect("defaults are valid");
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no OAuth client"));

        let local = Config::load_from_str("media:\n  video_backend: local\n").expect("config");
        assert!(local.warnings().is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_defaults_with_warning() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.yaml");

        let (config, warnings) = Config::load(&path).expect("defaults");
        assert_eq!(config.media.default_year, "2025");
        assert!(warnings.iter().any(|w| w.contains("absent.yaml") && w.contains("not found")));
    }

    #[test]
    fn media_backend_parses_lowercase() {
        let config = Config::load_from_str("media:\n  video_backend: local\n").expect("config");
        assert_eq!(config.media.video_backend, VideoBackend::Local);
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = Config::load_from_str("server:\n  port: 0\n").unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn empty_admin_password_is_rejected() {
        let err = Config::load_from_str("auth:\n  admin_password: \"\"\n").unwrap_err();
        assert!(err.to_string().contains("admin_password"));
    }

    #[test]
    fn partial_supabase_section_is_rejected() {
        let err = Config::load_from_str("supabase:\n  url: \"\"\n  key: k\n").unwrap_err();
        assert!(err.to_string().contains("supabase"));
    }

    #[test_case(Some("postgres://u@h/db"), None, DbType::Postgres; "postgres url")]
    #[test_case(Some("postgresql://u@h/db"), None, DbType::Postgres; "postgresql url")]
    #[test_case(Some("sqlite://movies.db"), None, DbType::Sqlite; "sqlite url")]
    #[test_case(None, Some("local.db"), DbType::Sqlite; "filename")]
    #[test_case(None, None, DbType::Sqlite; "default")]
    fn database_type_follows_connection_string(
        url: Option<&str>,
        filename: Option<&str>,
        expected: DbType,
    ) {
        let config = DatabaseConfig {
            url: url.map(ToOwned::to_owned),
            filename: filename.map(ToOwned::to_owned),
            max_connections: None,
            min_connections: None,
        };
        assert_eq!(config.db_type(), expected);
    }

    #[test]
    fn sqlite_path_strips_scheme() {
        let config = DatabaseConfig {
            url: None,
            filename: Some("data/movies.sqlite".to_string()),
            max_connections: Some(5),
            min_connections: None,
        };
        assert_eq!(config.sqlite_path().as_deref(), Some("data/movies.sqlite"));
        assert_eq!(config.max_connections(), Some(1));
    }

    #[test]
    fn drive_client_requires_id_and_secret() {
        let mut drive = DriveConfig::default();
        assert!(!drive.has_client());
        drive.client_id = Some("id".to_string());
        assert!(!drive.has_client());
        drive.client_secret = Some("secret".to_string());
        assert!(drive.has_client());
    }
}
