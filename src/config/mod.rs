pub use self::parser::{
    Config, DatabaseConfig, DbType, DriveConfig, LoggingConfig, SupabaseConfig, VideoBackend,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
