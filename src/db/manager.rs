use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{DatabaseError, MovieStore, SettingsStore};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresMovieStore, PostgresSettingsStore};
#[cfg(feature = "postgres")]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteMovieStore, SqliteSettingsStore};
#[cfg(feature = "sqlite")]
use diesel::Connection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    movie_store: Arc<dyn MovieStore>,
    settings_store: Arc<dyn SettingsStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

#[cfg(feature = "postgres")]
const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS movies (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        poster_path TEXT NOT NULL DEFAULT '',
        video_path TEXT NOT NULL,
        year TEXT NOT NULL DEFAULT '',
        views BIGINT NOT NULL DEFAULT 0,
        date_added TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_movies_date_added ON movies(date_added)",
];

#[cfg(feature = "sqlite")]
const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS movies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        poster_path TEXT NOT NULL DEFAULT '',
        video_path TEXT NOT NULL,
        year TEXT NOT NULL DEFAULT '',
        views INTEGER NOT NULL DEFAULT 0,
        date_added TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_movies_date_added ON movies(date_added)",
];

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                let movie_store = Arc::new(PostgresMovieStore::new(pool.clone()));
                let settings_store = Arc::new(PostgresSettingsStore::new(pool.clone()));

                Ok(Self {
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    movie_store,
                    settings_store,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite path is not configured".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                let movie_store = Arc::new(SqliteMovieStore::new(path_arc.clone()));
                let settings_store = Arc::new(SqliteSettingsStore::new(path_arc));

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    sqlite_path: Some(path),
                    movie_store,
                    settings_store,
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialized".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialized".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in POSTGRES_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        use diesel::RunQueryDsl;

        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in SQLITE_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn movie_store(&self) -> Arc<dyn MovieStore> {
        self.movie_store.clone()
    }

    pub fn settings_store(&self) -> Arc<dyn SettingsStore> {
        self.settings_store.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use tempfile::NamedTempFile;

    use super::{DatabaseManager, DbType};
    use crate::config::DatabaseConfig;
    use crate::db::{DRIVE_TOKEN_KEY, MovieUpdate, NewMovie};

    fn sqlite_config(file: &NamedTempFile) -> DatabaseConfig {
        DatabaseConfig {
            url: None,
            filename: Some(file.path().to_string_lossy().to_string()),
            max_connections: Some(1),
            min_connections: Some(1),
        }
    }

    fn new_movie(title: &str) -> NewMovie {
        NewMovie {
            title: title.to_string(),
            description: "A test description".to_string(),
            poster_path: "default-poster.jpg".to_string(),
            video_path: "video-1.mp4".to_string(),
            year: "2025".to_string(),
            views: 0,
        }
    }

    async fn migrated_manager(file: &NamedTempFile) -> DatabaseManager {
        let manager = DatabaseManager::new(&sqlite_config(file))
            .await
            .expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    #[tokio::test]
    async fn sqlite_movie_crud_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;
        assert_eq!(manager.db_type(), DbType::Sqlite);

        let store = manager.movie_store();
        let first = store.create_movie(&new_movie("First")).await.expect("insert first");
        let second = store.create_movie(&new_movie("Second")).await.expect("insert second");
        assert!(second > first);

        let listed = store.list_movies().await.expect("list");
        let titles: Vec<_> = listed.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);

        let fetched = store
            .get_movie(first)
            .await
            .expect("query")
            .expect("movie exists");
        assert_eq!(fetched.title, "First");
        assert_eq!(fetched.views, 0);

        let changed = store
            .update_movie(
                first,
                &MovieUpdate {
                    title: "Renamed".to_string(),
                    description: "Updated".to_string(),
                    year: "2099".to_string(),
                },
            )
            .await
            .expect("update");
        assert_eq!(changed, 1);

        let updated = store.get_movie(first).await.expect("query").expect("exists");
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.year, "2099");
        assert_eq!(updated.video_path, "video-1.mp4");

        assert_eq!(store.delete_movie(first).await.expect("delete"), 1);
        assert!(store.get_movie(first).await.expect("query").is_none());
        assert_eq!(store.delete_movie(first).await.expect("delete again"), 0);
    }

    #[tokio::test]
    async fn sqlite_increment_views_counts_each_call() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;
        let store = manager.movie_store();

        let id = store.create_movie(&new_movie("Viewed")).await.expect("insert");
        assert_eq!(store.increment_views(id).await.expect("view"), 1);
        assert_eq!(store.increment_views(id).await.expect("view"), 1);

        let movie = store.get_movie(id).await.expect("query").expect("exists");
        assert_eq!(movie.views, 2);

        assert_eq!(store.increment_views(id + 100).await.expect("missing"), 0);
    }

    #[tokio::test]
    async fn sqlite_title_pattern_matches_substring() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;
        let store = manager.movie_store();

        store.create_movie(&new_movie("Auto Test Movie")).await.expect("insert");
        store.create_movie(&new_movie("Blade Runner 2049")).await.expect("insert");

        let matched = store
            .find_by_title_pattern("Test Movie")
            .await
            .expect("pattern query");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].title, "Auto Test Movie");
    }

    #[tokio::test]
    async fn sqlite_title_pattern_treats_wildcards_literally() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;
        let store = manager.movie_store();

        store.create_movie(&new_movie("100% Neon")).await.expect("insert");
        store.create_movie(&new_movie("snake_case")).await.expect("insert");
        store.create_movie(&new_movie("Other Film")).await.expect("insert");

        let percent = store.find_by_title_pattern("%").await.expect("percent");
        let titles: Vec<_> = percent.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["100% Neon"]);

        let underscore = store.find_by_title_pattern("e_c").await.expect("underscore");
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].title, "snake_case");
        let lone = store.find_by_title_pattern("_").await.expect("lone underscore");
        assert_eq!(lone.len(), 1);

        let folded = store.find_by_title_pattern("other film").await.expect("case");
        assert_eq!(folded.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_ids_beyond_32_bits_do_not_alias_existing_rows() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;
        let store = manager.movie_store();

        let id = store.create_movie(&new_movie("Keep Me")).await.expect("insert");
        let aliased = id + (1_i64 << 32);

        assert!(store.get_movie(aliased).await.expect("query").is_none());
        assert_eq!(store.increment_views(aliased).await.expect("view"), 0);
        assert_eq!(store.delete_movie(aliased).await.expect("delete"), 0);

        let kept = store.get_movie(id).await.expect("query").expect("still there");
        assert_eq!(kept.title, "Keep Me");
        assert_eq!(kept.views, 0);
    }

    #[tokio::test]
    async fn sqlite_settings_upsert_and_persist_across_reopen() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = migrated_manager(&file).await;

        let settings = manager.settings_store();
        assert!(settings.get_setting(DRIVE_TOKEN_KEY).await.expect("get").is_none());

        settings
            .set_setting(DRIVE_TOKEN_KEY, r#"{"access_token":"a"}"#)
            .await
            .expect("insert setting");
        settings
            .set_setting(DRIVE_TOKEN_KEY, r#"{"access_token":"b"}"#)
            .await
            .expect("update setting");

        let reopened = migrated_manager(&file).await;
        let stored = reopened
            .settings_store()
            .get_setting(DRIVE_TOKEN_KEY)
            .await
            .expect("get after reopen");
        assert_eq!(stored.as_deref(), Some(r#"{"access_token":"b"}"#));

        reopened
            .settings_store()
            .delete_setting(DRIVE_TOKEN_KEY)
            .await
            .expect("delete setting");
        assert!(
            reopened
                .settings_store()
                .get_setting(DRIVE_TOKEN_KEY)
                .await
                .expect("get after delete")
                .is_none()
        );
    }
}
