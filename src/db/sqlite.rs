use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::schema_sqlite::movies;

use super::stores::{LIKE_ESCAPE, substring_pattern};
use super::{
    DatabaseError,
    models::{Movie, MovieUpdate, NewMovie},
};

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = movies)]
struct DbMovie {
    id: i64,
    title: String,
    description: String,
    poster_path: String,
    video_path: String,
    year: String,
    views: i64,
    date_added: String,
}

impl DbMovie {
    fn to_movie(&self) -> Result<Movie, DatabaseError> {
        Ok(Movie {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            poster_path: self.poster_path.clone(),
            video_path: self.video_path.clone(),
            year: self.year.clone(),
            views: self.views,
            date_added: string_to_datetime(&self.date_added)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = movies)]
struct DbNewMovie<'a> {
    title: &'a str,
    description: &'a str,
    poster_path: &'a str,
    video_path: &'a str,
    year: &'a str,
    views: i64,
    date_added: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = movies)]
struct DbMovieUpdate<'a> {
    title: &'a str,
    description: &'a str,
    year: &'a str,
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteMovieStore {
    db_path: Arc<String>,
}

impl SqliteMovieStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::MovieStore for SqliteMovieStore {
    async fn list_movies(&self) -> Result<Vec<Movie>, DatabaseError> {
        with_connection(self.db_path.clone(), |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            let results = movies
                .order(id.desc())
                .select(DbMovie::as_select())
                .load::<DbMovie>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results.iter().map(DbMovie::to_movie).collect()
        })
        .await
    }

    async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            movies
                .filter(id.eq(movie_id))
                .select(DbMovie::as_select())
                .first::<DbMovie>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|m| m.to_movie())
                .transpose()
        })
        .await
    }

    async fn create_movie(&self, movie: &NewMovie) -> Result<i64, DatabaseError> {
        let movie = movie.clone();
        with_connection(self.db_path.clone(), move |conn| {
            conn.transaction::<i64, diesel::result::Error, _>(|conn| {
                let new_movie = DbNewMovie {
                    title: &movie.title,
                    description: &movie.description,
                    poster_path: &movie.poster_path,
                    video_path: &movie.video_path,
                    year: &movie.year,
                    views: movie.views,
                    date_added: datetime_to_string(&Utc::now()),
                };

                diesel::insert_into(movies::table)
                    .values(&new_movie)
                    .execute(conn)?;

                let new_id = movies::table
                    .select(movies::id)
                    .order(movies::id.desc())
                    .first::<i64>(conn)?;
                Ok(new_id)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_movie(&self, movie_id: i64, update: &MovieUpdate) -> Result<usize, DatabaseError> {
        let update = update.clone();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            let changes = DbMovieUpdate {
                title: &update.title,
                description: &update.description,
                year: &update.year,
            };

            diesel::update(movies.filter(id.eq(movie_id)))
                .set(changes)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn increment_views(&self, movie_id: i64) -> Result<usize, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            diesel::update(movies.filter(id.eq(movie_id)))
                .set(views.eq(views + 1))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_movie(&self, movie_id: i64) -> Result<usize, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            diesel::delete(movies.filter(id.eq(movie_id)))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn find_by_title_pattern(&self, pattern: &str) -> Result<Vec<Movie>, DatabaseError> {
        let like_pattern = substring_pattern(pattern);
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::movies::dsl::*;
            let results = movies
                .filter(title.like(like_pattern).escape(LIKE_ESCAPE))
                .order(id.desc())
                .select(DbMovie::as_select())
                .load::<DbMovie>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results.iter().map(DbMovie::to_movie).collect()
        })
        .await
    }
}

pub struct SqliteSettingsStore {
    db_path: Arc<String>,
}

impl SqliteSettingsStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::SettingsStore for SqliteSettingsStore {
    async fn get_setting(&self, setting_key: &str) -> Result<Option<String>, DatabaseError> {
        let setting_key = setting_key.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::settings::dsl::*;
            settings
                .filter(key.eq(setting_key))
                .select(value)
                .first::<String>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn set_setting(&self, setting_key: &str, setting_value: &str) -> Result<(), DatabaseError> {
        let setting_key = setting_key.to_string();
        let setting_value = setting_value.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::settings::dsl::*;
            diesel::insert_into(settings)
                .values((key.eq(&setting_key), value.eq(&setting_value)))
                .on_conflict(key)
                .do_update()
                .set(value.eq(&setting_value))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_setting(&self, setting_key: &str) -> Result<(), DatabaseError> {
        let setting_key = setting_key.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::settings::dsl::*;
            diesel::delete(settings.filter(key.eq(setting_key)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
