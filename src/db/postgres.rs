use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::schema::{movies, settings};

use super::stores::{LIKE_ESCAPE, substring_pattern};
use super::{
    DatabaseError,
    models::{Movie, MovieUpdate, NewMovie},
};

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
    date_added: DateTime<Utc>,
}

impl From<DbMovie> for Movie {
    fn from(value: DbMovie) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            poster_path: value.poster_path,
            video_path: value.video_path,
            year: value.year,
            views: value.views,
            date_added: value.date_added,
        }
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
    date_added: DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = movies)]
struct DbMovieUpdate<'a> {
    title: &'a str,
    description: &'a str,
    year: &'a str,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresMovieStore {
    pool: Pool,
}

impl PostgresMovieStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::MovieStore for PostgresMovieStore {
    async fn list_movies(&self) -> Result<Vec<Movie>, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            movies::table
                .order(movies::id.desc())
                .select(DbMovie::as_select())
                .load::<DbMovie>(conn)
                .map(|rows| rows.into_iter().map(Movie::from).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            movies::table
                .filter(movies::id.eq(movie_id))
                .select(DbMovie::as_select())
                .first::<DbMovie>(conn)
                .optional()
                .map(|row| row.map(Movie::from))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn create_movie(&self, movie: &NewMovie) -> Result<i64, DatabaseError> {
        let movie = movie.clone();
        with_connection(self.pool.clone(), move |conn| {
            let new_movie = DbNewMovie {
                title: &movie.title,
                description: &movie.description,
                poster_path: &movie.poster_path,
                video_path: &movie.video_path,
                year: &movie.year,
                views: movie.views,
                date_added: Utc::now(),
            };

            diesel::insert_into(movies::table)
                .values(&new_movie)
                .returning(movies::id)
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_movie(&self, movie_id: i64, update: &MovieUpdate) -> Result<usize, DatabaseError> {
        let update = update.clone();
        with_connection(self.pool.clone(), move |conn| {
            let changes = DbMovieUpdate {
                title: &update.title,
                description: &update.description,
                year: &update.year,
            };

            diesel::update(movies::table.filter(movies::id.eq(movie_id)))
                .set(changes)
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn increment_views(&self, movie_id: i64) -> Result<usize, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            diesel::update(movies::table.filter(movies::id.eq(movie_id)))
                .set(movies::views.eq(movies::views + 1))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_movie(&self, movie_id: i64) -> Result<usize, DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(movies::table.filter(movies::id.eq(movie_id)))
                .execute(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn find_by_title_pattern(&self, pattern: &str) -> Result<Vec<Movie>, DatabaseError> {
        let like_pattern = substring_pattern(pattern);
        with_connection(self.pool.clone(), move |conn| {
            movies::table
                .filter(movies::title.ilike(like_pattern).escape(LIKE_ESCAPE))
                .order(movies::id.desc())
                .select(DbMovie::as_select())
                .load::<DbMovie>(conn)
                .map(|rows| rows.into_iter().map(Movie::from).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresSettingsStore {
    pool: Pool,
}

impl PostgresSettingsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::SettingsStore for PostgresSettingsStore {
    async fn get_setting(&self, setting_key: &str) -> Result<Option<String>, DatabaseError> {
        let setting_key = setting_key.to_string();
        with_connection(self.pool.clone(), move |conn| {
            settings::table
                .filter(settings::key.eq(setting_key))
                .select(settings::value)
                .first::<String>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn set_setting(&self, setting_key: &str, setting_value: &str) -> Result<(), DatabaseError> {
        let setting_key = setting_key.to_string();
        let setting_value = setting_value.to_string();
        with_connection(self.pool.clone(), move |conn| {
            diesel::insert_into(settings::table)
                .values((
                    settings::key.eq(&setting_key),
                    settings::value.eq(&setting_value),
                ))
                .on_conflict(settings::key)
                .do_update()
                .set(settings::value.eq(&setting_value))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_setting(&self, setting_key: &str) -> Result<(), DatabaseError> {
        let setting_key = setting_key.to_string();
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(settings::table.filter(settings::key.eq(setting_key)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
