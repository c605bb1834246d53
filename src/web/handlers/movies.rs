use std::path::Path;

use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{render_error, render_internal_error};
use crate::db::{Movie, MovieUpdate};
use crate::drive::{DriveError, extract_file_id};
use crate::streaming::resolve_upload_path;
use crate::web::metrics::Metrics;
use crate::web::{WebState, web_state};

const DEFAULT_CLEANUP_PATTERN: &str = "Test Movie";

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<String>,
}

impl UpdateMovieRequest {
    /// Fields left out of the request keep their current values.
    pub fn apply_to(self, movie: &Movie) -> MovieUpdate {
        MovieUpdate {
            title: self.title.unwrap_or_else(|| movie.title.clone()),
            description: self.description.unwrap_or_else(|| movie.description.clone()),
            year: self.year.unwrap_or_else(|| movie.year.clone()),
        }
    }
}

#[handler]
pub async fn list_movies(res: &mut Response) {
    match web_state().db_manager.movie_store().list_movies().await {
        Ok(movies) => res.render(Json(json!({ "message": "success", "data": movies }))),
        Err(err) => render_internal_error(res, "failed to list movies", err),
    }
}

#[handler]
pub async fn get_movie(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid movie id");
        return;
    };

    match web_state().db_manager.movie_store().get_movie(id).await {
        Ok(Some(movie)) => res.render(Json(json!({ "message": "success", "data": movie }))),
        Ok(None) => render_error(res, StatusCode::NOT_FOUND, "Movie not found"),
        Err(err) => render_internal_error(res, "failed to load movie", err),
    }
}

#[handler]
pub async fn record_view(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid movie id");
        return;
    };

    match web_state().db_manager.movie_store().increment_views(id).await {
        Ok(changes) => {
            if changes > 0 {
                Metrics::view_counted();
            }
            res.render(Json(json!({ "message": "View counted", "changes": changes })));
        }
        Err(err) => render_internal_error(res, "failed to count view", err),
    }
}

#[handler]
pub async fn update_movie(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid movie id");
        return;
    };
    let body = match req.parse_json::<UpdateMovieRequest>().await {
        Ok(body) => body,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid body: {}", err));
            return;
        }
    };

    let store = web_state().db_manager.movie_store();
    let movie = match store.get_movie(id).await {
        Ok(Some(movie)) => movie,
        Ok(None) => {
            render_error(res, StatusCode::NOT_FOUND, "Movie not found");
            return;
        }
        Err(err) => {
            render_internal_error(res, "failed to load movie", err);
            return;
        }
    };

    match store.update_movie(id, &body.apply_to(&movie)).await {
        Ok(changes) => {
            info!("updated movie {}", id);
            res.render(Json(json!({
                "message": "Movie updated successfully",
                "changes": changes,
            })));
        }
        Err(err) => render_internal_error(res, "failed to update movie", err),
    }
}

#[handler]
pub async fn delete_movie(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid movie id");
        return;
    };

    let state = web_state();
    let store = state.db_manager.movie_store();
    let movie = match store.get_movie(id).await {
        Ok(Some(movie)) => movie,
        Ok(None) => {
            render_error(res, StatusCode::NOT_FOUND, "Movie not found");
            return;
        }
        Err(err) => {
            render_internal_error(res, "failed to load movie", err);
            return;
        }
    };

    if let Err(err) = remove_movie_assets(state, &movie).await {
        render_internal_error(res, "Failed to delete from Drive", err);
        return;
    }

    match store.delete_movie(id).await {
        Ok(_) => {
            info!("deleted movie {} ({})", id, movie.title);
            res.render(Json(json!({ "message": "Movie deleted successfully" })));
        }
        Err(err) => render_internal_error(res, "failed to delete movie", err),
    }
}

/// Deletes every movie whose title contains `pattern`, assets included.
#[handler]
pub async fn cleanup_movies(req: &mut Request, res: &mut Response) {
    let pattern = req
        .query::<String>("pattern")
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLEANUP_PATTERN.to_string());

    let state = web_state();
    let store = state.db_manager.movie_store();
    let movies = match store.find_by_title_pattern(&pattern).await {
        Ok(movies) => movies,
        Err(err) => {
            render_internal_error(res, "failed to search movies", err);
            return;
        }
    };

    let mut count = 0usize;
    for movie in &movies {
        if let Err(err) = remove_movie_assets(state, movie).await {
            warn!("skipping movie {}: {}", movie.id, err);
            continue;
        }
        match store.delete_movie(movie.id).await {
            Ok(changes) => count += changes,
            Err(err) => warn!("failed to delete movie {}: {}", movie.id, err),
        }
    }

    info!("cleanup removed {} movies matching {:?}", count, pattern);
    res.render(Json(json!({
        "message": format!("Deleted {} movies matching '{}'", count, pattern),
        "count": count,
    })));
}

/// Removes the stored video and poster of `movie`.
///
/// A Drive failure aborts so the row is kept and the delete can be retried.
/// Poster and local file failures are only logged.
pub(crate) async fn remove_movie_assets(state: &WebState, movie: &Movie) -> Result<(), DriveError> {
    let uploads_dir = &state.config.server.uploads_dir;

    if movie.is_drive_hosted() {
        match extract_file_id(&movie.video_path) {
            Some(file_id) => state.drive.delete_file(&file_id).await?,
            None => warn!("movie {} has an unrecognised drive link", movie.id),
        }
    } else {
        remove_local_file(uploads_dir, &movie.video_path).await;
    }

    let poster = movie.poster_path.as_str();
    if poster.is_empty() || poster == state.config.media.default_poster {
        return Ok(());
    }
    match &state.supabase {
        Some(storage) if storage.owns_url(poster) => {
            if let Err(err) = storage.delete(poster).await {
                warn!("failed to delete poster {}: {}", poster, err);
            }
        }
        _ => remove_local_file(uploads_dir, poster).await,
    }
    Ok(())
}

async fn remove_local_file(uploads_dir: &Path, name: &str) {
    let Some(path) = resolve_upload_path(uploads_dir, name) else {
        debug!("not a local upload, leaving {:?} alone", name);
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!("removed {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn movie() -> Movie {
        Movie {
            id: 7,
            title: "Neon Nights".to_string(),
            description: "City lights".to_string(),
            poster_path: "poster-1.jpg".to_string(),
            video_path: "video-1.mp4".to_string(),
            year: "2024".to_string(),
            views: 3,
            date_added: Utc::now(),
        }
    }

    #[test]
    fn update_keeps_missing_fields() {
        let request: UpdateMovieRequest =
            serde_json::from_str(r#"{"title": "Neon Days"}"#).expect("parse");
        let update = request.apply_to(&movie());
        assert_eq!(update.title, "Neon Days");
        assert_eq!(update.description, "City lights");
        assert_eq!(update.year, "2024");
    }

    #[test]
    fn update_replaces_all_fields() {
        let request: UpdateMovieRequest =
            serde_json::from_str(r#"{"title": "A", "description": "B", "year": "1999"}"#)
                .expect("parse");
        let update = request.apply_to(&movie());
        assert_eq!(
            update,
            MovieUpdate {
                title: "A".to_string(),
                description: "B".to_string(),
                year: "1999".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn remove_local_file_ignores_missing_and_foreign_paths() {
        let dir = tempfile::tempdir().expect("temp dir");
        let kept = dir.path().join("keep.txt");
        tokio::fs::write(&kept, b"x").await.expect("write");

        remove_local_file(dir.path(), "missing.mp4").await;
        remove_local_file(dir.path(), "../keep.txt").await;
        remove_local_file(dir.path(), "https://example.com/p.jpg").await;
        assert!(kept.exists());

        remove_local_file(dir.path(), "keep.txt").await;
        assert!(!kept.exists());
    }
}
