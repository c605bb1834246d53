use std::path::{Path, PathBuf};

use chrono::Utc;
use salvo::http::form::FilePart;
use salvo::prelude::*;
use serde_json::json;
use tracing::{error, info, warn};

use super::{render_error, render_internal_error};
use crate::config::VideoBackend;
use crate::db::NewMovie;
use crate::drive::DriveError;
use crate::web::metrics::Metrics;
use crate::web::{WebState, web_state};

/// A multipart file copied out of the request so the form can be released.
#[derive(Debug, Clone)]
struct UploadedFile {
    temp_path: PathBuf,
    original_name: String,
    mime_type: String,
}

impl UploadedFile {
    fn from_part(part: &FilePart, fallback_mime: &str) -> Self {
        Self {
            temp_path: part.path().clone(),
            original_name: part.name().unwrap_or_default().to_string(),
            mime_type: part
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| fallback_mime.to_string()),
        }
    }
}

#[derive(Debug)]
struct UploadForm {
    title: String,
    description: String,
    year: String,
    video: Option<UploadedFile>,
    poster: Option<UploadedFile>,
}

/// Accepts a multipart movie upload: `video` (required), `poster`, `title`,
/// `description` and `year`.
#[handler]
pub async fn upload_movie(req: &mut Request, res: &mut Response) {
    let state = web_state();
    req.set_secure_max_size(usize::try_from(state.config.media.max_upload_size).unwrap_or(usize::MAX));

    let form = match req.form_data().await {
        Ok(form) => UploadForm {
            title: form.fields.get("title").cloned().unwrap_or_default(),
            description: form.fields.get("description").cloned().unwrap_or_default(),
            year: form
                .fields
                .get("year")
                .filter(|y| !y.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| state.config.media.default_year.clone()),
            video: form
                .files
                .get("video")
                .map(|part| UploadedFile::from_part(part, "video/mp4")),
            poster: form
                .files
                .get("poster")
                .map(|part| UploadedFile::from_part(part, "image/jpeg")),
        },
        Err(err) => {
            Metrics::upload_failed();
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid upload: {}", err));
            return;
        }
    };

    let Some(video) = form.video.as_ref() else {
        Metrics::upload_failed();
        render_error(res, StatusCode::BAD_REQUEST, "Missing video file");
        return;
    };

    if state.config.media.video_backend == VideoBackend::Drive && !state.drive.is_connected() {
        Metrics::upload_failed();
        render_error(
            res,
            StatusCode::UNAUTHORIZED,
            "Google Drive not connected. Please connect in Admin Panel.",
        );
        return;
    }

    let millis = Utc::now().timestamp_millis();

    let poster_path = match form.poster.as_ref() {
        Some(poster) => match store_poster(state, poster, millis).await {
            Ok(path) => path,
            Err(err) => {
                Metrics::upload_failed();
                render_internal_error(res, "failed to store poster", err);
                return;
            }
        },
        None => state.config.media.default_poster.clone(),
    };

    let video_path = match store_video(state, video, millis).await {
        Ok(path) => path,
        Err(err) => {
            Metrics::upload_failed();
            discard_poster(state, &poster_path).await;
            match err {
                DriveError::NotConnected => render_error(
                    res,
                    StatusCode::UNAUTHORIZED,
                    "Google Drive not connected. Please connect in Admin Panel.",
                ),
                err => render_internal_error(res, "failed to store video", err),
            }
            return;
        }
    };

    let new_movie = NewMovie {
        title: form.title,
        description: form.description,
        poster_path,
        video_path,
        year: form.year,
        views: 0,
    };

    match state.db_manager.movie_store().create_movie(&new_movie).await {
        Ok(id) => {
            Metrics::upload_succeeded();
            info!("uploaded movie {} ({})", id, new_movie.title);
            res.render(Json(json!({
                "message": "Movie uploaded successfully",
                "id": id,
                "data": {
                    "title": new_movie.title,
                    "video": new_movie.video_path,
                    "poster": new_movie.poster_path,
                },
            })));
        }
        Err(err) => {
            Metrics::upload_failed();
            render_internal_error(res, "failed to save movie", err);
        }
    }
}

async fn store_video(
    state: &WebState,
    video: &UploadedFile,
    millis: i64,
) -> Result<String, DriveError> {
    match state.config.media.video_backend {
        VideoBackend::Drive => {
            let name = if video.original_name.is_empty() {
                stored_name("video", "video.mp4", millis)
            } else {
                video.original_name.clone()
            };
            let file = state
                .drive
                .upload_file(&video.temp_path, &name, &video.mime_type, state.drive.folder_id())
                .await?;
            Ok(file
                .web_view_link
                .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id)))
        }
        VideoBackend::Local => {
            let name = stored_name("video", &video.original_name, millis);
            copy_into_uploads(&state.config.server.uploads_dir, &video.temp_path, &name).await?;
            Ok(name)
        }
    }
}

async fn store_poster(
    state: &WebState,
    poster: &UploadedFile,
    millis: i64,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let name = stored_name("poster", &poster.original_name, millis);
    match &state.supabase {
        Some(storage) => Ok(storage
            .upload(&poster.temp_path, &name, &poster.mime_type)
            .await?),
        None => {
            copy_into_uploads(&state.config.server.uploads_dir, &poster.temp_path, &name).await?;
            Ok(name)
        }
    }
}

async fn discard_poster(state: &WebState, poster_path: &str) {
    if poster_path == state.config.media.default_poster {
        return;
    }
    let result = match &state.supabase {
        Some(storage) if storage.owns_url(poster_path) => storage
            .delete(poster_path)
            .await
            .map_err(|err| err.to_string()),
        _ => tokio::fs::remove_file(state.config.server.uploads_dir.join(poster_path))
            .await
            .map_err(|err| err.to_string()),
    };
    if let Err(err) = result {
        warn!("failed to discard poster {}: {}", poster_path, err);
    }
}

async fn copy_into_uploads(dir: &Path, source: &Path, name: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(name);
    if let Err(err) = tokio::fs::copy(source, &target).await {
        error!("failed to copy upload to {}: {}", target.display(), err);
        return Err(err);
    }
    Ok(())
}

/// `<prefix>-<millis>.<ext>`, keeping the extension of the uploaded file.
fn stored_name(prefix: &str, original: &str, millis: i64) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) => format!("{}-{}.{}", prefix, millis, ext),
        None => format!("{}-{}", prefix, millis),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("clip.mp4", "video-1700000000000.mp4"; "keeps extension")]
    #[test_case("Clip.MKV", "video-1700000000000.mkv"; "lowercases extension")]
    #[test_case("noext", "video-1700000000000"; "no extension")]
    #[test_case("evil.m/p4", "video-1700000000000"; "strange extension dropped")]
    #[test_case("", "video-1700000000000"; "empty name")]
    fn stored_names(original: &str, expected: &str) {
        assert_eq!(stored_name("video", original, 1_700_000_000_000), expected);
    }

    #[tokio::test]
    async fn copy_into_uploads_creates_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("incoming.bin");
        tokio::fs::write(&source, b"frames").await.expect("write");

        let uploads = dir.path().join("uploads");
        copy_into_uploads(&uploads, &source, "video-1.mp4")
            .await
            .expect("copy");

        let copied = tokio::fs::read(uploads.join("video-1.mp4")).await.expect("read");
        assert_eq!(copied, b"frames");
    }
}
