use std::path::Path;

use salvo::http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderName, HeaderValue, RANGE,
};
use salvo::prelude::*;
use tracing::{debug, warn};

use super::{render_error, render_internal_error};
use crate::drive::{DriveError, extract_file_id};
use crate::streaming::{
    RangeOutcome, content_type_for, file_chunks, open_at, parse_range, resolve_upload_path,
    unsatisfied_content_range,
};
use crate::web::metrics::Metrics;
use crate::web::web_state;

const PROXIED_HEADERS: [HeaderName; 4] = [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_RANGE, ACCEPT_RANGES];

/// Streams a file from the uploads directory, honouring `Range`.
#[handler]
pub async fn stream_local(req: &mut Request, res: &mut Response) {
    let filename = req.param::<String>("filename").unwrap_or_default();
    let uploads_dir = &web_state().config.server.uploads_dir;
    let Some(path) = resolve_upload_path(uploads_dir, &filename) else {
        render_error(res, StatusCode::NOT_FOUND, "Video not found");
        return;
    };
    serve_local_file(req, res, &path).await;
}

/// Streams the video of a movie from local storage or through Google Drive.
#[handler]
pub async fn stream_movie(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid movie id");
        return;
    };

    let state = web_state();
    let movie = match state.db_manager.movie_store().get_movie(id).await {
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

    if movie.is_drive_hosted() {
        let Some(file_id) = extract_file_id(&movie.video_path) else {
            render_error(res, StatusCode::NOT_FOUND, "Video not found");
            return;
        };
        proxy_drive(req, res, &file_id).await;
        return;
    }

    match resolve_upload_path(&state.config.server.uploads_dir, &movie.video_path) {
        Some(path) => serve_local_file(req, res, &path).await,
        None => render_error(res, StatusCode::NOT_FOUND, "Video not found"),
    }
}

async fn serve_local_file(req: &Request, res: &mut Response, path: &Path) {
    let total = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            render_error(res, StatusCode::NOT_FOUND, "Video not found");
            return;
        }
    };

    let range_header = req.headers().get(RANGE).and_then(|v| v.to_str().ok());
    let range = match parse_range(range_header, total) {
        RangeOutcome::Unsatisfiable => {
            debug!("unsatisfiable range {:?} for {}", range_header, path.display());
            res.status_code(StatusCode::RANGE_NOT_SATISFIABLE);
            set_header(res, CONTENT_RANGE, &unsatisfied_content_range(total));
            return;
        }
        RangeOutcome::Full => None,
        RangeOutcome::Partial(range) => Some(range),
    };

    let file = match open_at(path, range).await {
        Ok(file) => file,
        Err(err) => {
            render_internal_error(res, "failed to open video", err);
            return;
        }
    };

    let len = range.map_or(total, |r| r.len());
    match range {
        Some(range) => {
            res.status_code(StatusCode::PARTIAL_CONTENT);
            set_header(res, CONTENT_RANGE, &range.content_range(total));
        }
        None => {
            res.status_code(StatusCode::OK);
        }
    }
    set_header(res, ACCEPT_RANGES, "bytes");
    set_header(res, CONTENT_LENGTH, &len.to_string());
    set_header(res, CONTENT_TYPE, content_type_for(path));

    Metrics::stream_served(len);
    res.stream(file_chunks(file, len));
}

async fn proxy_drive(req: &Request, res: &mut Response, file_id: &str) {
    let range = req.headers().get(RANGE).and_then(|v| v.to_str().ok());
    Metrics::drive_proxy_request();

    let upstream = match web_state().drive.open_media(file_id, range).await {
        Ok(upstream) => upstream,
        Err(DriveError::NotConnected) => {
            render_error(res, StatusCode::SERVICE_UNAVAILABLE, "Google Drive not connected");
            return;
        }
        Err(DriveError::Api { status, body }) if status.as_u16() == 404 => {
            debug!("drive file {} missing: {}", file_id, body);
            render_error(res, StatusCode::NOT_FOUND, "Video not found");
            return;
        }
        Err(err) => {
            warn!("drive proxy for {} failed: {}", file_id, err);
            render_error(res, StatusCode::BAD_GATEWAY, "Failed to fetch video from Drive");
            return;
        }
    };

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    res.status_code(status);
    for name in PROXIED_HEADERS {
        let value = upstream
            .headers()
            .get(name.as_str())
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
        if let Some(value) = value {
            res.headers_mut().insert(name, value);
        }
    }

    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        return;
    }
    res.stream(upstream.bytes_stream());
}

fn set_header(res: &mut Response, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            res.headers_mut().insert(name, value);
        }
        Err(err) => warn!("invalid {} header value {:?}: {}", name, value, err),
    }
}
