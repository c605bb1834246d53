use salvo::prelude::*;
use serde_json::json;
use tracing::{error, info};

use super::{render_error, render_internal_error};
use crate::drive::DriveError;
use crate::web::web_state;

const CONNECTED_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Google Drive connected</title></head>
  <body style="font-family: sans-serif; background: #0b0b12; color: #e6e6f0; text-align: center; padding-top: 15vh;">
    <h1 style="color: #00f0ff;">Google Drive connected</h1>
    <p>Neon Stream can now upload videos to your Drive. You can close this window.</p>
    <script>setTimeout(function () { window.close(); }, 3000);</script>
  </body>
</html>
"#;

/// Redirects the browser to the Google consent screen.
#[handler]
pub async fn google_auth(res: &mut Response) {
    match web_state().drive.auth_url() {
        Ok(url) => res.render(Redirect::found(url)),
        Err(err) => {
            error!("failed to build drive auth url: {}", err);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            res.render(Text::Plain(format!("Error generating Auth URL: {}", err)));
        }
    }
}

#[handler]
pub async fn google_callback(req: &mut Request, res: &mut Response) {
    let code = match req.query::<String>("code") {
        Some(code) if !code.is_empty() => code,
        _ => {
            res.status_code(StatusCode::BAD_REQUEST);
            res.render(Text::Plain("No code provided"));
            return;
        }
    };

    match web_state().drive.exchange_code(&code).await {
        Ok(_) => {
            info!("google drive connected");
            res.render(Text::Html(CONNECTED_PAGE));
        }
        Err(err) => {
            error!("drive authorization failed: {}", err);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            res.render(Text::Plain(format!("Authentication Failed: {}", err)));
        }
    }
}

#[handler]
pub async fn drive_status(res: &mut Response) {
    let drive = &web_state().drive;
    res.render(Json(json!({
        "connected": drive.is_connected(),
        "configured": drive.has_client(),
    })));
}

#[handler]
pub async fn drive_about(res: &mut Response) {
    match web_state().drive.about().await {
        Ok(quota) => res.render(Json(quota)),
        Err(DriveError::NotConnected) => {
            render_error(res, StatusCode::UNAUTHORIZED, "Google Drive not connected");
        }
        Err(err) => render_internal_error(res, "failed to read drive quota", err),
    }
}

#[handler]
pub async fn drive_disconnect(res: &mut Response) {
    match web_state().drive.disconnect().await {
        Ok(()) => res.render(Json(json!({ "message": "Google Drive disconnected" }))),
        Err(err) => render_internal_error(res, "failed to disconnect drive", err),
    }
}

#[handler]
pub async fn drive_file(req: &mut Request, res: &mut Response) {
    let Some(file_id) = req.param::<String>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing file id");
        return;
    };

    match web_state().drive.file_metadata(&file_id).await {
        Ok(file) => res.render(Json(file)),
        Err(DriveError::NotConnected) => {
            render_error(res, StatusCode::UNAUTHORIZED, "Google Drive not connected");
        }
        Err(DriveError::Api { status, .. }) if status.as_u16() == 404 => {
            render_error(res, StatusCode::NOT_FOUND, "Drive file not found");
        }
        Err(err) => render_internal_error(res, "failed to read drive file", err),
    }
}
