use salvo::prelude::*;
use serde_json::json;

use crate::web::metrics::Metrics;
use crate::web::web_state;

#[handler]
pub async fn root(res: &mut Response) {
    res.render(Text::Plain("Neon Stream API is running..."));
}

#[handler]
pub async fn health_check(res: &mut Response) {
    let state = web_state();
    res.render(Json(json!({
        "status": "ok",
        "uptime_seconds": Metrics::uptime_seconds(),
        "version": env!("CARGO_PKG_VERSION"),
        "database": format!("{:?}", state.db_manager.db_type()),
        "drive_connected": state.drive.is_connected(),
        "video_backend": state.config.media.video_backend,
    })));
}
