use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);
static STREAMS_SERVED: AtomicU64 = AtomicU64::new(0);
static STREAM_BYTES: AtomicU64 = AtomicU64::new(0);
static DRIVE_PROXY_REQUESTS: AtomicU64 = AtomicU64::new(0);
static UPLOADS_SUCCESS: AtomicU64 = AtomicU64::new(0);
static UPLOADS_FAILED: AtomicU64 = AtomicU64::new(0);
static VIEWS_COUNTED: AtomicU64 = AtomicU64::new(0);
static DRIVE_TOKEN_REFRESHES: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    /// Pins the uptime origin; call once at startup.
    pub fn init() {
        Lazy::force(&PROCESS_START);
    }

    pub fn stream_served(bytes: u64) {
        STREAMS_SERVED.fetch_add(1, Ordering::Relaxed);
        STREAM_BYTES.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn drive_proxy_request() {
        DRIVE_PROXY_REQUESTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_succeeded() {
        UPLOADS_SUCCESS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_failed() {
        UPLOADS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn view_counted() {
        VIEWS_COUNTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn drive_token_refreshed() {
        DRIVE_TOKEN_REFRESHES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds() -> u64 {
        PROCESS_START.elapsed().as_secs()
    }
}

pub fn format_prometheus() -> String {
    let uptime = Metrics::uptime_seconds();
    let streams = STREAMS_SERVED.load(Ordering::Relaxed);
    let stream_bytes = STREAM_BYTES.load(Ordering::Relaxed);
    let drive_proxy = DRIVE_PROXY_REQUESTS.load(Ordering::Relaxed);
    let uploads_success = UPLOADS_SUCCESS.load(Ordering::Relaxed);
    let uploads_failed = UPLOADS_FAILED.load(Ordering::Relaxed);
    let views = VIEWS_COUNTED.load(Ordering::Relaxed);
    let refreshes = DRIVE_TOKEN_REFRESHES.load(Ordering::Relaxed);

    format!(
        r#"# HELP neon_uptime_seconds Number of seconds the server has been running
# TYPE neon_uptime_seconds gauge
neon_uptime_seconds {}

# HELP neon_streams_served_total Local video responses started
# TYPE neon_streams_served_total counter
neon_streams_served_total {}

# HELP neon_stream_bytes_total Bytes scheduled for local video responses
# TYPE neon_stream_bytes_total counter
neon_stream_bytes_total {}

# HELP neon_drive_proxy_requests_total Video requests proxied to Google Drive
# TYPE neon_drive_proxy_requests_total counter
neon_drive_proxy_requests_total {}

# HELP neon_uploads_success_total Movie uploads that completed
# TYPE neon_uploads_success_total counter
neon_uploads_success_total {}

# HELP neon_uploads_failed_total Movie uploads that failed
# TYPE neon_uploads_failed_total counter
neon_uploads_failed_total {}

# HELP neon_views_counted_total View increments recorded
# TYPE neon_views_counted_total counter
neon_views_counted_total {}

# HELP neon_drive_token_refreshes_total Drive access token refreshes
# TYPE neon_drive_token_refreshes_total counter
neon_drive_token_refreshes_total {}
"#,
        uptime, streams, stream_bytes, drive_proxy, uploads_success, uploads_failed, views, refreshes,
    )
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    res.render(format_prometheus());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_increments_counters() {
        let streams = STREAMS_SERVED.load(Ordering::Relaxed);
        let bytes = STREAM_BYTES.load(Ordering::Relaxed);
        let views = VIEWS_COUNTED.load(Ordering::Relaxed);

        Metrics::stream_served(1024);
        Metrics::view_counted();

        assert!(STREAMS_SERVED.load(Ordering::Relaxed) > streams);
        assert!(STREAM_BYTES.load(Ordering::Relaxed) >= bytes + 1024);
        assert!(VIEWS_COUNTED.load(Ordering::Relaxed) > views);
    }

    #[test]
    fn format_prometheus_includes_all_metrics() {
        let output = format_prometheus();
        assert!(output.contains("neon_uptime_seconds"));
        assert!(output.contains("neon_streams_served_total"));
        assert!(output.contains("neon_drive_proxy_requests_total"));
        assert!(output.contains("neon_uploads_failed_total"));
        assert!(output.contains("neon_drive_token_refreshes_total"));
    }
}
