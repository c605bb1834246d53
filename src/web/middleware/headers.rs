use salvo::http::header::{HeaderName, HeaderValue, X_CONTENT_TYPE_OPTIONS};
use salvo::prelude::*;

/// Lets posters and video be embedded from other origins.
#[handler]
pub async fn security_headers(res: &mut Response) {
    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("cross-origin"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
}
