use salvo::prelude::*;
use serde_json::json;

/// Renders bodyless error responses as JSON.
#[handler]
pub async fn handle_error(res: &mut Response, ctrl: &mut FlowCtrl) {
    let status = res
        .status_code
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_client_error() && !status.is_server_error() {
        return;
    }

    res.render(Json(json!({ "error": error_message(status) })));
    ctrl.skip_rest();
}

pub fn error_message(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        "Internal Server Error"
    } else {
        status.canonical_reason().unwrap_or("Request Error")
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(StatusCode::NOT_FOUND, "Not Found")]
    #[test_case(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")]
    #[test_case(StatusCode::BAD_GATEWAY, "Internal Server Error")]
    #[test_case(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")]
    fn error_messages(status: StatusCode, expected: &str) {
        assert_eq!(error_message(status), expected);
    }
}
