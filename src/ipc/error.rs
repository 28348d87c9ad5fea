use crate::error::AppError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

/// HTTP-like status reported next to each wire code.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_json" | "bad_params" => 400,
        "unauthenticated" => 401,
        "forbidden" => 403,
        "not_found" | "not_implemented" => 404,
        "no_workspace" | "workspace_locked" => 409,
        _ => 500,
    }
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Envelope for a domain failure. Internal causes go to the log only.
pub fn app_err(id: &str, method: &str, e: &AppError) -> serde_json::Value {
    if e.is_internal() {
        tracing::error!(request_id = id, method, error = ?e, "request failed");
    } else {
        tracing::debug!(request_id = id, method, code = e.code(), error = %e, "request rejected");
    }
    err(id, e.code(), e.public_message(), e.details().cloned())
}
