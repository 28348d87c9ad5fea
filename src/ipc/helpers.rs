use crate::auth::{self, Session};
use crate::error::{AppError, AppResult};
use crate::ipc::error::{app_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// Either a typed value or the ready-to-send error envelope.
pub type Reply<T> = Result<T, Value>;

/// Unwraps a [`Reply`], returning its error envelope from the handler.
macro_rules! take {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(resp) => return resp,
        }
    };
}
pub(crate) use take;

pub fn fail(req: &Request, e: AppError) -> Value {
    app_err(&req.id, &req.method, &e)
}

pub fn respond<T: Serialize>(req: &Request, result: AppResult<T>) -> Value {
    match result.and_then(|v| {
        serde_json::to_value(v).map_err(|e| AppError::Internal(anyhow::Error::new(e)))
    }) {
        Ok(v) => ok(&req.id, v),
        Err(e) => fail(req, e),
    }
}

/// Wraps a successful value under `key`.
pub fn respond_as<T: Serialize>(req: &Request, key: &str, result: AppResult<T>) -> Value {
    respond(req, result.map(|v| json!({ key: v })))
}

pub fn params<T: DeserializeOwned>(req: &Request) -> Reply<T> {
    let raw = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| {
        fail(
            req,
            AppError::validation_with(
                format!("invalid params: {e}"),
                json!({ "method": req.method }),
            ),
        )
    })
}

pub fn required_str(req: &Request, key: &str) -> Reply<String> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(fail(
            req,
            AppError::validation_with(format!("missing {key}"), json!({ "field": key })),
        )),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves the bearer token on `req` into a session over the open store.
pub fn authed<'a>(state: &'a mut AppState, req: &Request) -> Reply<(&'a mut dyn Store, Session)> {
    let signer = &state.signer;
    let Some(store) = state.store.as_deref_mut() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let Some(token) = req.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Err(fail(req, AppError::unauthenticated("missing token")));
    };
    let session = auth::authenticate(&*store, signer, token).map_err(|e| fail(req, e))?;
    Ok((store, session))
}
