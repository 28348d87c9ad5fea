use crate::config::Backend;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::store::sqlite::SqliteStore;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn backend_name(backend: Backend) -> &'static str {
    match backend {
        Backend::Sqlite => "sqlite",
        Backend::Memory => "memory",
    }
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": backend_name(state.backend),
            "storeOpen": state.store.is_some(),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.backend == Backend::Memory {
        return err(
            &req.id,
            "bad_params",
            "workspace.select requires the sqlite backend",
            None,
        );
    }
    let path = match required_str(req, "path") {
        Ok(p) => PathBuf::from(p),
        Err(resp) => return resp,
    };
    match open_workspace(state, path) {
        Ok(path) => ok(&req.id, json!({ "workspacePath": path })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

/// Opens (creating when missing) the workspace database and makes it the
/// active store.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<String> {
    let store = SqliteStore::open(&path)?;
    state.store = Some(Box::new(store));
    state.workspace = Some(path.clone());
    let shown = path.to_string_lossy().to_string();
    info!(workspace = %shown, "workspace opened");
    Ok(shown)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
