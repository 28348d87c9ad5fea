use crate::access;
use crate::backup;
use crate::config::Backend;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{authed, fail, required_str, take};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

/// Backups copy the workspace database, so they need the SQLite backend and
/// an admin caller.
fn admin_workspace(state: &mut AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    if state.backend != Backend::Sqlite {
        return Err(err(
            &req.id,
            "bad_params",
            "backups require the sqlite backend",
            None,
        ));
    }
    let (_, session) = authed(state, req)?;
    access::require_admin(&session).map_err(|e| fail(req, e))?;
    state
        .workspace
        .clone()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = take!(admin_workspace(state, req));
    let out_path = take!(required_str(req, "outPath"));

    let out = PathBuf::from(&out_path);
    match backup::export_workspace_bundle(&workspace, &out) {
        Ok(export) => {
            info!(path = %out_path, "workspace exported");
            ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": export.bundle_format,
                    "entryCount": export.entry_count,
                    "dbSha256": export.db_sha256,
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = take!(admin_workspace(state, req));
    let in_path = take!(required_str(req, "inPath"));

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop the open connection before the database file is replaced.
    state.store = None;
    let imported = backup::import_workspace_bundle(&src, &workspace);
    let reopened = open_workspace(state, workspace.clone());

    match (imported, reopened) {
        (Ok(summary), Ok(path)) => {
            info!(path = %in_path, "workspace imported");
            ok(
                &req.id,
                json!({
                    "workspacePath": path,
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        (Err(e), _) => {
            warn!(path = %in_path, error = %e, "import rejected");
            err(
                &req.id,
                "bad_params",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
        (Ok(_), Err(e)) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
