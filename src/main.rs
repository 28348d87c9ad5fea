mod access;
mod analytics;
mod auth;
mod backup;
mod calc;
mod config;
mod curriculum;
mod db;
mod error;
mod grading;
mod ipc;
mod logging;
mod messaging;
mod model;
mod store;

use anyhow::Context;
use clap::Parser;
use config::{Backend, Config};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::setup(&config.log_level)?;

    let signer = match config.token_secret.as_deref() {
        Some(secret) if !secret.is_empty() => auth::TokenSigner::new(secret, config.session_ttl_days),
        _ => {
            warn!("no token secret configured; tokens will not survive a restart");
            auth::TokenSigner::random(config.session_ttl_days)
        }
    };
    let mut state = ipc::AppState::new(&config, signer);

    if let Some(workspace) = config.workspace.clone() {
        if config.backend == Backend::Memory {
            warn!("--workspace is ignored by the memory backend");
        } else {
            ipc::open_workspace(&mut state, workspace).context("failed to open workspace")?;
        }
    }
    info!(backend = ?config.backend, version = env!("CARGO_PKG_VERSION"), "classroomd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No request id to echo back.
            Err(e) => ipc::err("", "bad_json", e.to_string(), None),
        };
        let text = serde_json::to_string(&resp)
            .unwrap_or_else(|_| "{\"ok\":false}".to_string());
        let _ = writeln!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    info!("stdin closed, shutting down");
    Ok(())
}
