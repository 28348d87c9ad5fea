use std::path::PathBuf;

use serde::Deserialize;

use crate::auth::TokenSigner;
use crate::config::{Backend, Config};
use crate::store::memory::MemoryStore;
use crate::store::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub token: Option<String>,
}

pub struct AppState {
    pub backend: Backend,
    pub workspace: Option<PathBuf>,
    pub store: Option<Box<dyn Store>>,
    pub signer: TokenSigner,
}

impl AppState {
    /// The memory backend has its store from the start; the SQLite backend
    /// waits for a workspace.
    pub fn new(config: &Config, signer: TokenSigner) -> Self {
        let store: Option<Box<dyn Store>> = match config.backend {
            Backend::Memory => Some(Box::new(MemoryStore::new())),
            Backend::Sqlite => None,
        };
        Self {
            backend: config.backend,
            workspace: None,
            store,
            signer,
        }
    }
}
