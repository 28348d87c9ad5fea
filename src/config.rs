use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Documents in `<workspace>/classroom.sqlite3`.
    Sqlite,
    /// Process-local datastore, gone on exit.
    Memory,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "classroomd", version, about = "Classroom data sidecar speaking line-delimited JSON on stdio")]
pub struct Config {
    #[arg(long, env = "CLASSROOMD_BACKEND", value_enum, default_value_t = Backend::Sqlite)]
    pub backend: Backend,

    /// Workspace to open at start-up (sqlite backend only).
    #[arg(long, env = "CLASSROOMD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Secret used to sign bearer tokens. A random one is generated when absent,
    /// which invalidates tokens on restart.
    #[arg(long, env = "CLASSROOMD_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    #[arg(long, env = "CLASSROOMD_SESSION_TTL_DAYS", default_value_t = 7)]
    pub session_ttl_days: i64,

    /// Default filter when RUST_LOG is unset.
    #[arg(long, env = "CLASSROOMD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_sqlite_and_seven_day_sessions() {
        let cfg = Config::try_parse_from(["classroomd"]).expect("parse");
        assert_eq!(cfg.backend, Backend::Sqlite);
        assert_eq!(cfg.session_ttl_days, 7);
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn memory_backend_flag_parses() {
        let cfg = Config::try_parse_from(["classroomd", "--backend", "memory", "--token-secret", "s"])
            .expect("parse");
        assert_eq!(cfg.backend, Backend::Memory);
        assert_eq!(cfg.token_secret.as_deref(), Some("s"));
    }
}
