use clap::Parser;
use std::path::PathBuf;

/// Grade aggregation and submission sidecar. Reads one JSON request per line
/// on stdin and answers one JSON response per line on stdout.
#[derive(Debug, Clone, Parser)]
#[command(name = "gradebookd", version, about)]
pub struct Config {
    /// Workspace directory to open at startup (same as `workspace.select`).
    #[arg(long, env = "GRADEBOOKD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter directive(s) for stderr logging, e.g. `info` or
    /// `gradebookd=debug`. `RUST_LOG` takes precedence when set.
    #[arg(long, env = "GRADEBOOKD_LOG", default_value = "warn")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let cfg = Config::try_parse_from(["gradebookd"]).expect("parse");
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn workspace_and_log_level_flags() {
        let cfg = Config::try_parse_from([
            "gradebookd",
            "--workspace",
            "/tmp/ws",
            "--log-level",
            "debug",
        ])
        .expect("parse");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_level, "debug");
    }
}
