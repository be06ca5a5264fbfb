mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod store;
mod submission;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_logging(cfg: &config::Config) {
    // stdout carries the protocol; logs go to stderr only.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::parse();
    init_logging(&cfg);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = cfg.workspace.as_deref() {
        ipc::select_workspace(&mut state, path)?;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed with error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; answer with an id-less error line.
                tracing::debug!(error = %e, "unparseable request");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}
