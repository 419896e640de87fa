mod calc;
mod db;
mod import;
mod ipc;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Marks and statistics sidecar. Reads one JSON request per line on stdin and
/// answers one JSON response per line on stdout.
#[derive(Debug, Parser)]
#[command(name = "edulyticsd", version)]
struct Cli {
    /// Workspace directory to open at start-up.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Session school id, used when a request carries no `schoolId`.
    #[arg(long)]
    school_id: Option<String>,

    /// Log filter directives (overrides RUST_LOG), e.g. `debug` or `edulyticsd=trace`.
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_logging(cli: &Cli) {
    let filter = match cli.log_filter.as_deref() {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    info!("edulyticsd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        school_id: cli.school_id.clone(),
    };
    if let Some(path) = cli.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, path, cli.school_id.clone()) {
            // Keep serving; the UI can still pick a workspace.
            error!(workspace = %path.display(), "failed to open workspace: {e:?}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No id to echo back.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed, shutting down");
}
