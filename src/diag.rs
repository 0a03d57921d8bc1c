// Simone MCP Server - Best-Effort Diagnostics
//
// Persistent error/debug log under <project>/.simone/logs/, created lazily
// on the first write. Contract: these functions NEVER raise and never block
// the caller's response — a failed diagnostic write is silently dropped.
// Structured logging for operators goes through the `log` crate instead;
// this file is the durable trail that survives across sessions.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static LOGS_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Record where diagnostic files live. First call wins; calling again is a
/// no-op so tests and embedding callers cannot poison each other.
pub fn init(dir: &Path) {
    let _ = LOGS_DIR.set(dir.to_path_buf());
}

/// Append one line to error.log. Never raises.
pub fn error(msg: &str) {
    write_line("error.log", msg);
}

/// Append one line to debug.log. Never raises.
pub fn debug(msg: &str) {
    write_line("debug.log", msg);
}

fn write_line(file: &str, msg: &str) {
    let Some(dir) = LOGS_DIR.get() else {
        // Not initialized (e.g. unit tests) — drop the line.
        return;
    };
    if std::fs::create_dir_all(dir).is_err() {
        return;
    }
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(dir.join(file)) {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(f, "[{}] {}", ts, msg);
    }
}
