// Simone MCP Server - Path Resolution
//
// Single source of truth for the on-disk layout under a project directory.
// Everything the server persists lives below <project>/.simone/.

use std::path::{Path, PathBuf};

/// Directory created under the project root for all server state.
pub const DATA_DIR: &str = ".simone";

/// Root of all Simone state for a project.
pub fn data_dir(project: &Path) -> PathBuf {
    project.join(DATA_DIR)
}

/// The activity database file.
pub fn db_path(project: &Path) -> PathBuf {
    data_dir(project).join("simone.db")
}

/// Diagnostic log directory — created lazily on first write, see diag.rs.
pub fn logs_dir(project: &Path) -> PathBuf {
    data_dir(project).join("logs")
}
