// Simone MCP Server - Error Taxonomy
//
// Every error reaching the transport boundary is converted to structured
// data ({content, isError}) by the dispatcher. Only StorageInit is fatal:
// the server refuses to start without a writable store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing required input to a tool call. Recoverable,
    /// reported to the caller, never crashes the process.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The database could not be opened or created at startup. Fatal —
    /// the process exits non-zero before serving any request.
    #[error("storage initialization failed: {0}")]
    StorageInit(String),

    /// A write or schema operation failed after startup (lock timeout,
    /// disk I/O). Scoped to one call; the process keeps serving.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// Dispatch requested for an unregistered tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A handler panicked. Caught at the dispatcher boundary.
    #[error("tool handler panicked: {0}")]
    HandlerPanic(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Only storage initialization failures terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageInit(_))
    }
}
