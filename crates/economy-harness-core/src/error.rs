//! Error taxonomy shared by every layer.
//!
//! Library functions in the application crate return `anyhow::Result`, but
//! the failures callers need to branch on are raised as one of these
//! variants so they can be recovered with `err.downcast_ref::<Error>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A record, term, grouping, or history entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input XML, manifest, or stored sidecar could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A caller-supplied value was rejected before touching the store.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A destructive operation failed and restoring its backup failed too.
    #[error("operation failed ({original}); rollback also failed ({rollback})")]
    RollbackFailed { original: String, rollback: String },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Error::MalformedInput(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Error::Validation(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }
}

/// Returns the typed error carried by an `anyhow::Error`, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&Error> {
    err.downcast_ref::<Error>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_survive_anyhow_context() {
        let err = anyhow::Error::new(Error::not_found("record Apple"))
            .context("loading record for export");
        assert!(matches!(kind_of(&err), Some(Error::NotFound(_))));
    }

    #[test]
    fn rollback_message_names_both_failures() {
        let err = Error::RollbackFailed {
            original: "disk full".to_string(),
            rollback: "backup missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("disk full"));
        assert!(msg.contains("backup missing"));
    }
}
