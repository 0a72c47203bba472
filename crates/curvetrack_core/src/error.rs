//! Fatal error categories.
//!
//! Library code propagates `anyhow::Error`; the variants here are wrapped
//! inside it so frontends can downcast and pick a process exit code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    /// The input system cannot be used in the requested mode.
    #[error("invalid input system: {0}")]
    InputSystem(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("cannot access {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A move-to-projection solve produced no point.
    #[error("solver returned no points while sampling edge {edge}")]
    EmptySolve { edge: usize },
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::InputSystem(_) => 2,
            FatalError::Resource { .. } => 3,
            FatalError::EmptySolve { .. } => 4,
            FatalError::NotImplemented(_) => 99,
        }
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FatalError::Resource {
            path: path.into(),
            source,
        }
    }
}

/// Exit code for an arbitrary error chain: the first `FatalError` found
/// decides, anything else maps to 1.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<FatalError>())
        .map(FatalError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_survives_context_wrapping() {
        let result: anyhow::Result<()> = Err(FatalError::NotImplemented("track-back endgame".into()).into());
        let err = result.context("while tracking").unwrap_err();
        assert_eq!(exit_code_for(&err), 99);
    }

    #[test]
    fn unknown_errors_map_to_one() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&err), 1);
    }
}
