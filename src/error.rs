//! Error types shared across the extraction pipeline.
//!
//! The pipeline distinguishes two kinds of failure. A [`UserError`] is a
//! fatal, user-actionable problem (bad configuration, a query the server
//! rejected, a missing incremental column); it aborts the run with its
//! message and is never retried. Everything else travels as a plain
//! `anyhow::Error` and may be retried where a retry policy applies.

use thiserror::Error;

/// A fatal failure whose message is addressed to the person who wrote the
/// configuration.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Wrap a user-facing message into an `anyhow::Error`.
pub fn user_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UserError::new(message))
}

/// True when the error chain bottoms out in a [`UserError`].
///
/// The retry layer checks this to abort immediately instead of backing off,
/// and the exit path uses it to decide whether a message is safe to show
/// without internal context.
pub fn is_user_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<UserError>().is_some())
}
