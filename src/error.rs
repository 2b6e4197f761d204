//! Unified error type for the diversion engine's public boundary.
//!
//! `DivertError` is the `Err` type of `EngineController::start()` and of any other
//! fallible public entry point. Per spec §7, only *fatal init* failures ever reach this
//! type — transient per-packet failures are logged through `MessageSinks` and swallowed
//! at the worker boundary, never returned.

/// Errors that can abort `EngineController::start()` before the engine reaches `Running`.
#[derive(Debug, thiserror::Error)]
pub enum DivertError {
    /// A capture handle (TCP rewrite or UDP drop) failed to open. Spec §4.1: "`open` fails
    /// with a fatal error (engine cannot start)".
    #[error("failed to open capture handle: {0}")]
    CaptureOpen(String),

    /// `check_filter` rejected an expression before any handle was opened, including the
    /// position of the syntax error the platform capture facility reported.
    #[error("filter expression rejected at position {position}: {message}")]
    FilterRejected { message: String, position: usize },

    /// The out-of-core certificate authority failed to establish trust (spec §4.7: "Start
    /// order: CA trust established -> acceptors created ...").
    #[error("certificate authority setup failed: {0}")]
    CertificateAuthority(String),

    /// The platform has no real `CaptureDriver` backend (spec §9 design note 1: compile-time
    /// platform selection).
    #[error("packet diversion is not supported on this platform")]
    UnsupportedPlatform,

    /// The engine was asked to start while already running, or stop while already stopped.
    #[error("invalid engine state transition: {0}")]
    InvalidState(String),
}

impl From<anyhow::Error> for DivertError {
    fn from(err: anyhow::Error) -> Self {
        DivertError::CaptureOpen(format!("{err:#}"))
    }
}
