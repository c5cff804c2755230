//! Error types and error handling strategy for Corral.
//!
//! Every failure that crosses a frame, block, or instruction boundary is an
//! [`Error`]. Errors are cloneable because a single settlement is observed by
//! any number of waiters (task joins, teardown, supervisors).
//!
//! # Error Categories
//!
//! - **Termination**: a block was aborted from outside ([`ErrorKind::Halted`])
//! - **Protocol**: an action or resource body broke the settlement contract
//! - **Frames**: work submitted to a frame whose teardown already started
//! - **Channels**: sends on a closed channel, detached subscriptions
//! - **Runtime**: the executor can make no further progress, or was misused
//! - **Configuration**: invalid builder, environment, or file settings
//! - **User**: errors raised by operations themselves
//!
//! Teardown failures are not a separate kind: whatever error a cleanup path
//! raises is carried as-is and supersedes the primary outcome of the frame
//! being torn down.

use core::fmt;
use std::sync::Arc;

use crate::types::{BlockId, FrameId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Termination ===
    /// The block was aborted before it produced its own outcome.
    Halted,

    // === Protocol ===
    /// An action or resource body finished without settling.
    ProtocolViolation,

    // === Frames ===
    /// The frame is tearing down or already torn down.
    FrameClosed,

    // === Channels ===
    /// The channel was closed, or the subscription is no longer attached.
    ChannelClosed,

    // === Runtime ===
    /// Nothing is runnable and no timer is pending (virtual clock only).
    Stalled,
    /// The configured poll-step limit was exceeded.
    StepLimit,
    /// An API was used from a state where it is not allowed.
    InvalidStateTransition,

    // === Configuration ===
    /// Invalid runtime configuration.
    Config,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,

    // === User ===
    /// User-provided error.
    User,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Halted => ErrorCategory::Termination,
            Self::ProtocolViolation => ErrorCategory::Protocol,
            Self::FrameClosed => ErrorCategory::Frame,
            Self::ChannelClosed => ErrorCategory::Channel,
            Self::Stalled | Self::StepLimit | Self::InvalidStateTransition => {
                ErrorCategory::Runtime
            }
            Self::Config => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns true if a supervisor should treat this error as a failure.
    ///
    /// Termination is the expected result of tearing something down and is
    /// never escalated on its own.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Halted)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// External cancellation.
    Termination,
    /// Settlement contract violations.
    Protocol,
    /// Frame lifecycle failures.
    Frame,
    /// Channel failures.
    Channel,
    /// Executor failures.
    Runtime,
    /// Configuration failures.
    Config,
    /// Internal runtime errors.
    Internal,
    /// User-originated errors.
    User,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The frame where the error was observed.
    pub frame_id: Option<FrameId>,
    /// The block where the error was observed.
    pub block_id: Option<BlockId>,
}

/// The main error type for Corral operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                frame_id: None,
                block_id: None,
            },
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    fn prefixed(mut self, what: String) -> Self {
        self.message = Some(match self.message.take() {
            Some(existing) => format!("{what}: {existing}"),
            None => what,
        });
        self
    }

    /// The distinguished termination error fed into an aborted operation.
    #[must_use]
    pub fn halted() -> Self {
        Self::new(ErrorKind::Halted).with_message("halted")
    }

    /// An action or resource body broke its settlement contract.
    #[must_use]
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation).with_message(detail)
    }

    /// The frame no longer accepts work.
    #[must_use]
    pub fn frame_closed(frame: FrameId) -> Self {
        Self::new(ErrorKind::FrameClosed)
            .with_message(format!("frame {frame} is torn down"))
            .with_context(ErrorContext {
                frame_id: Some(frame),
                block_id: None,
            })
    }

    /// The channel does not accept more items.
    #[must_use]
    pub fn channel_closed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChannelClosed).with_message(detail)
    }

    /// A user-level failure with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Wraps an arbitrary error raised by an operation.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let message = source.to_string();
        Self::new(ErrorKind::User)
            .with_message(message)
            .with_source(source)
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns true if this error is the termination signal.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self.kind, ErrorKind::Halted)
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        match (self.context.frame_id, self.context.block_id) {
            (Some(frame), Some(block)) => write!(f, " (in {frame}/{block})"),
            (Some(frame), None) => write!(f, " (in {frame})"),
            (None, Some(block)) => write!(f, " (in {block})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for describing where a `Result` failed.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Prefixes the error message with `what` on error.
    fn context(self, what: impl Into<String>) -> Result<T>;
    /// Like [`context`](Self::context), computing the prefix only on error.
    fn with_context<F: FnOnce() -> String>(self, what: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, what: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().prefixed(what.into()))
    }

    fn with_context<F: FnOnce() -> String>(self, what: F) -> Result<T> {
        self.map_err(|e| e.into().prefixed(what()))
    }
}

/// Result type used throughout the crate.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_shows_kind_message_and_location() {
        assert_eq!(Error::new(ErrorKind::Internal).to_string(), "Internal");
        assert_eq!(Error::user("boom").to_string(), "User: boom");
        let located = Error::user("boom").with_context(ErrorContext {
            frame_id: Some(FrameId::new_for_test(1, 0)),
            block_id: Some(BlockId::new_for_test(2, 0)),
        });
        assert_eq!(located.to_string(), "User: boom (in F1/B2)");
    }

    #[test]
    fn halted_is_not_a_failure() {
        let err = Error::halted();
        assert!(err.is_halted());
        assert!(!err.kind().is_failure());
        assert_eq!(err.category(), ErrorCategory::Termination);
        assert!(Error::user("x").kind().is_failure());
    }

    #[test]
    fn from_source_keeps_chain_and_message() {
        let err = Error::from_source(Underlying);
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.message(), Some("underlying"));
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn frame_closed_carries_frame_context() {
        let frame = FrameId::new_for_test(3, 0);
        let err = Error::frame_closed(frame);
        assert_eq!(err.kind(), ErrorKind::FrameClosed);
        assert_eq!(err.context().frame_id, Some(frame));
        assert!(err.to_string().ends_with("(in F3)"));
    }

    #[test]
    fn context_prefixes_existing_message() {
        let res: core::result::Result<(), Error> = Err(Error::channel_closed("send after close"));
        let err = res.context("publishing tick").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(err.to_string(), "ChannelClosed: publishing tick: send after close");
    }

    #[test]
    fn context_on_bare_error_sets_message() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::Stalled));
        let err = res.with_context(|| "waiting for shutdown".into()).expect_err("err");
        assert_eq!(err.message(), Some("waiting for shutdown"));
    }
}
