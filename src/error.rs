//! Error taxonomy for the engine core and its dispatcher.
//!
//! Mirrors the per-operation-family error enums used throughout the sequencer
//! this engine is modeled on (see e.g. `InsertIdentityV2Error`,
//! `DeleteIdentityV2Error`): callers get a small, precise enum rather than a
//! single catch-all error, and every variant maps to exactly one row of the
//! failure taxonomy.

use thiserror::Error;

use crate::types::Address;

/// Failures a transition can report back to its caller without touching
/// state. Every variant here corresponds to a named row in the failure
/// taxonomy; `InvariantViolation` is the exception; see its doc comment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("queue already at MAX_QUEUE_HEIGHT")]
    QueueTooLong,

    #[error("bid is below the current minimum")]
    BidTooLow,

    #[error("no auction is currently open")]
    NoOpenAuction,

    #[error("slice is not queued and cannot be cancelled")]
    UnwarrantedCancellation,

    #[error("cannot reclaim the currently leading bid")]
    CannotReclaimLeadingBid,

    #[error("cannot reclaim a winning bid through the losing-bid path")]
    CannotReclaimWinningBid,

    #[error("handle does not match the winning bid of its auction")]
    NotAWinningBid,

    #[error("not all slices of the lot have been claimed yet")]
    NotAllSlicesClaimed,

    #[error("slice is not part of any completed auction")]
    NotACompletedSlice,

    #[error("burrow {0} has a completed liquidation with unclaimed slices")]
    BurrowHasCompletedLiquidation(Address),

    /// An internal consistency check failed. Unrecoverable: the caller must
    /// log and abort rather than attempt to continue on corrupted state. See
    /// [`crate::error::abort_on_invariant_violation`].
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Errors raised by the dispatcher layer itself, before a message ever
/// reaches the pure state machine: authorization and payability checks.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("sender {sender} is not authorized to call this entrypoint")]
    NotAuthorized { sender: Address },

    #[error("this entrypoint does not accept an attached amount, got {amount} mutez")]
    UnexpectedAmount { amount: crate::types::Mutez },
}

/// Logs the invariant violation at error level and aborts the process, per
/// the rule that invariant violations are unrecoverable. Kept
/// as a single chokepoint so every call site logs identically.
#[track_caller]
pub fn abort_on_invariant_violation(detail: &str) -> ! {
    tracing::error!(detail, "invariant violation, aborting");
    panic!("invariant violation: {detail}");
}
