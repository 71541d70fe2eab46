//! Typed protocol errors.
//!
//! Everything flows through `anyhow::Result`; callers that need to react to a
//! specific failure class use `downcast_ref` on these types.

use thiserror::Error;

/// A single orchestrator response could not be split into calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response contains no recognized calls")]
    NoCalls,
    #[error("response contains text outside call spans: {0:?}")]
    StrayText(String),
}

/// A call string could not be resolved to a handler and string arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallSyntaxError {
    #[error("'{0}' is not a declared call")]
    UnknownCall(String),
    #[error("call is missing its argument list")]
    MissingArguments,
    #[error("expected a double-quoted argument at byte {0}")]
    ExpectedQuotedArgument(usize),
    #[error("unterminated string argument")]
    UnterminatedString,
    #[error("unsupported escape '\\{0}'")]
    BadEscape(char),
    #[error("expected ',' or ')' at byte {0}")]
    ExpectedSeparator(usize),
    #[error("unexpected text after call: {0:?}")]
    TrailingText(String),
    #[error("{name} takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Bounded self-correction was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("orchestrator response rejected after {attempts} attempts: {source}")]
    Parse {
        attempts: u32,
        #[source]
        source: ParseError,
    },
    #[error("call {call:?} rejected after {attempts} attempts: {source}")]
    CallSyntax {
        call: String,
        attempts: u32,
        #[source]
        source: CallSyntaxError,
    },
}

/// Domain-level failure inside a call handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("'{0}' is not a valid example number")]
    InvalidExampleNumber(String),
    #[error("example {number} is out of range (session has {count} examples)")]
    ExampleOutOfRange { number: usize, count: usize },
    #[error("output for example {number} was already accepted in round {round}")]
    OutputAlreadyAccepted { number: usize, round: usize },
    #[error("no prompt has been submitted yet")]
    NoActiveRound,
    #[error("session has no examples")]
    NoExamples,
    #[error("session is already started")]
    AlreadyStarted,
    #[error("no handler is registered for '{0}'")]
    NoHandler(String),
}

/// The generation backend itself failed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{backend} timed out after {secs}s")]
    TimedOut { backend: String, secs: u64 },
    #[error("{backend} exited with status {code:?}")]
    Failed { backend: String, code: Option<i32> },
    #[error("{backend} produced an empty response")]
    Empty { backend: String },
}
