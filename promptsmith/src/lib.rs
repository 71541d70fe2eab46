//! Conversational prompt engineering over a call-based protocol.
//!
//! An orchestrator model talks to the user and the system only through call
//! strings such as `self.submit_prompt("...")`. The engine recovers those
//! calls from free text, dispatches them against a fixed capability table,
//! and runs every proposed prompt on the user's examples through a worker
//! backend.
//!
//! - **[`core`]**: Pure, deterministic logic (message store, branch views,
//!   call parsing, chat formats). No I/O.
//! - **[`io`]**: Side-effecting operations (configuration, backend processes,
//!   templates, transcripts).
//!
//! Orchestration modules ([`session`], [`turn_loop`], [`respond`],
//! [`dispatch`], [`handlers`], [`fanout`]) combine the two into the protocol
//! engine the CLI drives.

pub mod core;
pub mod dispatch;
pub mod errors;
pub mod exit_codes;
pub mod fanout;
pub mod handlers;
pub mod instructions;
pub mod io;
pub mod logging;
pub mod respond;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn_loop;
