//! Call resolution with bounded repair of malformed calls.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::parser::parse_call;
use crate::core::types::Role;
use crate::errors::ProtocolError;
use crate::handlers;
use crate::instructions;
use crate::respond::request_calls;
use crate::session::{Backends, Session};

/// Attempts per call string, the first one included.
pub const MAX_CALL_ATTEMPTS: u32 = 2;

/// Resolve `call` against the session's capability table and run its handler.
///
/// A call that does not resolve triggers one corrective exchange: the
/// orchestrator is asked for a replacement, whose first call is retried and
/// whose remaining calls go to the front of the pending queue.
#[instrument(skip_all, fields(call = %call))]
pub fn dispatch(session: &mut Session, backends: Backends<'_>, call: &str) -> Result<()> {
    let mut call = call.to_string();
    let mut attempt = 1;
    let invocation = loop {
        let err = match parse_call(&call, &session.capabilities) {
            Ok(invocation) => break invocation,
            Err(err) => err,
        };
        warn!(attempt, err = %err, "call rejected");
        if attempt >= MAX_CALL_ATTEMPTS {
            return Err(ProtocolError::CallSyntax {
                call,
                attempts: attempt,
                source: err,
            }
            .into());
        }

        session.append(Role::System, instructions::SYNTAX_ERROR);
        let mut replacement = request_calls(session, backends.orchestrator)?.into_iter();
        let Some(next) = replacement.next() else {
            return Err(ProtocolError::CallSyntax {
                call,
                attempts: attempt,
                source: err,
            }
            .into());
        };
        for extra in replacement.rev() {
            session.pending.push_front(extra);
        }
        session.append(Role::Assistant, next.as_str());
        session.store.consume();
        call = next;
        attempt += 1;
    };

    debug!(name = %invocation.name, args = invocation.args.len(), "dispatching");
    handlers::invoke(session, backends, &invocation)
}
