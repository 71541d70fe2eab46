//! The turn loop: orchestrator requests and queue draining.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::types::Role;
use crate::dispatch::dispatch;
use crate::respond::request_calls;
use crate::session::{Backends, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingOrchestrator,
    DrainingQueue,
    Idle,
}

/// Reason why `run_turn` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStop {
    /// Nothing left to send; waiting for user input.
    Idle,
    /// `done` was dispatched.
    Finished,
}

/// Summary of one turn-loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Orchestrator responses that produced calls (corrective retries excluded).
    pub responses: u32,
    pub calls_dispatched: u32,
    pub stop: TurnStop,
}

/// Drive the protocol until the orchestrator has nothing left to say.
///
/// Calls from one response are dispatched in order before the orchestrator is
/// asked again. Transcripts are rewritten after every dispatch. Any error
/// aborts the invocation with the pending queue cleared; turns appended so
/// far stay in the log.
#[instrument(skip_all, fields(model_cursor = session.store.model_cursor()))]
pub fn run_turn<F: FnMut(&str)>(
    session: &mut Session,
    backends: Backends<'_>,
    mut on_call: F,
) -> Result<TurnOutcome> {
    let mut responses = 0u32;
    let mut calls_dispatched = 0u32;
    let mut state = LoopState::AwaitingOrchestrator;

    while state != LoopState::Idle {
        state = match state {
            LoopState::AwaitingOrchestrator => {
                if session.finished || !session.store.has_unconsumed() {
                    LoopState::Idle
                } else {
                    let calls = match request_calls(session, backends.orchestrator) {
                        Ok(calls) => calls,
                        Err(err) => return Err(abort(session, err)),
                    };
                    responses += 1;
                    session.pending.extend(calls);
                    LoopState::DrainingQueue
                }
            }
            LoopState::DrainingQueue => match session.pending.pop_front() {
                None => LoopState::AwaitingOrchestrator,
                Some(call) => {
                    session.append(Role::Assistant, call.as_str());
                    session.store.consume();
                    if let Err(err) = dispatch(session, backends, &call) {
                        return Err(abort(session, err));
                    }
                    calls_dispatched += 1;
                    on_call(&call);
                    if let Err(err) = session.persist() {
                        return Err(abort(session, err));
                    }
                    if session.pending.is_empty() {
                        LoopState::AwaitingOrchestrator
                    } else {
                        LoopState::DrainingQueue
                    }
                }
            },
            LoopState::Idle => LoopState::Idle,
        };
    }

    let stop = if session.finished {
        TurnStop::Finished
    } else {
        TurnStop::Idle
    };
    debug!(responses, calls_dispatched, ?stop, "turn loop idle");
    Ok(TurnOutcome {
        responses,
        calls_dispatched,
        stop,
    })
}

/// Same as [`run_turn`] without a per-call callback.
pub fn run_turn_quiet(session: &mut Session, backends: Backends<'_>) -> Result<TurnOutcome> {
    run_turn(session, backends, |_| {})
}

fn abort(session: &mut Session, err: anyhow::Error) -> anyhow::Error {
    if !session.pending.is_empty() {
        warn!(dropped = session.pending.len(), "dropping pending calls");
        session.pending.clear();
    }
    if let Err(persist_err) = session.persist() {
        warn!(err = %persist_err, "failed to write transcripts after error");
    }
    err
}
