//! Handlers behind the standard capability table.
//!
//! Example numbers are 1-based on the wire and 0-based everywhere else.

use anyhow::{Result, anyhow};
use tracing::{info, instrument};

use crate::core::capabilities::{
    DONE, END_OUTPUTS_DISCUSSION, OUTPUT_ACCEPTED, SUBMIT_MESSAGE_TO_USER, SUBMIT_PROMPT,
    SWITCH_TO_EXAMPLE,
};
use crate::core::parser::{CallInvocation, render_call};
use crate::core::types::{BranchContext, Dimension, Role};
use crate::errors::HandlerError;
use crate::fanout::{compare_round, run_fanout};
use crate::instructions;
use crate::session::{Backends, RoundRecord, Session};

/// Run the handler registered for `invocation.name`.
pub fn invoke(
    session: &mut Session,
    backends: Backends<'_>,
    invocation: &CallInvocation,
) -> Result<()> {
    match invocation.name.as_str() {
        SUBMIT_MESSAGE_TO_USER => {
            submit_message_to_user(session, arg(invocation, 0)?);
            Ok(())
        }
        SUBMIT_PROMPT => submit_prompt(session, backends, arg(invocation, 0)?),
        SWITCH_TO_EXAMPLE => switch_to_example(session, arg(invocation, 0)?),
        OUTPUT_ACCEPTED => output_accepted(session, arg(invocation, 0)?, arg(invocation, 1)?),
        END_OUTPUTS_DISCUSSION => {
            end_outputs_discussion(session);
            Ok(())
        }
        DONE => done(session, backends),
        other => Err(HandlerError::NoHandler(other.to_string()).into()),
    }
}

fn arg(invocation: &CallInvocation, index: usize) -> Result<&str> {
    invocation
        .args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} is missing argument {}", invocation.name, index + 1))
}

pub fn submit_message_to_user(session: &mut Session, message: &str) {
    session.store.append_user_only(Role::Assistant, message);
}

/// Open a new round for `prompt`: run it on every example and hand the
/// outputs to the orchestrator for discussion.
///
/// The session is left untouched when the fan-out fails.
#[instrument(skip_all, fields(round = session.rounds.len() + 1))]
pub fn submit_prompt(session: &mut Session, backends: Backends<'_>, prompt: &str) -> Result<()> {
    if session.examples.is_empty() {
        return Err(HandlerError::NoExamples.into());
    }
    let generations = run_fanout(backends.worker, prompt, &session.examples)?;
    let mut outputs = Vec::with_capacity(generations.len());
    for generation in generations {
        session.timings.record(generation.elapsed);
        outputs.push(generation.text);
    }

    session.instructions.push(prompt.to_string());
    session.store.close_trailing(Dimension::Example);
    session.store.close_trailing(Dimension::Round);

    let example_count = session.examples.len();
    let previous_outputs = std::mem::replace(&mut session.outputs, vec![None; example_count]);
    if let Some(previous) = session.rounds.last_mut() {
        previous.accepted = previous_outputs;
    }

    let round = session.rounds.len();
    session.context = BranchContext::round(round);
    session.rounds.push(RoundRecord {
        instruction: prompt.to_string(),
        outputs: outputs.clone(),
        accepted: vec![None; example_count],
        user_log_start: session.store.user_log().len(),
        comparison: None,
    });
    info!(round = round + 1, examples = example_count, "round opened");

    session.append(Role::System, instructions::RESULT_INTRO);
    for (index, output) in outputs.iter().enumerate() {
        session.append(Role::System, instructions::example_line(index + 1, output));
    }
    if round > 0 {
        compare_round(session, backends.orchestrator, round)?;
    }
    session.append(Role::System, instructions::ANALYZE_RESULTS);
    Ok(())
}

/// Scope the discussion to one example and re-introduce its output.
pub fn switch_to_example(session: &mut Session, example_num: &str) -> Result<()> {
    let Some(round) = session.rounds.last() else {
        return Err(HandlerError::NoActiveRound.into());
    };
    let index = example_index(example_num, session.examples.len())?;
    let focus = instructions::example_focus(
        index + 1,
        &session.examples[index],
        round.outputs.get(index).map_or("", String::as_str),
    );
    session.store.close_trailing(Dimension::Example);
    session.context.example = Some(index);
    session.append(Role::System, focus);
    Ok(())
}

/// Record the accepted output and, unless more calls are queued, move the
/// discussion forward.
pub fn output_accepted(session: &mut Session, example_num: &str, output: &str) -> Result<()> {
    if session.rounds.is_empty() {
        return Err(HandlerError::NoActiveRound.into());
    }
    let count = session.examples.len();
    let index = example_index(example_num, count)?;
    if session.outputs[index].is_some() {
        return Err(HandlerError::OutputAlreadyAccepted {
            number: index + 1,
            round: session.rounds.len(),
        }
        .into());
    }
    session.outputs[index] = Some(output.to_string());
    session.store.close_trailing(Dimension::Example);
    info!(example = index + 1, "output accepted");

    if session.pending.is_empty() {
        let next = if index + 1 < count {
            let number = (index + 2).to_string();
            render_call(SWITCH_TO_EXAMPLE, &[number.as_str()])
        } else {
            render_call(END_OUTPUTS_DISCUSSION, &[])
        };
        session.pending.push_back(next);
    }
    Ok(())
}

pub fn end_outputs_discussion(session: &mut Session) {
    session.store.close_trailing(Dimension::Example);
    session.context.example = None;
    session.append(Role::System, instructions::END_OF_DISCUSSION);
}

/// Finish the session and export the prompts.
pub fn done(session: &mut Session, backends: Backends<'_>) -> Result<()> {
    session.finished = true;
    if !session.pending.is_empty() {
        info!(dropped = session.pending.len(), "dropping calls queued after done");
        session.pending.clear();
    }
    session.save_artifacts(backends)
}

/// Parse a 1-based example number into an index.
fn example_index(example_num: &str, count: usize) -> Result<usize, HandlerError> {
    let number: usize = example_num
        .trim()
        .parse()
        .map_err(|_| HandlerError::InvalidExampleNumber(example_num.to_string()))?;
    if number == 0 || number > count {
        return Err(HandlerError::ExampleOutOfRange { number, count });
    }
    Ok(number - 1)
}
