//! Concurrent per-example generation and the round comparison judgment.

use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::types::{Role, Turn};
use crate::instructions;
use crate::io::backend::{GenerateRequest, Generation, Generator, generate_text};
use crate::io::prompt::{comparison_prompt, worker_prompt};
use crate::io::transcript::{ComparisonRecord, write_comparison};
use crate::session::Session;

/// Run `instruction` against every example at once.
///
/// Results come back aligned with `examples`. Every task is joined before
/// the first failure, in example order, is returned.
#[instrument(skip_all, fields(backend = worker.name(), examples = examples.len()))]
pub fn run_fanout(
    worker: &dyn Generator,
    instruction: &str,
    examples: &[String],
) -> Result<Vec<Generation>> {
    let requests = examples
        .iter()
        .map(|text| {
            let prompt = worker_prompt(instruction, &[], text)?;
            Ok(GenerateRequest::new(vec![Turn::user(prompt)]))
        })
        .collect::<Result<Vec<_>>>()?;

    let started = Instant::now();
    let results: Vec<Result<Generation>> = thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                scope.spawn(move || {
                    let output = generate_text(worker, request);
                    debug!(example = index + 1, ok = output.is_ok(), "worker finished");
                    output
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("fan-out worker panicked")))
            })
            .collect()
    });
    info!(
        duration_ms = started.elapsed().as_millis() as u64,
        "fan-out joined"
    );

    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            result.with_context(|| format!("generate output for example {}", index + 1))
        })
        .collect()
}

/// Judge round `round` against the previous round's discussion.
///
/// The exchange runs outside the main log; only the judgment is folded back
/// as a system note under the current context.
#[instrument(skip_all, fields(round = round + 1))]
pub fn compare_round(
    session: &mut Session,
    orchestrator: &dyn Generator,
    round: usize,
) -> Result<()> {
    let previous = round
        .checked_sub(1)
        .and_then(|prev| session.rounds.get(prev))
        .cloned();
    let current = session.rounds.get(round).cloned();
    let (Some(previous), Some(current)) = (previous, current) else {
        return Err(anyhow!("round {} has no previous round to compare", round + 1));
    };

    let discussion: Vec<Turn> = session
        .store
        .user_log()
        .get(previous.user_log_start..current.user_log_start)
        .map(<[Turn]>::to_vec)
        .unwrap_or_default();
    let request = vec![Turn::system(comparison_prompt(
        &discussion,
        &previous.accepted,
        &current.outputs,
    )?)];
    let generation = generate_text(orchestrator, &GenerateRequest::new(request.clone()))
        .context("request round comparison")?;
    session.timings.record(generation.elapsed);
    let judgment = generation.text;

    if let Some(paths) = session.paths() {
        let record = ComparisonRecord {
            round: round + 1,
            request,
            judgment: judgment.clone(),
        };
        write_comparison(paths, &record)?;
    }
    session.append(
        Role::System,
        format!("{}\n{judgment}", instructions::COMPARISON_NOTE),
    );
    if let Some(record) = session.rounds.get_mut(round) {
        record.comparison = Some(judgment);
    }
    Ok(())
}
