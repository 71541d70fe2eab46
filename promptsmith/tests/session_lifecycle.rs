//! Session-level tests driving the turn loop through whole conversations.
//!
//! Orchestrator and worker are scripted; every scenario runs against a
//! scratch output directory and checks both the in-memory state and the
//! files an external viewer would read.

use std::fs;
use std::time::Duration;

use promptsmith::core::chat_format::ChatFormat;
use promptsmith::core::types::Turn;
use promptsmith::errors::{ParseError, ProtocolError};
use promptsmith::instructions;
use promptsmith::session::Backends;
use promptsmith::test_support::{KeyedGenerator, ScriptedGenerator, scratch_session};
use promptsmith::turn_loop::{TurnStop, run_turn_quiet};

fn has(view: &[Turn], text: &str) -> bool {
    view.iter().any(|t| t.content == text)
}

fn examples() -> Vec<String> {
    vec![
        "The meeting moved to Friday.".to_string(),
        "Rain is expected all week.".to_string(),
        "The store closes at noon.".to_string(),
    ]
}

/// Two rounds: discuss, accept every output, propose a revision, finish.
///
/// Sequence:
/// 1. Orchestrator greets the user.
/// 2. User asks for terse outputs; orchestrator submits prompt v1.
/// 3. Orchestrator switches to example 1 and shows it.
/// 4. User accepts; acceptance auto-advances through examples 2 and 3.
/// 5. End of discussion; orchestrator submits v2, then `done()`.
#[test]
fn full_conversation_exports_prompts() {
    let (temp, mut session) = scratch_session();
    session.start(examples()).expect("start");

    let orchestrator = ScriptedGenerator::new(
        "orchestrator",
        [
            // 1
            "self.submit_message_to_user(\"What should the outputs look like?\")",
            // 2
            "self.submit_message_to_user(\"Proposed prompt: **Rewrite tersely.**\")\n\
             self.submit_prompt(\"Rewrite tersely.\")",
            // 3
            "self.switch_to_example(\"1\")\n\
             self.submit_message_to_user(\"Example 1: Meeting Friday.\")",
            // 4
            "self.output_accepted(\"1\", \"Meeting: Friday.\")",
            "self.output_accepted(\"2\", \"Rain all week.\")",
            "self.output_accepted(\"3\", \"Closes at noon.\")",
            // 5
            "self.submit_prompt(\"Rewrite tersely, use a colon.\")",
            "Outputs now match.",
            "self.done()",
        ],
    );
    let worker = ScriptedGenerator::new("worker", ["terse"]).with_format(ChatFormat::Plain);
    let backends = Backends {
        orchestrator: &orchestrator,
        worker: &worker,
    };

    run_turn_quiet(&mut session, backends).expect("opening");
    assert_eq!(
        session.take_agent_messages(),
        vec!["What should the outputs look like?"]
    );

    session.add_user_message("Very short, please.");
    let outcome = run_turn_quiet(&mut session, backends).expect("round 1");
    assert_eq!(outcome.stop, TurnStop::Idle);
    assert_eq!(
        session.take_agent_messages(),
        vec![
            "Proposed prompt: **Rewrite tersely.**",
            "Example 1: Meeting Friday."
        ]
    );
    assert_eq!(session.context().example, Some(0));
    assert_eq!(session.rounds().len(), 1);

    // The acceptances queue switch calls; each switch appends a focus turn
    // that triggers the next orchestrator response.
    session.add_user_message("Use a colon, then accept all of them.");
    let outcome = run_turn_quiet(&mut session, backends).expect("acceptances");
    assert_eq!(outcome.stop, TurnStop::Finished);
    assert!(session.finished());
    assert_eq!(session.rounds().len(), 2);
    assert_eq!(
        session.rounds()[0].accepted,
        vec![
            Some("Meeting: Friday.".to_string()),
            Some("Rain all week.".to_string()),
            Some("Closes at noon.".to_string()),
        ]
    );
    assert_eq!(
        session.rounds()[1].comparison.as_deref(),
        Some("Outputs now match.")
    );
    assert_eq!(orchestrator.calls(), 9);

    let paths = session.paths().expect("paths").clone();
    assert!(paths.dir.starts_with(temp.path()));
    assert!(paths.model_chat_path.is_file());
    assert!(paths.user_chat_path.is_file());
    for number in 1..=3 {
        assert!(paths.example_path(number).is_file());
    }
    assert!(paths.round_path(2).is_file());
    assert!(paths.comparison_path(2).is_file());

    let prompts: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.prompts_path).expect("read"))
            .expect("parse");
    assert_eq!(prompts.as_array().map(Vec::len), Some(2));
    assert_eq!(prompts[1]["instruction"], "Rewrite tersely, use a colon.");
    let few_shot = prompts[1]["few_shot"].as_str().expect("few_shot");
    assert!(few_shot.contains("Text: Rain is expected all week.\nOutput: Rain all week."));

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.config_path).expect("read"))
            .expect("parse");
    assert_eq!(meta["finished"], true);
    assert_eq!(meta["round_count"], 2);
    assert_eq!(meta["worker_format"], "plain");
    // 9 orchestrator generations plus 3 worker generations per round.
    assert_eq!(meta["generation"]["count"], 15);
    assert_eq!(session.timings().summary().map(|s| s.count), Some(15));
}

#[test]
fn discussion_of_one_example_stays_in_its_branch() {
    let (_temp, mut session) = scratch_session();
    session.start(examples()).expect("start");
    let orchestrator = ScriptedGenerator::new(
        "orchestrator",
        [
            "self.submit_prompt(\"Summarize.\")",
            "self.switch_to_example(\"2\")\nself.submit_message_to_user(\"About example 2?\")",
        ],
    );
    let worker = ScriptedGenerator::new("worker", ["summary"]);
    let backends = Backends {
        orchestrator: &orchestrator,
        worker: &worker,
    };
    run_turn_quiet(&mut session, backends).expect("run");
    session.add_user_message("Too long.");

    let store = session.store();
    let mut other = session.context();
    other.example = Some(0);
    let in_branch = store.view(&session.context());
    let elsewhere = store.view(&other);
    assert!(has(&in_branch, "Too long."));
    assert!(!has(&elsewhere, "Too long."));
    assert!(has(&elsewhere, "self.submit_prompt(\"Summarize.\")"));
}

#[test]
fn fanout_results_are_logged_in_example_order() {
    let (_temp, mut session) = scratch_session();
    session
        .start(vec!["e0".to_string(), "e1".to_string(), "e2".to_string()])
        .expect("start");
    let orchestrator = ScriptedGenerator::new(
        "orchestrator",
        ["self.submit_prompt(\"Echo.\")", "No more calls from me."],
    );
    let worker = KeyedGenerator::new("worker")
        .rule("Text: e0", "first", Duration::from_millis(100))
        .rule("Text: e1", "second", Duration::from_millis(250))
        .rule("Text: e2", "third", Duration::ZERO);
    let backends = Backends {
        orchestrator: &orchestrator,
        worker: &worker,
    };
    // The second response is prose, which ends the run after the round.
    assert!(run_turn_quiet(&mut session, backends).is_err());

    assert_eq!(worker.completed(), vec!["third", "first", "second"]);
    let log = session.store().model_log();
    let intro = log
        .iter()
        .position(|t| t.content == instructions::RESULT_INTRO)
        .expect("result intro");
    let contents: Vec<&str> = log[intro + 1..intro + 4]
        .iter()
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["Example 1: first", "Example 2: second", "Example 3: third"]
    );
    assert!(log[intro + 1..intro + 4].iter().all(|t| t.tags.round == Some(0)));
}

#[test]
fn stray_prose_is_rejected_after_two_attempts() {
    let (_temp, mut session) = scratch_session();
    session.start(examples()).expect("start");
    let orchestrator =
        ScriptedGenerator::new("orchestrator", ["Hello self.done() world"]);
    let worker = ScriptedGenerator::new("worker", Vec::<String>::new());
    let backends = Backends {
        orchestrator: &orchestrator,
        worker: &worker,
    };
    let err = run_turn_quiet(&mut session, backends).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProtocolError>(),
        Some(&ProtocolError::Parse {
            attempts: 2,
            source: ParseError::StrayText("Hello world".to_string()),
        })
    );
    assert_eq!(orchestrator.calls(), 2);
    assert!(!session.finished());

    let again = run_turn_quiet(&mut session, backends).expect("idle");
    assert_eq!(again.responses, 0);
    assert_eq!(orchestrator.calls(), 2);
}
