//! Orchestrator requests with bounded self-correction of unparseable responses.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::parser::parse_response;
use crate::core::types::Role;
use crate::errors::ProtocolError;
use crate::instructions;
use crate::io::backend::{GenerateRequest, Generator, generate_text};
use crate::session::Session;

/// Attempts per orchestrator response, the first one included.
pub const MAX_PARSE_ATTEMPTS: u32 = 2;

/// Ask the orchestrator to continue the current branch view and split the
/// answer into call strings.
///
/// A response that does not parse is kept in the log together with a
/// corrective instruction and the orchestrator is asked again. After
/// [`MAX_PARSE_ATTEMPTS`] the turn fails with [`ProtocolError::Parse`].
#[instrument(skip_all, fields(backend = orchestrator.name(), example = ?session.context.example, round = ?session.context.round))]
pub fn request_calls(session: &mut Session, orchestrator: &dyn Generator) -> Result<Vec<String>> {
    let names: Vec<String> = session
        .capabilities
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut attempt = 1;
    loop {
        let view = session.store.view(&session.context);
        session.store.consume();
        let generation = generate_text(orchestrator, &GenerateRequest::new(view))?;
        session.timings.record(generation.elapsed);
        let response = generation.text;

        match parse_response(&response, &names) {
            Ok(calls) => {
                debug!(attempt, calls = calls.len(), "parsed orchestrator response");
                return Ok(calls);
            }
            Err(err) => {
                warn!(attempt, err = %err, "orchestrator response rejected");
                session.append(Role::Assistant, response);
                if attempt >= MAX_PARSE_ATTEMPTS {
                    session.store.consume();
                    return Err(ProtocolError::Parse {
                        attempts: attempt,
                        source: err,
                    }
                    .into());
                }
                session.append(Role::System, instructions::PARSE_ERROR);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::CapabilityTable;
    use crate::errors::ParseError;
    use crate::io::config::SessionConfig;
    use crate::test_support::ScriptedGenerator;

    fn session() -> Session {
        let mut session = Session::new(SessionConfig::default(), CapabilityTable::standard());
        session.append(Role::User, "hello");
        session
    }

    #[test]
    fn returns_calls_in_order() {
        let mut session = session();
        let orchestrator = ScriptedGenerator::new(
            "orchestrator",
            ["self.submit_message_to_user(\"hi\")\nself.done()"],
        );
        let calls = request_calls(&mut session, &orchestrator).expect("calls");
        assert_eq!(
            calls,
            vec!["self.submit_message_to_user(\"hi\")", "self.done()"]
        );
        assert!(!session.store().has_unconsumed());
        assert_eq!(session.store().model_log().len(), 1);
    }

    #[test]
    fn corrects_once_then_succeeds() {
        let mut session = session();
        let orchestrator =
            ScriptedGenerator::new("orchestrator", ["Sure thing!", "self.done()"]);
        let calls = request_calls(&mut session, &orchestrator).expect("calls");
        assert_eq!(calls, vec!["self.done()"]);

        let log = session.store().model_log();
        assert_eq!(log[1].content, "Sure thing!");
        assert_eq!(log[1].role, Role::Assistant);
        assert_eq!(log[2].content, instructions::PARSE_ERROR);

        let requests = orchestrator.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].turns.last().map(|t| t.content.as_str()),
            Some(instructions::PARSE_ERROR)
        );
    }

    #[test]
    fn stray_prose_fails_after_exactly_two_attempts() {
        let mut session = session();
        let orchestrator =
            ScriptedGenerator::new("orchestrator", ["Hello self.done() world"]);
        let err = request_calls(&mut session, &orchestrator).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProtocolError>(),
            Some(&ProtocolError::Parse {
                attempts: 2,
                source: ParseError::StrayText("Hello world".to_string()),
            })
        );
        assert_eq!(orchestrator.calls(), 2);
        assert!(!session.store().has_unconsumed());
    }
}
