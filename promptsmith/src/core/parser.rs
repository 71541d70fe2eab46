//! Recover structured calls from free-text orchestrator output.
//!
//! [`parse_response`] splits one response into single-line call strings, and
//! [`parse_call`] resolves one call string against the capability table using
//! the grammar `name "(" [quoted ("," quoted)*] ")"`. Arguments are always
//! plain strings; nothing is evaluated.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::capabilities::CapabilityTable;
use crate::errors::{CallSyntaxError, ParseError};

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?\s*```\s*$")
        .expect("code fence regex should compile")
});

/// A call resolved to its declared name and unescaped arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInvocation {
    pub name: String,
    pub args: Vec<String>,
}

/// Split `raw` into call strings, in textual order.
///
/// Fails if no call is found or if any non-whitespace text lies outside the
/// call spans.
pub fn parse_response(raw: &str, names: &[&str]) -> Result<Vec<String>, ParseError> {
    let text = strip_code_fence(raw);
    let starts = find_call_starts(text, names);
    let Some(&first) = starts.first() else {
        return Err(ParseError::NoCalls);
    };

    let mut leftover = vec![&text[..first]];
    let mut calls = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let region_end = starts.get(i + 1).copied().unwrap_or(text.len());
        let region = &text[start..region_end];
        let span_end = region.rfind(')').map_or(region_end, |idx| start + idx + 1);
        calls.push(to_single_line(text[start..span_end].trim()));
        leftover.push(&text[span_end..region_end]);
    }

    let stray: Vec<&str> = leftover
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !stray.is_empty() {
        return Err(ParseError::StrayText(stray.join(" ")));
    }
    Ok(calls)
}

/// Remove a code fence wrapping the whole response, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => raw,
    }
}

/// Byte offsets where a declared call name begins.
///
/// Occurrences inside a double-quoted argument of an earlier call, or glued to
/// a preceding identifier, do not start a span. When names overlap at one
/// offset the longest wins.
fn find_call_starts(text: &str, names: &[&str]) -> Vec<usize> {
    let mut sorted: Vec<&str> = names.iter().copied().filter(|n| !n.is_empty()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let pattern = sorted
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(names_re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let candidates: Vec<usize> = names_re.find_iter(text).map(|m| m.start()).collect();

    let mut starts = Vec::new();
    let mut next = 0usize;
    let mut active = false;
    let mut in_string = false;
    let mut escaped = false;
    for (pos, ch) in text.char_indices() {
        while next < candidates.len() && candidates[next] < pos {
            next += 1;
        }
        if next < candidates.len() && candidates[next] == pos {
            next += 1;
            if !in_string && is_name_boundary(text, pos) {
                starts.push(pos);
                active = true;
            }
        }
        if !active {
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        }
    }
    starts
}

fn is_name_boundary(text: &str, pos: usize) -> bool {
    match text[..pos].chars().next_back() {
        Some(prev) => !(prev.is_alphanumeric() || prev == '_' || prev == '.'),
        None => true,
    }
}

/// Collapse a multi-line call into one line: newlines inside string arguments
/// become `\n` escapes, newlines between tokens become spaces.
fn to_single_line(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in span.chars() {
        match ch {
            '\r' => {}
            '\n' if in_string => out.push_str("\\n"),
            '\n' => out.push(' '),
            _ => {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        in_string = false;
                    }
                } else if ch == '"' {
                    in_string = true;
                }
                out.push(ch);
            }
        }
    }
    out
}

/// Resolve a single-line call string against `table`.
pub fn parse_call(call: &str, table: &CapabilityTable) -> Result<CallInvocation, CallSyntaxError> {
    let call = call.trim();
    let open = call.find('(').ok_or_else(|| {
        let name = call.split_whitespace().next().unwrap_or_default();
        if table.get(name).is_some() {
            CallSyntaxError::MissingArguments
        } else {
            CallSyntaxError::UnknownCall(name.to_string())
        }
    })?;
    let name = call[..open].trim();
    let capability = table
        .get(name)
        .ok_or_else(|| CallSyntaxError::UnknownCall(name.to_string()))?;

    let (args, close) = parse_arguments(call, open + 1)?;
    let rest = call[close + 1..].trim();
    if !rest.is_empty() {
        return Err(CallSyntaxError::TrailingText(rest.to_string()));
    }
    if args.len() != capability.arity() {
        return Err(CallSyntaxError::Arity {
            name: capability.name.clone(),
            expected: capability.arity(),
            got: args.len(),
        });
    }
    Ok(CallInvocation {
        name: capability.name.clone(),
        args,
    })
}

/// Parse the quoted argument list starting right after `(`. Returns the
/// arguments and the byte offset of the closing `)`.
fn parse_arguments(call: &str, from: usize) -> Result<(Vec<String>, usize), CallSyntaxError> {
    let bytes = call.as_bytes();
    let skip_ws = |mut pos: usize| {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        pos
    };

    let mut args = Vec::new();
    let mut pos = skip_ws(from);
    if bytes.get(pos) == Some(&b')') {
        return Ok((args, pos));
    }
    loop {
        if bytes.get(pos) != Some(&b'"') {
            return Err(CallSyntaxError::ExpectedQuotedArgument(pos));
        }
        let (value, after) = parse_quoted(call, pos + 1)?;
        args.push(value);
        pos = skip_ws(after);
        match bytes.get(pos) {
            Some(b',') => pos = skip_ws(pos + 1),
            Some(b')') => return Ok((args, pos)),
            _ => return Err(CallSyntaxError::ExpectedSeparator(pos)),
        }
    }
}

/// Read a string body starting after the opening quote. Returns the unescaped
/// value and the offset just past the closing quote.
fn parse_quoted(call: &str, from: usize) -> Result<(String, usize), CallSyntaxError> {
    let mut value = String::new();
    let mut chars = call[from..].char_indices();
    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, from + offset + 1)),
            '\\' => {
                let (_, escaped) = chars.next().ok_or(CallSyntaxError::UnterminatedString)?;
                value.push(match escaped {
                    '"' => '"',
                    '\\' => '\\',
                    '\'' => '\'',
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => return Err(CallSyntaxError::BadEscape(other)),
                });
            }
            _ => value.push(ch),
        }
    }
    Err(CallSyntaxError::UnterminatedString)
}

/// Render a call string that [`parse_call`] accepts.
pub fn render_call(name: &str, args: &[&str]) -> String {
    let rendered: Vec<String> = args.iter().map(|arg| quote(arg)).collect();
    format!("{name}({})", rendered.join(", "))
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::CapabilityTable;

    fn table() -> CapabilityTable {
        CapabilityTable::from_pairs([
            ("self.foo(x)", "foo"),
            ("self.foo_bar(x, y)", "foo bar"),
            ("self.done()", "done"),
        ])
        .expect("table")
    }

    fn names() -> Vec<&'static str> {
        vec!["self.foo", "self.foo_bar", "self.done"]
    }

    #[test]
    fn returns_calls_in_textual_order() {
        let raw = "self.foo(\"a\")\nself.done()\n  self.foo_bar(\"b\", \"c\")";
        let calls = parse_response(raw, &names()).expect("parse");
        assert_eq!(
            calls,
            vec!["self.foo(\"a\")", "self.done()", "self.foo_bar(\"b\", \"c\")"]
        );
    }

    #[test]
    fn rejects_prose_around_a_call() {
        let err = parse_response("Hello self.foo(\"x\") world", &names()).unwrap_err();
        assert_eq!(err, ParseError::StrayText("Hello world".to_string()));
    }

    #[test]
    fn rejects_response_without_calls() {
        let err = parse_response("Sure, let me think about it.", &names()).unwrap_err();
        assert_eq!(err, ParseError::NoCalls);
        assert_eq!(parse_response("   ", &names()).unwrap_err(), ParseError::NoCalls);
    }

    #[test]
    fn strips_code_fence_wrapper() {
        let raw = "```python\nself.foo(\"x\")\nself.done()\n```";
        let calls = parse_response(raw, &names()).expect("parse");
        assert_eq!(calls, vec!["self.foo(\"x\")", "self.done()"]);
    }

    #[test]
    fn names_inside_arguments_do_not_split_spans() {
        let raw = r#"self.foo("I will call self.done() when \"ready\"") self.done()"#;
        let calls = parse_response(raw, &names()).expect("parse");
        assert_eq!(calls.len(), 2);
        assert_eq!(
            parse_call(&calls[0], &table()).expect("call").args,
            vec!["I will call self.done() when \"ready\""]
        );
    }

    #[test]
    fn longest_name_wins_and_glued_names_are_ignored() {
        let calls = parse_response("self.foo_bar(\"a\", \"b\")", &names()).expect("parse");
        assert_eq!(calls, vec!["self.foo_bar(\"a\", \"b\")"]);
        let err = parse_response("myself.foo(\"x\")", &names()).unwrap_err();
        assert_eq!(err, ParseError::NoCalls);
    }

    #[test]
    fn multiline_arguments_become_escaped_newlines() {
        let raw = "self.foo(\n  \"line one\nline two\"\n)";
        let calls = parse_response(raw, &names()).expect("parse");
        assert_eq!(calls, vec!["self.foo(   \"line one\\nline two\" )"]);
        let call = parse_call(&calls[0], &table()).expect("call");
        assert_eq!(call.args, vec!["line one\nline two"]);
    }

    #[test]
    fn span_ends_at_last_closing_paren_in_region() {
        let err = parse_response("self.done() trailing words", &names()).unwrap_err();
        assert_eq!(err, ParseError::StrayText("trailing words".to_string()));
    }

    #[test]
    fn parse_call_resolves_name_and_arguments() {
        let call = parse_call(r#"self.foo_bar("a \"q\"", "b\\c")"#, &table()).expect("call");
        assert_eq!(call.name, "self.foo_bar");
        assert_eq!(call.args, vec!["a \"q\"", "b\\c"]);
        let done = parse_call("self.done( )", &table()).expect("done");
        assert!(done.args.is_empty());
    }

    #[test]
    fn parse_call_reports_syntax_errors() {
        let t = table();
        assert_eq!(
            parse_call("self.nope(\"x\")", &t).unwrap_err(),
            CallSyntaxError::UnknownCall("self.nope".to_string())
        );
        assert_eq!(
            parse_call("self.done", &t).unwrap_err(),
            CallSyntaxError::MissingArguments
        );
        assert_eq!(
            parse_call("self.foo(x)", &t).unwrap_err(),
            CallSyntaxError::ExpectedQuotedArgument(9)
        );
        assert_eq!(
            parse_call("self.foo(\"x", &t).unwrap_err(),
            CallSyntaxError::UnterminatedString
        );
        assert_eq!(
            parse_call("self.foo(\"x\") extra", &t).unwrap_err(),
            CallSyntaxError::TrailingText("extra".to_string())
        );
        assert!(matches!(
            parse_call("self.foo(\"x\", \"y\")", &t).unwrap_err(),
            CallSyntaxError::Arity {
                expected: 1,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn rendered_calls_parse_back() {
        let rendered = render_call("self.foo_bar", &["say \"hi\"\nthen", "2"]);
        let call = parse_call(&rendered, &table()).expect("call");
        assert_eq!(call.args, vec!["say \"hi\"\nthen", "2"]);
    }
}
