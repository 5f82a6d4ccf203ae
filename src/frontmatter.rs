use crate::errors::{StoreError, StoreResult};
use crate::ids;
use crate::models::{Issue, Status, DEFAULT_PRIORITY, MAX_PRIORITY};
use std::fmt::Write as _;

const DELIMITER: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Invalid `blocks` items are dropped with a warning.
    #[default]
    Lenient,
    /// Invalid `blocks` items reject the whole document.
    Strict,
}

pub fn encode(issue: &Issue) -> String {
    let mut out = String::with_capacity(256 + issue.description.len());
    out.push_str(DELIMITER);
    out.push('\n');
    push_field(&mut out, "title", &issue.title);
    push_field(&mut out, "status", issue.status.as_str());
    let _ = writeln!(out, "priority: {}", issue.priority);
    if let Some(assignee) = issue.assignee.as_deref() {
        push_field(&mut out, "assignee", assignee);
    }
    push_field(&mut out, "created-at", &issue.created_at);
    if let Some(closed_at) = issue.closed_at.as_deref() {
        push_field(&mut out, "closed-at", closed_at);
    }
    if let Some(reason) = issue.close_reason.as_deref() {
        push_field(&mut out, "close-reason", reason);
    }
    if !issue.blocks.is_empty() {
        out.push_str("blocks:\n");
        for blocker in &issue.blocks {
            let _ = writeln!(out, "  - {}", quote_if_needed(blocker));
        }
    }
    let _ = writeln!(out, "order: {}", issue.order);
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&issue.description);
    out
}

fn push_field(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{}: {}", key, quote_if_needed(value));
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.trim() != value
        || value
            .chars()
            .any(|ch| matches!(ch, '\n' | '\r' | ':' | '#' | '"' | '\'' | '\\'))
}

pub fn quote_if_needed(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

pub fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Splits a document into its header block and body.
fn split_document(content: &str) -> StoreResult<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or_else(|| StoreError::InvalidFrontmatter("missing opening delimiter".to_string()))?;

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &rest[..offset];
            let after = &rest[offset + line.len()..];
            let body = after
                .strip_prefix("\r\n")
                .or_else(|| after.strip_prefix('\n'))
                .unwrap_or(after);
            return Ok((header, body));
        }
        offset += line.len();
    }
    Err(StoreError::InvalidFrontmatter("missing closing delimiter".to_string()))
}

pub fn decode(id: &str, content: &str, mode: HeaderMode) -> StoreResult<Issue> {
    let (header, body) = split_document(content)?;

    let mut issue = Issue::new(id, "", "");
    issue.description = body.to_string();
    issue.priority = DEFAULT_PRIORITY;
    let mut in_blocks = false;

    for raw in header.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed == "-" || trimmed.starts_with("- ") {
            if in_blocks {
                push_blocker(&mut issue, id, unquote(trimmed[1..].trim()), mode)?;
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(StoreError::InvalidFrontmatter(format!(
                "malformed header line in {}: {}",
                id, line
            )));
        };
        let key = key.trim();
        let value = value.trim();
        in_blocks = false;

        match key {
            "title" => issue.title = unquote(value),
            "status" => issue.status = Status::parse(&unquote(value))?,
            "priority" => issue.priority = parse_priority(id, &unquote(value))?,
            "assignee" => issue.assignee = Some(unquote(value)),
            "created-at" => issue.created_at = unquote(value),
            "closed-at" => issue.closed_at = Some(unquote(value)),
            "close-reason" => issue.close_reason = Some(unquote(value)),
            "order" => issue.order = parse_order(id, &unquote(value))?,
            "blocks" => {
                if value.is_empty() || value == "[]" {
                    in_blocks = true;
                } else {
                    push_blocker(&mut issue, id, unquote(value), mode)?;
                }
            }
            _ => {}
        }
    }

    if issue.title.is_empty() {
        return Err(StoreError::InvalidFrontmatter(format!("{} has an empty title", id)));
    }
    if issue.created_at.is_empty() {
        return Err(StoreError::InvalidFrontmatter(format!("{} has an empty created-at", id)));
    }
    Ok(issue)
}

fn push_blocker(issue: &mut Issue, id: &str, blocker: String, mode: HeaderMode) -> StoreResult<()> {
    match ids::validate(&blocker) {
        Ok(()) => {
            issue.blocks.push(blocker);
            Ok(())
        }
        Err(error) => match mode {
            HeaderMode::Strict => Err(StoreError::InvalidFrontmatter(format!(
                "{} has an invalid blocks entry: {}",
                id, error
            ))),
            HeaderMode::Lenient => {
                tracing::warn!(issue = %id, blocker = %blocker.escape_debug(), "dropping invalid blocks entry");
                Ok(())
            }
        },
    }
}

fn parse_priority(id: &str, value: &str) -> StoreResult<u8> {
    match value.parse::<u8>() {
        Ok(priority) if priority <= MAX_PRIORITY => Ok(priority),
        _ => Err(StoreError::InvalidFrontmatter(format!(
            "{} has an invalid priority: {}",
            id, value
        ))),
    }
}

fn parse_order(id: &str, value: &str) -> StoreResult<f64> {
    match value.parse::<f64>() {
        Ok(order) if order.is_finite() => Ok(order),
        _ => Err(StoreError::InvalidFrontmatter(format!(
            "{} has an invalid order key: {}",
            id, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Issue {
        let mut issue = Issue::new("demo-a1b2", "Fix: the \"parser\"", "2026-03-01T10:00:00.000Z");
        issue.description = "Body line one\n\n# heading kept verbatim\n".to_string();
        issue.status = Status::Closed;
        issue.priority = 0;
        issue.assignee = Some("  padded  ".to_string());
        issue.closed_at = Some("2026-03-02T11:00:00.000Z".to_string());
        issue.close_reason = Some("done\twith tab\\slash\r\nand newline".to_string());
        issue.blocks = vec!["demo-c3d4".to_string(), "demo-e5f6".to_string()];
        issue.order = -2.375;
        issue
    }

    #[test]
    fn encode_then_decode_reproduces_every_field() {
        let issue = sample();
        let decoded = decode(&issue.id, &encode(&issue), HeaderMode::Strict).expect("decode");
        assert_eq!(decoded, issue);

        let mut minimal = Issue::new("demo-0000", "plain", "2026-01-01");
        minimal.order = 0.1 + 0.2;
        let decoded = decode(&minimal.id, &encode(&minimal), HeaderMode::Lenient).expect("decode minimal");
        assert_eq!(decoded, minimal);
    }

    #[test]
    fn encode_uses_documented_field_order_and_omits_empty_fields() {
        let mut issue = Issue::new("demo-a1b2", "Write docs", "2026-01-01");
        issue.description = "body".to_string();
        issue.order = 3.0;
        assert_eq!(
            encode(&issue),
            "---\ntitle: Write docs\nstatus: open\npriority: 2\ncreated-at: 2026-01-01\norder: 3\n---\n\nbody"
        );

        let full = encode(&sample());
        let keys: Vec<&str> = full
            .lines()
            .skip(1)
            .take_while(|line| *line != "---")
            .filter(|line| !line.starts_with("  "))
            .filter_map(|line| line.split(':').next())
            .collect();
        assert_eq!(
            keys,
            vec!["title", "status", "priority", "assignee", "created-at", "closed-at", "close-reason", "blocks", "order"]
        );
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(quote_if_needed("simple words"), "simple words");
        assert_eq!(quote_if_needed(""), "\"\"");
        assert_eq!(quote_if_needed(" lead"), "\" lead\"");
        assert_eq!(quote_if_needed("a: b"), "\"a: b\"");
        assert_eq!(quote_if_needed("it's"), "\"it's\"");
        assert_eq!(quote_if_needed("x#y"), "\"x#y\"");
        assert_eq!(quote_if_needed("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(quote_if_needed("tab\tonly"), "tab\tonly");
    }

    #[test]
    fn unknown_escapes_pass_through() {
        assert_eq!(unquote("\"a\\qb\""), "a\\qb");
        assert_eq!(unquote("\"trailing\\\""), "trailing\\");
        assert_eq!(unquote("no quotes"), "no quotes");
    }

    #[test]
    fn decode_ignores_unknown_keys_and_accepts_done() {
        let doc = "---\ntitle: Legacy\nstatus: done\nissue-type: bug\ncreated-at: \"2026-01-01T00:00:00Z\"\n---\n\n";
        let issue = decode("legacy-1", doc, HeaderMode::Lenient).expect("decode legacy");
        assert_eq!(issue.status, Status::Closed);
        assert_eq!(issue.title, "Legacy");
        assert_eq!(issue.description, "");
        assert_eq!(issue.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        let missing_open = decode("x", "title: a\n---\n", HeaderMode::Lenient).expect_err("no opening");
        assert!(matches!(missing_open, StoreError::InvalidFrontmatter(_)));

        let missing_close = decode("x", "---\ntitle: a\ncreated-at: b\n", HeaderMode::Lenient).expect_err("no closing");
        assert!(matches!(missing_close, StoreError::InvalidFrontmatter(_)));

        let empty_title = decode("x", "---\ntitle: \"\"\ncreated-at: b\n---\n", HeaderMode::Lenient)
            .expect_err("empty title");
        assert!(matches!(empty_title, StoreError::InvalidFrontmatter(_)));

        let no_created = decode("x", "---\ntitle: a\n---\n", HeaderMode::Lenient).expect_err("no created-at");
        assert!(matches!(no_created, StoreError::InvalidFrontmatter(_)));

        let bad_status = decode("x", "---\ntitle: a\nstatus: later\ncreated-at: b\n---\n", HeaderMode::Lenient)
            .expect_err("bad status");
        assert!(matches!(bad_status, StoreError::InvalidStatus(_)));

        let bad_priority = decode("x", "---\ntitle: a\npriority: 9\ncreated-at: b\n---\n", HeaderMode::Lenient)
            .expect_err("bad priority");
        assert!(matches!(bad_priority, StoreError::InvalidFrontmatter(_)));
    }

    #[test]
    fn invalid_blockers_are_dropped_or_rejected_by_mode() {
        let doc = "---\ntitle: a\ncreated-at: b\nblocks:\n  - good-1\n  - \"../escape\"\n  - good-2\n---\n\nbody";
        let lenient = decode("x", doc, HeaderMode::Lenient).expect("lenient decode");
        assert_eq!(lenient.blocks, vec!["good-1".to_string(), "good-2".to_string()]);
        assert_eq!(lenient.description, "body");

        let strict = decode("x", doc, HeaderMode::Strict).expect_err("strict decode");
        assert!(matches!(strict, StoreError::InvalidFrontmatter(_)));
    }

    #[test]
    fn crlf_documents_decode() {
        let doc = "---\r\ntitle: Windows\r\ncreated-at: b\r\nblocks:\r\n  - dep-1\r\n---\r\n\r\nbody\r\n";
        let issue = decode("x", doc, HeaderMode::Strict).expect("crlf decode");
        assert_eq!(issue.title, "Windows");
        assert_eq!(issue.blocks, vec!["dep-1".to_string()]);
        assert_eq!(issue.description, "body\r\n");
    }
}
