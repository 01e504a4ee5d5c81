//! Splits one raw user query into ordered atomic sub-queries.
//!
//! Each `?`-terminated segment runs through a fixed pipeline of stages:
//! a leading arithmetic expression is peeled off first, a word problem is
//! then captured whole, and anything left is split into clauses. A segment
//! that was a question gives its `?` back to the last clause it produced.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::cues::{is_narrative_math, DOC_PREFACE_COMMA};

lazy_static! {
    static ref CONNECTIVE_PUNCT: Regex = Regex::new(r"(?i)\b(also|then|and)\b\s*[,;]\s*").unwrap();
    static ref LEADING_VERB: Regex =
        Regex::new(r"(?i)^\s*(?:compute|calculate|evaluate|what\s+is|what's)?\s*").unwrap();
    static ref LEADING_EXPRESSION: Regex =
        Regex::new(r"^([0-9\.\s\+\-\*/\^\(\)!]+)\s*(?:,|\s+(?:and|&)\s+|;\s+|$)").unwrap();
    static ref OPERATOR: Regex = Regex::new(r"[\+\-\*/\^!]").unwrap();
    static ref AND_SEPARATOR: Regex = Regex::new(r"^\s+(?:and|&)\s+").unwrap();
    static ref SEMICOLON_SEPARATOR: Regex = Regex::new(r"^;\s+").unwrap();
    static ref COMMA_SEPARATOR: Regex = Regex::new(r"^,\s+").unwrap();
    static ref FILLER: Regex = Regex::new(r"(?i)^(?:also|and|then)$").unwrap();
    static ref LEADING_CONNECTIVE: Regex = Regex::new(r"(?i)^(?:also|and|then)\b[:,]?\s*").unwrap();
}

enum Flow {
    Next,
    Done,
}

/// Working state for one `?`-delimited segment
struct Segment {
    text: String,
    question: bool,
    last_clause: Option<usize>,
}

impl Segment {
    fn emit_clause(&mut self, parts: &mut Vec<String>, clause: String) {
        parts.push(clause);
        self.last_clause = Some(parts.len() - 1);
    }
}

type Stage = fn(&mut Segment, &mut Vec<String>) -> Flow;

const STAGES: &[(&str, Stage)] = &[
    ("leading_expression", leading_expression),
    ("narrative_math", narrative_math),
    ("clauses", clauses),
];

/// Decompose a query into atomic sub-queries, in order.
pub fn decompose(query: &str) -> Vec<String> {
    let normalized = CONNECTIVE_PUNCT.replace_all(query.trim(), "${1} ");
    let pieces: Vec<&str> = normalized.split('?').collect();
    let mut parts = Vec::new();

    for (i, piece) in pieces.iter().enumerate() {
        let text = piece.trim();
        if text.is_empty() {
            continue;
        }
        let mut segment = Segment {
            text: text.to_string(),
            question: i + 1 < pieces.len(),
            last_clause: None,
        };

        for (name, stage) in STAGES {
            let before = parts.len();
            let flow = stage(&mut segment, &mut parts);
            if parts.len() > before {
                debug!(stage = *name, pieces = ?&parts[before..], "decomposed segment");
            }
            if let Flow::Done = flow {
                break;
            }
        }

        if segment.question {
            if let Some(idx) = segment.last_clause {
                parts[idx].push('?');
            }
        }
    }

    parts
}

/// Peel off a leading arithmetic expression such as "Compute 10!/(2^3), ..."
fn leading_expression(segment: &mut Segment, parts: &mut Vec<String>) -> Flow {
    let stripped = LEADING_VERB.replace(&segment.text, "").into_owned();
    let Some(caps) = LEADING_EXPRESSION.captures(&stripped) else {
        return Flow::Next;
    };
    let expression = caps[1].trim();
    if !OPERATOR.is_match(expression) {
        return Flow::Next;
    }

    parts.push(expression.to_string());
    let end = caps.get(0).map_or(stripped.len(), |m| m.end());
    let remainder = stripped[end..].trim_start_matches([' ', ',', ';']);
    if remainder.is_empty() {
        return Flow::Done;
    }
    segment.text = remainder.to_string();
    Flow::Next
}

/// Word problems stay whole: their clauses depend on each other
fn narrative_math(segment: &mut Segment, parts: &mut Vec<String>) -> Flow {
    if is_narrative_math(&segment.text) {
        let text = segment.text.clone();
        segment.emit_clause(parts, text);
        return Flow::Done;
    }
    Flow::Next
}

fn clauses(segment: &mut Segment, parts: &mut Vec<String>) -> Flow {
    let protected = DOC_PREFACE_COMMA.replace_all(&segment.text, "${1} ").into_owned();
    for clause in split_clauses(&protected) {
        let clause = clause.trim();
        if clause.is_empty() || FILLER.is_match(clause) {
            continue;
        }
        let clause = LEADING_CONNECTIVE.replace(clause, "");
        if !clause.is_empty() {
            segment.emit_clause(parts, clause.into_owned());
        }
    }
    Flow::Done
}

/// Split on " and ", " & ", "; " and on ", " when the comma is not preceded
/// by a digit and is followed by a letter (so "1,000" and "3, 4" survive).
fn split_clauses(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let separator_len = AND_SEPARATOR
            .find(rest)
            .or_else(|| SEMICOLON_SEPARATOR.find(rest))
            .map(|m| m.end())
            .or_else(|| {
                let m = COMMA_SEPARATOR.find(rest)?;
                let after_digit = text[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_digit());
                let before_letter = rest[m.end()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic());
                (!after_digit && before_letter).then_some(m.end())
            });

        match separator_len {
            Some(len) if len > 0 => {
                pieces.push(&text[start..pos]);
                pos += len;
                start = pos;
            }
            _ => {
                pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    pieces.push(&text[start..]);
    pieces
}
