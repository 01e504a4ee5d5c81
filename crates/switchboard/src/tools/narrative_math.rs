//! Word-problem solver.
//!
//! Two closed-form patterns (bus seats, uniform speed) are answered directly.
//! Everything else goes to the model with an `ANSWER: <number>` protocol,
//! one strict retry, and finally a scrape of the last number in the reply.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use super::calculator::format_number;
use super::{Tool, ToolError};
use crate::message::Message;
use crate::plan::ToolName;
use crate::prompt_template::render_prompt;
use crate::providers::base::Provider;

const SYSTEM: &str = include_str!("../prompts/narrative_math_system.md");
const PROMPT: &str = include_str!("../prompts/narrative_math.md");
const RETRY_SYSTEM: &str =
    "You must output EXACTLY one line in the form 'ANSWER: <number>' with no other text.";
const RETRY_PROMPT: &str = include_str!("../prompts/narrative_math_retry.md");

lazy_static! {
    static ref TIMES_MORE: Regex = Regex::new(r"(?i)\b(\d+)\s+times\s+more\s+than\b").unwrap();
    static ref TWICE_MORE: Regex = Regex::new(r"(?i)\btwice\s+more\s+than\b").unwrap();
    static ref THRICE_MORE: Regex = Regex::new(r"(?i)\bthrice\s+more\s+than\b").unwrap();

    static ref SEATS: Regex = Regex::new(r"\b(\d+)\s+seats?\b").unwrap();
    static ref OCCUPIED: Regex =
        Regex::new(r"\b(\d+)\s+(?:are\s+)?occupied(?:\s+at\s+the\s+start)?\b").unwrap();
    static ref GET_ON: Regex = Regex::new(r"\b(\d+)\s+(?:people\s+)?get\s+on\b").unwrap();
    static ref GET_OFF: Regex = Regex::new(r"\b(\d+)\s+(?:people\s+)?get\s+off\b").unwrap();

    static ref TRAVELS: Regex = Regex::new(
        r"travels?\s+(\d+(?:\.\d+)?)\s*(km|kilometer|kilometers|mile|miles)\s+in\s+(\d+(?:\.\d+)?)\s*(hour|hours|hr|h|minute|minutes|min|m)\b"
    )
    .unwrap();
    static ref TARGET_DISTANCE: Regex = Regex::new(
        r"how\s+long.*?\b(\d+(?:\.\d+)?)\s*(km|kilometer|kilometers|mile|miles)\b"
    )
    .unwrap();

    static ref NUMBER: Regex = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
    static ref WHOLE_NUMBER: Regex = Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap();
}

/// Rewrite "N times more than" as "N times as many as" so it reads as N * X
pub fn normalize_phrasing(question: &str) -> String {
    let s = TIMES_MORE.replace_all(question, "${1} times as many as");
    let s = TWICE_MORE.replace_all(&s, "2 times as many as");
    THRICE_MORE
        .replace_all(&s, "3 times as many as")
        .into_owned()
}

fn grab<T: std::str::FromStr>(pattern: &Regex, text: &str) -> Option<T> {
    pattern.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Empty seats after people get on and off: S - (O + A - B), kept within 0..=S.
/// Counts too large for `i64` arithmetic leave the question to the model.
pub fn solve_bus_seats(question: &str) -> Option<String> {
    let text = question.to_lowercase();
    let seats: i64 = grab(&SEATS, &text)?;
    let occupied: i64 = grab(&OCCUPIED, &text)?;
    let got_on: i64 = grab(&GET_ON, &text)?;
    let got_off: i64 = grab(&GET_OFF, &text)?;

    let aboard = occupied.checked_add(got_on)?.checked_sub(got_off)?;
    let empty = seats.checked_sub(aboard)?;
    Some(empty.clamp(0, seats.max(0)).to_string())
}

/// Time to cover a distance at the speed implied by "travels U km in V hours".
/// Units are taken as consistent; minutes are converted to hours.
pub fn solve_uniform_rate(question: &str) -> Option<String> {
    let text = question.to_lowercase();
    let base = TRAVELS.captures(&text)?;
    let distance: f64 = grab(&TARGET_DISTANCE, &text)?;

    let covered: f64 = base.get(1)?.as_str().parse().ok()?;
    let mut elapsed: f64 = base.get(3)?.as_str().parse().ok()?;
    if base.get(4)?.as_str().starts_with('m') {
        elapsed /= 60.0;
    }
    if covered == 0.0 || elapsed == 0.0 {
        return None;
    }
    let hours = distance / (covered / elapsed);
    hours.is_finite().then(|| format_number(hours))
}

/// The text after `ANSWER:` on the first line that carries it
pub fn extract_answer_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.to_uppercase().starts_with("ANSWER:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, answer)| answer.trim().to_string())
}

pub fn last_number(text: &str) -> Option<String> {
    NUMBER
        .find_iter(text)
        .last()
        .map(|m| m.as_str().to_string())
}

fn is_number(answer: &str) -> bool {
    WHOLE_NUMBER.is_match(answer)
}

pub struct NarrativeMathTool {
    provider: Arc<dyn Provider>,
}

impl NarrativeMathTool {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    async fn ask(&self, system: &str, template: &str, question: &str) -> Result<String, ToolError> {
        let prompt = render_prompt(template, json!({ "question": question }))?;
        let response = self
            .provider
            .complete(system, &[Message::user().with_text(prompt)])
            .await?;
        Ok(response.message.as_text().to_string())
    }
}

#[async_trait]
impl Tool for NarrativeMathTool {
    fn name(&self) -> ToolName {
        ToolName::NarrativeMath
    }

    async fn call(&self, input: &str, _context: &str) -> Result<String, ToolError> {
        if let Some(answer) = solve_bus_seats(input) {
            debug!(answer = %answer, "bus seats rule applied");
            return Ok(answer);
        }
        if let Some(answer) = solve_uniform_rate(input) {
            debug!(answer = %answer, "uniform rate rule applied");
            return Ok(answer);
        }

        let question = normalize_phrasing(input);
        let reply = self.ask(SYSTEM, PROMPT, &question).await?;
        let answer = extract_answer_line(&reply).map(|a| a.replace(',', ""));
        if let Some(answer) = answer.as_deref().filter(|a| is_number(a)) {
            return Ok(answer.to_string());
        }

        match self.ask(RETRY_SYSTEM, RETRY_PROMPT, &question).await {
            Ok(retry) => {
                if let Some(forced) = extract_answer_line(&retry)
                    .map(|a| a.replace(',', ""))
                    .filter(|a| is_number(a))
                {
                    return Ok(forced);
                }
            }
            Err(e) => warn!(error = %e, "strict retry failed"),
        }

        answer
            .filter(|a| !a.is_empty())
            .or_else(|| last_number(&reply))
            .ok_or(ToolError::NoNumericAnswer)
    }
}
