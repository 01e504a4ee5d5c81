//! Keyword vocabularies shared by the decomposer and the router.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Quantity, rate and comparison words typical of word problems
    pub(crate) static ref NARRATIVE_MATH: Regex = Regex::new(
        r"(?i)(how\s+(?:many|much|long)|left|remain|time|speed|distance|rate|each|per|total|altogether|spent|earn|cost|bought|sold|gave|times|twice|thrice|more than|less than)"
    )
    .unwrap();

    pub(crate) static ref DIGIT: Regex = Regex::new(r"\d").unwrap();

    /// "according to our local docs, ..." with the comma that follows it
    pub(crate) static ref DOC_PREFACE_COMMA: Regex = Regex::new(
        r"(?i)(\b(?:according to|per|from)\s+(?:our|the|this)\s+(?:local\s+)?(?:docs?|documents?|knowledge\s*base|kb|notes|pdfs?)\b)\s*,\s*"
    )
    .unwrap();

    /// The same preface anchored at the start of a chunk, optional comma included
    pub(crate) static ref DOC_PREFACE: Regex = Regex::new(
        r"(?i)^(?:according to|per|from)\s+(?:our|the|this)\s+(?:local\s+)?(?:docs?|documents?|knowledge\s*base|kb|notes|pdfs?)\b\s*,?\s*"
    )
    .unwrap();

    pub(crate) static ref SQUARE_ROOT: Regex =
        Regex::new(r"(?i)\bsquare\s*root\s*of\s*(\d+)\b").unwrap();
}

/// Digits plus a word-problem cue: the signature of a narrative math question
pub(crate) fn is_narrative_math(text: &str) -> bool {
    DIGIT.is_match(text) && NARRATIVE_MATH.is_match(text)
}
