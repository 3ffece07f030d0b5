//! Deterministic scoring from lexical, structural and latency signals.
//!
//! - relevance: `0.7 * overlap + 0.3 * latency_signal`
//! - clarity: `0.4 * readability + 0.6 * structure coverage`
//! - hallucination risk: `0.1 + 0.15` per hedging phrase, capped at `0.9`
//!
//! No randomness and no clocks: identical inputs give identical scores.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::types::{Candidate, EvaluationScore, ScoreWeights};

const OVERLAP_WEIGHT: f64 = 0.7;
const LATENCY_WEIGHT: f64 = 0.3;
const NEUTRAL_OVERLAP: f64 = 0.5;
const COVERAGE_SCALE: f64 = 1.5;
/// Latency (ms) at which the latency signal drops to one half.
const LATENCY_HALF_LIFE_MS: f64 = 1_000.0;

const READABILITY_WEIGHT: f64 = 0.4;
const STRUCTURE_WEIGHT: f64 = 0.6;
const WORDS_PER_EXPECTED_FEATURE: usize = 60;
const MAX_EXPECTED_FEATURES: usize = 3;
const MAX_COMFORTABLE_SENTENCE_WORDS: f64 = 30.0;

const BASE_RISK: f64 = 0.1;
const RISK_PER_HEDGE: f64 = 0.15;
const MAX_RISK: f64 = 0.9;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "to", "of",
    "in", "for", "on", "with", "at", "by", "from", "as", "it", "that", "this", "these", "those",
    "and", "or", "but", "not", "what", "which", "who", "how", "why", "when", "where", "you",
    "your",
];

const HEDGES: &[&str] = &[
    "i think",
    "i believe",
    "i'm not sure",
    "i am not sure",
    "not certain",
    "probably",
    "possibly",
    "perhaps",
    "might be",
    "may be",
    "it seems",
    "as far as i know",
    "i guess",
    "could be",
    "unclear",
];

static LIST_ITEM: OnceLock<Option<Regex>> = OnceLock::new();
static HEADING: OnceLock<Option<Regex>> = OnceLock::new();
static PARAGRAPH_BREAK: OnceLock<Option<Regex>> = OnceLock::new();

/// Component scores of one response, before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    pub relevance: f64,
    pub clarity: f64,
    pub hallucination_risk: f64,
}

impl Components {
    pub fn of(prompt: &str, text: &str, latency_ms: u64) -> Self {
        Self {
            relevance: relevance(prompt, text, latency_ms),
            clarity: clarity(text),
            hallucination_risk: hallucination_risk(text),
        }
    }
}

pub(crate) fn score(prompt: &str, candidate: &Candidate<'_>, weights: &ScoreWeights) -> EvaluationScore {
    let components = Components::of(prompt, candidate.text, candidate.latency_ms);
    EvaluationScore::from_components(
        candidate.model_id,
        components.relevance,
        components.clarity,
        components.hallucination_risk,
        weights,
        Some(reasoning(&components)),
    )
}

pub fn relevance(prompt: &str, text: &str, latency_ms: u64) -> f64 {
    OVERLAP_WEIGHT * lexical_overlap(prompt, text) + LATENCY_WEIGHT * latency_signal(latency_ms)
}

/// Share of the prompt's meaningful words found in the response, scaled so
/// that two thirds coverage already counts as full.
pub fn lexical_overlap(prompt: &str, text: &str) -> f64 {
    let prompt_words = meaningful_words(prompt);
    if prompt_words.is_empty() {
        return NEUTRAL_OVERLAP;
    }
    let text_words = meaningful_words(text);
    let shared = prompt_words.intersection(&text_words).count();
    (shared as f64 / prompt_words.len() as f64 * COVERAGE_SCALE).min(1.0)
}

/// `1` at zero latency, strictly decreasing towards `0`.
pub fn latency_signal(latency_ms: u64) -> f64 {
    1.0 / (1.0 + latency_ms as f64 / LATENCY_HALF_LIFE_MS)
}

pub fn clarity(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    READABILITY_WEIGHT * readability(text, words) + STRUCTURE_WEIGHT * structure_coverage(text, words)
}

fn readability(text: &str, words: usize) -> f64 {
    let sentences = text
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count()
        .max(1);
    let average = words as f64 / sentences as f64;
    if average <= MAX_COMFORTABLE_SENTENCE_WORDS {
        1.0
    } else {
        (1.0 - (average - MAX_COMFORTABLE_SENTENCE_WORDS) / MAX_COMFORTABLE_SENTENCE_WORDS).max(0.0)
    }
}

/// Longer answers are expected to show more structure: one feature per
/// sixty words, up to three.
fn structure_coverage(text: &str, words: usize) -> f64 {
    let expected = (words / WORDS_PER_EXPECTED_FEATURE).min(MAX_EXPECTED_FEATURES);
    if expected == 0 {
        return 1.0;
    }
    (structure_features(text) as f64 / expected as f64).min(1.0)
}

/// Counts distinct structure features: lists, code fences, headings and
/// paragraph breaks.
pub fn structure_features(text: &str) -> usize {
    let checks = [
        matches(&LIST_ITEM, r"(?m)^\s*(?:[-*•]|\d+[.)])\s+\S", text),
        text.matches("```").count() >= 2,
        matches(&HEADING, r"(?m)^#{1,6}\s+\S", text),
        matches(&PARAGRAPH_BREAK, r"\n[ \t]*\n", text),
    ];
    checks.iter().filter(|present| **present).count()
}

pub fn hallucination_risk(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 1.0;
    }
    let lowered = text.to_lowercase();
    let hedges: usize = HEDGES.iter().map(|h| lowered.matches(h).count()).sum();
    (BASE_RISK + RISK_PER_HEDGE * hedges as f64).min(MAX_RISK)
}

pub fn reasoning(components: &Components) -> String {
    let relevance = if components.relevance >= 0.8 {
        "High relevance to prompt"
    } else if components.relevance >= 0.5 {
        "Moderate relevance"
    } else {
        "Low relevance to prompt"
    };
    let clarity = if components.clarity >= 0.8 {
        "well-structured response"
    } else if components.clarity >= 0.5 {
        "acceptable structure"
    } else {
        "poor structure"
    };
    let risk = if components.hallucination_risk <= 0.2 {
        "low hallucination risk"
    } else if components.hallucination_risk <= 0.4 {
        "moderate hallucination risk"
    } else {
        "elevated hallucination risk"
    };
    format!("{relevance}; {clarity}; {risk}.")
}

fn meaningful_words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            log::error!("invalid structure pattern pattern={pattern} error={err}");
            None
        }
    })
    .as_ref()
    .is_some_and(|regex| regex.is_match(text))
}
