//! Non-binding placement advice.
//!
//! A [`Suggester`] may propose which candidate executor should take a job.
//! Its answer is only a hint: [`validate`] drops any suggestion that does
//! not name a live candidate, and the coordinator falls back to the ranked
//! order whenever no valid suggestion is left.

use serde::{Deserialize, Serialize};

use gridshift_core::ComputeJob;

/// What a suggester gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct AdvisoryRequest<'a> {
    pub job: &'a ComputeJob,
    /// Eligible executor names, best score first.
    pub candidates: &'a [String],
    /// One free-text line per candidate, same order.
    pub summaries: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub selected_candidate: String,
    pub rationale: String,
}

pub trait Suggester: Send + Sync {
    fn suggest(&self, request: &AdvisoryRequest<'_>) -> Option<Suggestion>;
}

/// Never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdvice;

impl Suggester for NoAdvice {
    fn suggest(&self, _request: &AdvisoryRequest<'_>) -> Option<Suggestion> {
        None
    }
}

/// Keep a suggestion only if it names one of `candidates` exactly
/// (surrounding whitespace ignored).
pub fn validate(suggestion: Option<Suggestion>, candidates: &[String]) -> Option<Suggestion> {
    let mut suggestion = suggestion?;
    let name = suggestion.selected_candidate.trim();
    if name.is_empty() || !candidates.iter().any(|c| c == name) {
        return None;
    }
    suggestion.selected_candidate = name.to_string();
    Some(suggestion)
}
