//! Trigger matcher: rank skill documents by how many query terms hit their trigger topics.
//!
//! Matching is term-exact after lowercasing, or term-exact after a light English suffix strip
//! (`MatchMode::Stemmed`). No fuzzy or semantic matching is attempted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::primitives::SkillDocument;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "me", "my", "of", "on", "or", "should", "so", "that", "the", "this",
    "to", "we", "what", "when", "where", "which", "why", "with", "you", "your",
];

/// How query terms are compared with trigger-topic terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Lowercased terms must be identical.
    Exact,
    /// Terms are compared after stripping common suffixes (`testing` ~ `test`).
    #[default]
    Stemmed,
}

/// How many matches to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLimit {
    /// The `k` best matches (fewer if fewer skills overlap at all).
    TopK(usize),
    /// Every skill with nonzero overlap, capped at `cap`.
    AllNonzero { cap: usize },
}

impl Default for MatchLimit {
    fn default() -> Self {
        MatchLimit::AllNonzero { cap: 3 }
    }
}

impl MatchLimit {
    fn max(&self) -> usize {
        match self {
            MatchLimit::TopK(k) => *k,
            MatchLimit::AllNonzero { cap } => *cap,
        }
    }
}

/// One ranked skill match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMatch {
    pub name: String,
    pub overlap: usize,
    /// Query terms (normalised) that hit a trigger topic.
    pub matched_terms: Vec<String>,
}

/// Split free text into lowercase terms, dropping stop words.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .filter(|s| !STOP_WORDS.contains(&s.as_str()))
        .collect()
}

/// Light suffix stripper: plural first, then `-ing`/`-ed`, so `strings` and `string` agree.
/// Keeps at least three characters of stem.
fn stem(term: &str) -> String {
    let long_enough = |base: &str| base.chars().count() >= 3;
    let sibilant_plural = term.strip_suffix("es").filter(|&base| {
        long_enough(base) && ["s", "x", "z", "ch", "sh"].iter().any(|e| base.ends_with(e))
    });
    let plain_plural = term
        .strip_suffix('s')
        .filter(|&base| long_enough(base) && !base.ends_with('s'));
    let singular = sibilant_plural.or(plain_plural).unwrap_or(term);

    for suffix in ["ing", "ed"] {
        if let Some(base) = singular.strip_suffix(suffix) {
            if long_enough(base) {
                return base.to_string();
            }
        }
    }
    singular.to_string()
}

fn normalize(term: &str, mode: MatchMode) -> String {
    match mode {
        MatchMode::Exact => term.to_string(),
        MatchMode::Stemmed => stem(term),
    }
}

/// Terms a skill answers to: every word of every trigger topic.
fn topic_terms(skill: &SkillDocument, mode: MatchMode) -> BTreeSet<String> {
    skill
        .trigger_topics
        .iter()
        .flat_map(|topic| tokenize(topic))
        .map(|t| normalize(&t, mode))
        .collect()
}

/// Rank `skills` against `query`: descending overlap, ties broken by name.
pub fn match_skills<'a, I>(query: &str, skills: I, mode: MatchMode, limit: MatchLimit) -> Vec<SkillMatch>
where
    I: IntoIterator<Item = &'a SkillDocument>,
{
    let query_terms: BTreeSet<String> = tokenize(query)
        .iter()
        .map(|t| normalize(t, mode))
        .collect();
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<SkillMatch> = skills
        .into_iter()
        .filter_map(|skill| {
            let terms = topic_terms(skill, mode);
            let matched: Vec<String> = query_terms.intersection(&terms).cloned().collect();
            if matched.is_empty() {
                None
            } else {
                Some(SkillMatch {
                    name: skill.name.clone(),
                    overlap: matched.len(),
                    matched_terms: matched,
                })
            }
        })
        .collect();

    matches.sort_by(|a, b| b.overlap.cmp(&a.overlap).then_with(|| a.name.cmp(&b.name)));
    matches.truncate(limit.max());
    log::debug!(
        "trigger match: {} skill(s) for {} query term(s)",
        matches.len(),
        query_terms.len()
    );
    matches
}
