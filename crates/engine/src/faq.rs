//! FAQ matching: fuzzy lookup of a customer message against canned answers.
//!
//! Each entry is scored against its question and every keyword phrase. A
//! phrasing scores `max(sequence_ratio, token_dice)`:
//!
//! - `sequence_ratio` is the Ratcliff/Obershelp similarity `2*M/T` over the
//!   normalized strings, which rewards near-identical wording.
//! - `token_dice` is the Dice coefficient over content words, which rewards
//!   short questions that share the important word ("hours").

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use supportline_core::error::{Error, Result};
use supportline_core::faq::FaqEntry;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD: f32 = 0.65;

const STOPWORDS: &[&str] = &[
    "a", "about", "am", "an", "and", "any", "are", "at", "be", "by", "can", "could", "do",
    "does", "did", "for", "have", "has", "hello", "hey", "hi", "how", "i", "in", "is", "it",
    "its", "me", "my", "of", "on", "or", "our", "please", "should", "that", "the", "there",
    "this", "to", "us", "was", "we", "were", "what", "when", "where", "which", "will", "with",
    "would", "you", "your",
];

/// A successful FAQ lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaqMatch {
    /// Position of the entry in load order.
    pub entry_index: usize,
    pub question: String,
    pub answer: String,
    pub score: f32,
}

/// Finds the canned answer for a customer message.
///
/// Implementations must be pure: no I/O, no side effects.
pub trait FaqMatcher: Send + Sync {
    /// The best-scoring entry regardless of threshold.
    fn best_candidate(&self, message: &str) -> Option<FaqMatch>;

    /// Minimum score for a match to count.
    fn threshold(&self) -> f32;

    /// Number of loaded entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The best entry if it clears the threshold.
    fn find_match(&self, message: &str) -> Option<FaqMatch> {
        self.best_candidate(message)
            .filter(|m| m.score >= self.threshold())
    }
}

/// Pre-normalized phrasings for one entry.
struct IndexedEntry {
    entry: FaqEntry,
    phrasings: Vec<Phrasing>,
}

struct Phrasing {
    normalized: String,
    tokens: HashSet<String>,
}

impl Phrasing {
    fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let tokens = content_tokens(&normalized);
        Self { normalized, tokens }
    }

    fn score(&self, other: &Phrasing) -> f32 {
        sequence_ratio(&self.normalized, &other.normalized).max(token_dice(&self.tokens, &other.tokens))
    }
}

/// The default matcher: normalized fuzzy similarity over questions and keywords.
pub struct FuzzyFaqMatcher {
    entries: Vec<IndexedEntry>,
    threshold: f32,
}

impl FuzzyFaqMatcher {
    pub fn new(entries: Vec<FaqEntry>, threshold: f32) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let phrasings = std::iter::once(entry.question.as_str())
                    .chain(entry.keywords.iter().map(String::as_str))
                    .map(Phrasing::new)
                    .filter(|p| !p.normalized.is_empty())
                    .collect();
                IndexedEntry { entry, phrasings }
            })
            .collect();

        Self {
            entries,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

impl FaqMatcher for FuzzyFaqMatcher {
    fn best_candidate(&self, message: &str) -> Option<FaqMatch> {
        let query = Phrasing::new(message);
        if query.normalized.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, indexed) in self.entries.iter().enumerate() {
            let score = indexed
                .phrasings
                .iter()
                .map(|p| p.score(&query))
                .fold(0.0_f32, f32::max);

            // Strict comparison keeps the earliest entry on ties
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| {
            let entry = &self.entries[index].entry;
            FaqMatch {
                entry_index: index,
                question: entry.question.clone(),
                answer: entry.answer.clone(),
                score,
            }
        })
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Load FAQ entries from a JSON array file.
///
/// A missing file yields an empty table so the assistant still runs on the
/// generative fallback alone.
pub fn load_faqs(path: &Path) -> Result<Vec<FaqEntry>> {
    if !path.exists() {
        warn!(path = %path.display(), "FAQ file not found, starting with an empty FAQ table");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read FAQ file {}: {e}", path.display()),
    })?;
    let entries: Vec<FaqEntry> = serde_json::from_str(&content).map_err(|e| Error::Config {
        message: format!("Invalid FAQ file {}: {e}", path.display()),
    })?;

    info!(path = %path.display(), count = entries.len(), "Loaded FAQ entries");
    Ok(entries)
}

/// Lowercase, split on anything that is not alphanumeric, rejoin with spaces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn content_tokens(normalized: &str) -> HashSet<String> {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Dice coefficient `2|A∩B| / (|A|+|B|)`.
pub fn token_dice(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    (2 * shared) as f32 / (a.len() + b.len()) as f32
}

/// Ratcliff/Obershelp similarity: `2*M / T` where `M` counts characters in
/// recursively found longest common blocks.
pub fn sequence_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * matching_chars(&a, &b)) as f32 / total as f32
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, size) = longest_common_block(a, b, a_lo, a_hi, b_lo, b_hi);
        if size == 0 {
            continue;
        }
        matched += size;
        if a_lo < i && b_lo < j {
            pending.push((a_lo, i, b_lo, j));
        }
        if i + size < a_hi && j + size < b_hi {
            pending.push((i + size, a_hi, j + size, b_hi));
        }
    }

    matched
}

/// Longest common substring of `a[a_lo..a_hi]` and `b[b_lo..b_hi]`,
/// earliest in `a` on ties. Returns `(start_a, start_b, len)`.
fn longest_common_block(
    a: &[char],
    b: &[char],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> (usize, usize, usize) {
    let width = b_hi - b_lo;
    let mut prev = vec![0usize; width + 1];
    let mut best = (a_lo, b_lo, 0);

    for i in a_lo..a_hi {
        let mut row = vec![0usize; width + 1];
        for j in b_lo..b_hi {
            if a[i] == b[j] {
                let len = prev[j - b_lo] + 1;
                row[j - b_lo + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_faqs() -> Vec<FaqEntry> {
        vec![
            FaqEntry::new("store hours", "We are open 9-5 Mon-Fri"),
            FaqEntry::new("How do I reset my password?", "Use the 'Forgot password' link.")
                .with_keywords(&["forgot password", "password reset"]),
            FaqEntry::new("What is your refund policy?", "Refunds within 30 days."),
        ]
    }

    #[test]
    fn hours_question_matches_store_hours() {
        let matcher = FuzzyFaqMatcher::new(sample_faqs(), DEFAULT_THRESHOLD);
        let m = matcher.find_match("What are your hours?").unwrap();
        assert_eq!(m.answer, "We are open 9-5 Mon-Fri");
        assert_eq!(m.entry_index, 0);
        assert!(m.score >= 0.65);
    }

    #[test]
    fn keyword_phrase_matches() {
        let matcher = FuzzyFaqMatcher::new(sample_faqs(), DEFAULT_THRESHOLD);
        let m = matcher.find_match("I forgot my password").unwrap();
        assert_eq!(m.entry_index, 1);
    }

    #[test]
    fn near_identical_wording_scores_high() {
        let matcher = FuzzyFaqMatcher::new(sample_faqs(), DEFAULT_THRESHOLD);
        let m = matcher.find_match("what is your refund policy").unwrap();
        assert_eq!(m.entry_index, 2);
        assert!((m.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unrelated_message_does_not_match() {
        let matcher = FuzzyFaqMatcher::new(sample_faqs(), DEFAULT_THRESHOLD);
        assert!(matcher.find_match("My printer is on fire").is_none());
        assert!(matcher.best_candidate("My printer is on fire").is_some());
    }

    #[test]
    fn empty_table_and_blank_message() {
        let matcher = FuzzyFaqMatcher::new(Vec::new(), DEFAULT_THRESHOLD);
        assert!(matcher.is_empty());
        assert!(matcher.find_match("store hours").is_none());

        let matcher = FuzzyFaqMatcher::new(sample_faqs(), DEFAULT_THRESHOLD);
        assert!(matcher.find_match("?!").is_none());
    }

    #[test]
    fn ties_keep_first_entry() {
        let faqs = vec![
            FaqEntry::new("shipping", "first"),
            FaqEntry::new("shipping", "second"),
        ];
        let matcher = FuzzyFaqMatcher::new(faqs, DEFAULT_THRESHOLD);
        assert_eq!(matcher.find_match("shipping").unwrap().answer, "first");
    }

    #[test]
    fn threshold_is_respected() {
        let matcher = FuzzyFaqMatcher::new(sample_faqs(), 0.99);
        assert!(matcher.find_match("What are your hours?").is_none());
    }

    #[test]
    fn sequence_ratio_basics() {
        assert!((sequence_ratio("abcd", "abcd") - 1.0).abs() < 1e-6);
        assert_eq!(sequence_ratio("abc", "xyz"), 0.0);
        // "abcd" vs "bcde": block "bcd" => 2*3/8
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("  What's UP, doc?! "), "what s up doc");
    }

    #[test]
    fn load_missing_file_is_empty() {
        let entries = load_faqs(Path::new("/nonexistent/faqs.json")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"question": "store hours", "answer": "9-5", "keywords": ["opening times"]}}]"#
        )
        .unwrap();

        let entries = load_faqs(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].keywords, vec!["opening times"]);
    }

    #[test]
    fn load_invalid_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load_faqs(file.path()), Err(Error::Config { .. })));
    }
}
