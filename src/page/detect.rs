//! Page-side term detection and sentence-context extraction.
//!
//! Each page carries a small built-in detection set so the most common
//! slang resolves instantly, without a round-trip to the background
//! service. The scanner compiles the set into one alternation, longest
//! terms first, and reports at most three distinct matches per selection.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::lookup::dictionary::DictionaryEntry;

/// Upper bound on matches surfaced from one selection.
pub const MAX_MATCHES: usize = 3;

/// Characters treated as sentence boundaries during context extraction.
const SENTENCE_BOUNDARIES: [char; 4] = ['.', '!', '?', '\n'];

/// One term found inside a selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedTerm {
    pub term: String,
    pub meaning_line: String,
    /// Byte offset of the first occurrence in the scanned text.
    pub offset: usize,
}

/// Compiled detection set for one page context.
pub struct TermScanner {
    meanings: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl TermScanner {
    /// Compile `entries` into a scanner. An empty set disables detection.
    pub fn new(entries: &[DictionaryEntry]) -> Self {
        let mut meanings = HashMap::with_capacity(entries.len());
        for entry in entries {
            meanings.insert(entry.term.clone(), entry.meaning_line.clone());
        }

        let pattern = if meanings.is_empty() {
            None
        } else {
            // longest terms first so "핵인싸" wins over "인싸" at the same spot
            let mut terms: Vec<&String> = meanings.keys().collect();
            terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            match Regex::new(&alternation) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(error = %e, "detection pattern failed to compile");
                    None
                }
            }
        };

        Self { meanings, pattern }
    }

    /// Find up to [`MAX_MATCHES`] distinct known terms in `text`, in text
    /// order. Repeated occurrences of the same term count once.
    pub fn scan(&self, text: &str) -> Vec<DetectedTerm> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };

        let mut seen: HashSet<&str> = HashSet::new();
        let mut found = Vec::new();
        for m in pattern.find_iter(text) {
            let term = m.as_str();
            if !seen.insert(term) {
                continue;
            }
            if let Some(meaning) = self.meanings.get(term) {
                found.push(DetectedTerm {
                    term: term.to_string(),
                    meaning_line: meaning.clone(),
                    offset: m.start(),
                });
            }
            if found.len() >= MAX_MATCHES {
                break;
            }
        }
        found
    }

    pub fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }
}

/// Built-in detection set shipped with every page context.
pub fn default_detection_terms() -> Vec<DictionaryEntry> {
    [
        ("갑분싸", "갑자기 분위기가 싸해진다는 뜻"),
        ("인싸", "인사이더의 줄임말로, 특정 그룹에 속한 사람"),
        ("아싸", "아웃사이더의 줄임말로, 특정 그룹에 속하지 않은 사람"),
        ("대박", "엄청나게 좋은 일이 일어났을 때 사용하는 표현"),
        ("헐", "놀라거나 충격받았을 때 사용하는 감탄사"),
        ("ㅋㅋ", "웃음을 표현하는 인터넷 용어"),
        ("ㅎㅎ", "웃음을 표현하는 인터넷 용어"),
        ("ㅇㅇ", "응응의 줄임말로 동의를 표현"),
        ("ㄴㄴ", "노노의 줄임말로 부정을 표현"),
    ]
    .into_iter()
    .map(|(term, meaning_line)| DictionaryEntry {
        term: term.to_string(),
        meaning_line: meaning_line.to_string(),
    })
    .collect()
}

/// Extract the sentence around `selected` from `surrounding`, the text of
/// the node the selection lives in. Returns an empty string when the
/// selection cannot be located, leaving the lookup context-free.
pub fn surrounding_sentence(surrounding: &str, selected: &str) -> String {
    if selected.is_empty() {
        return String::new();
    }
    let Some(start) = surrounding.find(selected) else {
        return String::new();
    };
    let end = start + selected.len();

    // boundary chars are all ASCII, so +1 stays on a char boundary
    let sentence_start = surrounding[..start]
        .rfind(SENTENCE_BOUNDARIES)
        .map(|i| i + 1)
        .unwrap_or(0);
    let sentence_end = surrounding[end..]
        .find(SENTENCE_BOUNDARIES)
        .map(|i| end + i)
        .unwrap_or(surrounding.len());

    surrounding[sentence_start..sentence_end].trim().to_string()
}
