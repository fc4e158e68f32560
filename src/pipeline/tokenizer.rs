//! Candidate term surfacing.
//!
//! A lightweight token scan that surfaces proper-noun-shaped candidates for
//! LLM classification: capitalized word runs and acronyms in Latin text,
//! katakana and han compounds in CJK text. Precision comes from the
//! classification stage, not from this pass.

use std::collections::HashSet;

/// Words never interesting on their own, however capitalized.
const STOPWORDS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "It", "He", "She", "They", "We", "You",
    "I", "In", "On", "At", "And", "But", "Or", "If", "When", "Then", "There", "Here", "What",
    "Who", "How", "Why", "Not", "No", "Yes",
];

/// Punctuation that ends a phrase run within a line.
const PHRASE_BOUNDARIES: &[char] = &[
    '.', '!', '?', ',', ';', ':', '(', ')', '[', ']', '{', '}', '"', '\u{201C}', '\u{201D}',
    '\u{3001}', '\u{3002}', '\u{300C}', '\u{300D}',
];

/// Minimum and maximum candidate length in characters.
const MIN_CHARS: usize = 2;
const MAX_CHARS: usize = 48;

/// Extracts candidate term surfaces from a document, first-seen order,
/// deduplicated.
pub fn candidate_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let mut push = |candidate: String| {
        let chars = candidate.chars().count();
        if chars < MIN_CHARS || chars > MAX_CHARS {
            return;
        }
        if seen.insert(candidate.clone()) {
            candidates.push(candidate);
        }
    };

    for line in text.lines() {
        for segment in line.split(PHRASE_BOUNDARIES) {
            for phrase in latin_phrases(segment) {
                push(phrase);
            }
            for run in cjk_runs(segment) {
                push(run);
            }
        }
    }

    candidates
}

/// Collects runs of capitalized Latin words and acronyms within a segment.
fn latin_phrases(segment: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in segment.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-')) {
        if word.is_empty() {
            continue;
        }
        if is_capitalized(word) || is_acronym(word) {
            current.push(word);
        } else {
            flush_phrase(&mut current, &mut phrases);
        }
    }
    flush_phrase(&mut current, &mut phrases);

    phrases
}

fn flush_phrase(current: &mut Vec<&str>, phrases: &mut Vec<String>) {
    let mut words: Vec<&str> = std::mem::take(current);

    // Trim leading sentence-position stopwords ("When Alice" -> "Alice")
    while words.len() > 1 && STOPWORDS.contains(&words[0]) {
        words.remove(0);
    }
    if words.is_empty() || (words.len() == 1 && STOPWORDS.contains(&words[0])) {
        return;
    }
    phrases.push(words.join(" "));
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(first) if first.is_uppercase())
        && word.chars().any(|c| c.is_lowercase())
}

fn is_acronym(word: &str) -> bool {
    word.chars().count() >= 2 && word.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Collects katakana runs and han compounds within a segment.
fn cjk_runs(segment: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut current_kind = CjkKind::None;

    for c in segment.chars() {
        let kind = cjk_kind(c);
        if kind == CjkKind::None {
            take_run(&mut current, &mut runs);
            current_kind = CjkKind::None;
        } else if kind == current_kind || current.is_empty() {
            current.push(c);
            current_kind = kind;
        } else {
            take_run(&mut current, &mut runs);
            current.push(c);
            current_kind = kind;
        }
    }
    take_run(&mut current, &mut runs);

    runs
}

fn take_run(current: &mut String, runs: &mut Vec<String>) {
    if current.chars().count() >= MIN_CHARS {
        runs.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CjkKind {
    None,
    Katakana,
    Han,
}

fn cjk_kind(c: char) -> CjkKind {
    match c {
        '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => CjkKind::Katakana,
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => CjkKind::Han,
        _ => CjkKind::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalized_words_surfaced() {
        let candidates = candidate_terms("Alice went to see Bob at the market.");
        assert!(candidates.contains(&"Alice".to_string()));
        assert!(candidates.contains(&"Bob".to_string()));
        assert!(!candidates.contains(&"market".to_string()));
    }

    #[test]
    fn test_capitalized_runs_kept_together() {
        let candidates = candidate_terms("She joined Acme Dynamics Corporation last year.");
        assert!(candidates.contains(&"Acme Dynamics Corporation".to_string()));
    }

    #[test]
    fn test_sentence_boundary_splits_runs() {
        let candidates = candidate_terms("Alice met Bob. Bob met Alice.");
        assert_eq!(candidates, vec!["Alice".to_string(), "Bob".to_string()]);
    }

    #[test]
    fn test_acronyms_surfaced() {
        let candidates = candidate_terms("The API uses HTTP2 everywhere.");
        assert!(candidates.contains(&"API".to_string()));
        assert!(candidates.contains(&"HTTP2".to_string()));
    }

    #[test]
    fn test_lone_stopwords_dropped() {
        let candidates = candidate_terms("The cat sat. This is fine.");
        assert!(!candidates.iter().any(|c| c == "The" || c == "This"));
    }

    #[test]
    fn test_leading_stopword_trimmed_from_phrase() {
        let candidates = candidate_terms("When Alice left early.");
        assert!(candidates.contains(&"Alice".to_string()));
        assert!(!candidates.iter().any(|c| c.starts_with("When")));
    }

    #[test]
    fn test_leading_article_trimmed_from_names() {
        let candidates = candidate_terms("They travelled through The Shire quickly.");
        assert!(candidates.contains(&"Shire".to_string()));
    }

    #[test]
    fn test_camel_case_names_surfaced() {
        let candidates = candidate_terms("He visited McDonald yesterday.");
        assert!(candidates.contains(&"McDonald".to_string()));
    }

    #[test]
    fn test_katakana_runs_surfaced() {
        let candidates = candidate_terms("彼はミスリルの鎧を着た。");
        assert!(candidates.contains(&"ミスリル".to_string()));
    }

    #[test]
    fn test_han_compounds_surfaced() {
        let candidates = candidate_terms("東京へ行く。");
        assert!(candidates.contains(&"東京".to_string()));
    }

    #[test]
    fn test_single_cjk_chars_dropped() {
        let candidates = candidate_terms("木がある。");
        assert!(!candidates.contains(&"木".to_string()));
    }

    #[test]
    fn test_overlong_candidates_dropped() {
        let long_word = format!("X{}", "x".repeat(100));
        let candidates = candidate_terms(&long_word);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(candidate_terms("").is_empty());
    }
}
