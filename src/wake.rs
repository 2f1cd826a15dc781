//! Wake phrase detection - checks transcript text against configured wake phrases
//!
//! Phrases are tried in configuration order and the first match wins:
//! 1. Exact - normalized transcript equals the phrase
//! 2. Substring - the phrase appears inside the transcript
//! 3. Fuzzy - some transcript token is close to the phrase's first word

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fuzzy::{normalize, similarity};

/// A normalized (lowercase, trimmed, non-empty) wake phrase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WakePhrase(String);

impl WakePhrase {
    pub fn new(phrase: &str) -> Result<Self, EngineError> {
        let normalized = normalize(phrase);
        if normalized.is_empty() {
            return Err(EngineError::InvalidPhrase(phrase.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First whitespace-separated word, the only part used for fuzzy matching
    pub fn first_word(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or(&self.0)
    }
}

impl TryFrom<String> for WakePhrase {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WakePhrase::new(&value)
    }
}

impl From<WakePhrase> for String {
    fn from(phrase: WakePhrase) -> Self {
        phrase.0
    }
}

impl fmt::Display for WakePhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a transcript matched a wake phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Substring,
    Fuzzy,
}

/// Ordered set of wake phrases, unique case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakePhrases {
    phrases: Vec<WakePhrase>,
}

impl WakePhrases {
    /// Build from raw strings, skipping empty entries and duplicates
    pub fn from_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for item in items {
            if let Ok(phrase) = WakePhrase::new(item.as_ref()) {
                set.insert(phrase);
            }
        }
        set
    }

    /// Insert phrase, returns false if already present
    pub fn insert(&mut self, phrase: WakePhrase) -> bool {
        if self.phrases.contains(&phrase) {
            return false;
        }
        self.phrases.push(phrase);
        true
    }

    /// Remove phrase, returns false if absent
    pub fn remove(&mut self, phrase: &WakePhrase) -> bool {
        let before = self.phrases.len();
        self.phrases.retain(|p| p != phrase);
        self.phrases.len() != before
    }

    pub fn contains(&self, phrase: &str) -> bool {
        let phrase = normalize(phrase);
        self.phrases.iter().any(|p| p.as_str() == phrase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WakePhrase> {
        self.phrases.iter()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.phrases.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Find the first phrase matching the transcript text
    pub fn find_match(&self, text: &str, fuzzy_sensitivity: f64) -> Option<(&WakePhrase, MatchKind)> {
        let text = normalize(text);
        self.phrases.iter().find_map(|phrase| {
            match_phrase(phrase, &text, fuzzy_sensitivity).map(|kind| (phrase, kind))
        })
    }
}

/// Match a single phrase against already-normalized text
#[hotpath::measure]
pub fn match_phrase(phrase: &WakePhrase, text: &str, fuzzy_sensitivity: f64) -> Option<MatchKind> {
    if text == phrase.as_str() {
        return Some(MatchKind::Exact);
    }
    if text.contains(phrase.as_str()) {
        return Some(MatchKind::Substring);
    }

    // Only the first word of a multi-word phrase takes part in fuzzy matching
    let word = phrase.first_word();
    text.split_whitespace()
        .any(|token| similarity(token, word) > fuzzy_sensitivity)
        .then_some(MatchKind::Fuzzy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase(s: &str) -> WakePhrase {
        WakePhrase::new(s).unwrap()
    }

    #[test]
    fn test_phrase_normalized() {
        assert_eq!(phrase("  Hey JARVIS ").as_str(), "hey jarvis");
        assert_eq!(phrase("hey jarvis please").first_word(), "hey");
        assert!(WakePhrase::new("   ").is_err());
    }

    #[test]
    fn test_exact_match() {
        let p = phrase("hey jarvis");
        assert_eq!(match_phrase(&p, "hey jarvis", 0.7), Some(MatchKind::Exact));
    }

    #[test]
    fn test_substring_match() {
        let p = phrase("hey jarvis");
        assert_eq!(
            match_phrase(&p, "okay hey jarvis please help", 0.7),
            Some(MatchKind::Substring)
        );
    }

    #[test]
    fn test_fuzzy_match() {
        let p = phrase("jarvis");
        assert_eq!(match_phrase(&p, "jarbis", 0.7), Some(MatchKind::Fuzzy));
        assert_eq!(match_phrase(&p, "ok jarvas now", 0.7), Some(MatchKind::Fuzzy));
    }

    #[test]
    fn test_fuzzy_is_strictly_greater() {
        // "jarbis" scores 5/6; a sensitivity at that exact value must not match
        let p = phrase("jarvis");
        assert_eq!(match_phrase(&p, "jarbis", 5.0 / 6.0), None);
    }

    #[test]
    fn test_no_match() {
        let p = phrase("jarvis");
        assert_eq!(match_phrase(&p, "random unrelated words", 0.7), None);
        assert_eq!(match_phrase(&p, "", 0.7), None);
    }

    #[test]
    fn test_fuzzy_uses_first_word_only() {
        // "jarvis" is the second word of the phrase and is never compared
        let p = phrase("hey jarvis");
        assert_eq!(match_phrase(&p, "jarbis", 0.7), None);
        assert_eq!(match_phrase(&p, "hay there", 0.6), Some(MatchKind::Fuzzy));
    }

    #[test]
    fn test_first_phrase_wins() {
        let set = WakePhrases::from_strings(["computer", "jarvis"]);
        let (p, kind) = set.find_match("Jarvis", 0.7).unwrap();
        assert_eq!(p.as_str(), "jarvis");
        assert_eq!(kind, MatchKind::Exact);

        // Both match; configuration order decides
        let set = WakePhrases::from_strings(["jarvis", "hey jarvis"]);
        let (p, kind) = set.find_match("hey jarvis", 0.7).unwrap();
        assert_eq!(p.as_str(), "jarvis");
        assert_eq!(kind, MatchKind::Substring);
    }

    #[test]
    fn test_set_dedup_case_insensitive() {
        let mut set = WakePhrases::from_strings(["Jarvis", "jarvis ", "", "computer"]);
        assert_eq!(set.to_strings(), vec!["jarvis", "computer"]);
        assert!(!set.insert(phrase("JARVIS")));
        assert!(set.contains("Computer"));
        assert!(set.remove(&phrase("computer")));
        assert!(!set.remove(&phrase("computer")));
        assert_eq!(set.len(), 1);
    }
}
