//! Code-aware tokenization for keyword indexing.
//!
//! Identifiers are split on case and underscore boundaries in addition to
//! being emitted whole, so `getUserName` matches queries for "user name" as
//! well as exact-identifier queries. Tokenization is deterministic and
//! order-sensitive; duplicates are preserved because BM25 term frequency
//! depends on them.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Which tokenization ruleset to apply.
///
/// The mode is serialized alongside the keyword index so query-time
/// tokenization always matches build-time tokenization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenizerMode {
    /// Full ruleset: whole symbols, camelCase/underscore sub-parts, and
    /// whitespace-delimited words.
    #[default]
    CodeAware,

    /// Lowercased whitespace-delimited words only, for corpora known to
    /// contain no identifiers.
    Plain,
}

/// Deterministic tokenizer shared by index build and query paths.
#[derive(Debug)]
pub struct Tokenizer {
    mode: TokenizerMode,
    symbol_pattern: Regex,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerMode::CodeAware)
    }
}

impl Tokenizer {
    pub fn new(mode: TokenizerMode) -> Self {
        let symbol_pattern = Regex::new(r"[A-Za-z0-9_]+").expect("Valid regex");
        Self {
            mode,
            symbol_pattern,
        }
    }

    pub fn mode(&self) -> TokenizerMode {
        self.mode
    }

    /// Tokenize `text` into an order-sensitive list of lowercase tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        if self.mode == TokenizerMode::CodeAware {
            for symbol in self.symbol_pattern.find_iter(text) {
                let symbol = symbol.as_str();
                tokens.push(symbol.to_lowercase());

                if has_internal_boundary(symbol) {
                    split_symbol(symbol, &mut tokens);
                }
            }
        }

        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
            if !word.is_empty() {
                tokens.push(word.to_lowercase());
            }
        }

        tokens
    }
}

/// Whether a symbol contains a camelCase transition or an underscore.
fn has_internal_boundary(symbol: &str) -> bool {
    if symbol.contains('_') {
        return true;
    }
    let mut prev_lower = false;
    for c in symbol.chars() {
        if c.is_uppercase() && prev_lower {
            return true;
        }
        prev_lower = c.is_lowercase();
    }
    false
}

/// Append the case- and underscore-delimited sub-parts of `symbol`,
/// lowercased, to `out`.
fn split_symbol(symbol: &str, out: &mut Vec<String>) {
    let mut part = String::new();
    let mut prev_lower = false;

    for c in symbol.chars() {
        if c == '_' {
            if !part.is_empty() {
                out.push(part.to_lowercase());
                part.clear();
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !part.is_empty() {
            out.push(part.to_lowercase());
            part.clear();
        }
        prev_lower = c.is_lowercase();
        part.push(c);
    }

    if !part.is_empty() {
        out.push(part.to_lowercase());
    }
}

/// English stopword list used for keyword-overlap scoring. Includes question
/// words so interrogative queries reduce to their content terms.
pub fn stopwords() -> &'static HashSet<&'static str> {
    static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORDS.get_or_init(|| {
        [
            "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "do",
            "does", "did", "doing", "have", "has", "had", "having", "i", "you", "he", "she", "it",
            "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our",
            "their", "this", "that", "these", "those", "what", "which", "who", "whom", "whose",
            "when", "where", "why", "how", "can", "could", "should", "would", "will", "shall",
            "may", "might", "must", "of", "in", "on", "at", "by", "for", "with", "about",
            "against", "between", "into", "through", "to", "from", "up", "down", "out", "off",
            "over", "under", "again", "and", "or", "but", "not", "no", "nor", "so", "than",
            "then", "too", "very", "just", "also", "there", "here", "all", "any", "both", "each",
            "few", "more", "most", "other", "some", "such", "only", "own", "same", "as", "if",
            "because", "while", "during",
        ]
        .into_iter()
        .collect()
    })
}
