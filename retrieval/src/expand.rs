use log::debug;
use std::collections::{HashMap, HashSet};

/// Deterministic synonym-based query expansion.
///
/// Strictly additive: original tokens are always preserved and up to
/// `synonym_limit` synonyms per matched token are appended. No network calls
/// and no randomness; the query never leaves the process for this step.
pub struct QueryExpander {
    table: HashMap<String, Vec<String>>,
    synonym_limit: usize,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(default_table(), 2)
    }
}

impl QueryExpander {
    pub fn new(table: HashMap<String, Vec<String>>, synonym_limit: usize) -> Self {
        Self {
            table,
            synonym_limit,
        }
    }

    /// Built-in table with a custom per-token synonym limit.
    pub fn with_default_table(synonym_limit: usize) -> Self {
        Self::new(default_table(), synonym_limit)
    }

    /// Expand `query` by appending synonyms for every token present in the
    /// table. Tokens without synonyms leave the query untouched.
    pub fn expand(&self, query: &str) -> String {
        let mut seen: HashSet<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let mut appended: Vec<String> = Vec::new();

        for token in query.split_whitespace() {
            let key = token
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_lowercase();
            let Some(synonyms) = self.table.get(&key) else {
                continue;
            };

            let mut added = 0;
            for synonym in synonyms {
                if added == self.synonym_limit {
                    break;
                }
                if seen.insert(synonym.to_lowercase()) {
                    appended.push(synonym.clone());
                    added += 1;
                }
            }
        }

        if appended.is_empty() {
            return query.to_string();
        }

        debug!("Expanded query with {} synonyms", appended.len());
        format!("{query} {}", appended.join(" "))
    }
}

/// Built-in synonym table. Illustrative defaults; deployments tune this per
/// domain.
fn default_table() -> HashMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("error", &["failure", "exception"]),
        ("bug", &["defect", "issue"]),
        ("fast", &["quick", "performant"]),
        ("slow", &["latency", "sluggish"]),
        ("search", &["query", "lookup"]),
        ("delete", &["remove", "erase"]),
        ("create", &["add", "make"]),
        ("update", &["modify", "change"]),
        ("config", &["configuration", "settings"]),
        ("configure", &["setup", "settings"]),
        ("docs", &["documentation", "guide"]),
        ("install", &["setup", "deploy"]),
        ("auth", &["authentication", "login"]),
        ("database", &["storage", "db"]),
        ("test", &["verify", "check"]),
        ("usage", &["use", "example"]),
        ("function", &["method", "routine"]),
        ("parameter", &["argument", "option"]),
    ];

    entries
        .iter()
        .map(|(word, synonyms)| {
            (
                (*word).to_string(),
                synonyms.iter().map(|s| (*s).to_string()).collect(),
            )
        })
        .collect()
}
