use log::debug;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Retrieval strategy selected before any index is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// The query does not benefit from retrieval at all.
    NoRetrieval,

    /// One hybrid retrieval pass.
    SinglePass,

    /// Decompose into sub-queries (feature-flagged; routed through the
    /// single-pass pipeline until decomposition ships).
    MultiStep,

    /// Structured external lookup (feature-flagged, reserved).
    ExternalStructured,
}

/// Classifier output: the chosen strategy plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub strategy: Strategy,
    pub reasoning: String,
}

/// Lightweight pre-retrieval router.
///
/// Pure pattern matching over the query text: no model inference, no I/O.
/// It exists specifically to avoid paying retrieval cost for queries that
/// do not need it. First matching rule wins.
pub struct StrategyClassifier {
    enable_multi_step: bool,
    greeting: Regex,
    arithmetic_op: Regex,
    analysis: Regex,
    clause_conjunction: Regex,
    factual: Regex,
}

impl StrategyClassifier {
    pub fn new(enable_multi_step: bool) -> Self {
        Self {
            enable_multi_step,
            greeting: Regex::new(
                r"\b(hello|hi|hey|howdy|thanks|thank|cheers|goodbye|bye|ok|okay|great|cool|nice|welcome|morning|evening)\b",
            )
            .expect("Valid regex"),
            arithmetic_op: Regex::new(
                r"[-+*/%^=]|\b(plus|minus|times|divided|multiplied|multiply|sum|product|percent)\b",
            )
            .expect("Valid regex"),
            analysis: Regex::new(
                r"\b(compare|analyze|analyse|synthesize|evaluate|contrast|tradeoffs?|versus|vs|design|architect)\b",
            )
            .expect("Valid regex"),
            clause_conjunction: Regex::new(
                r"\b(and then|then also|furthermore|moreover|additionally|as well as)\b",
            )
            .expect("Valid regex"),
            factual: Regex::new(
                r"^(what|who|when|where|why|how)\b|\b(define|explain|describe|compare|meaning of|how to|how do)\b",
            )
            .expect("Valid regex"),
        }
    }

    /// Classify `query`. A pure function of the query and the configured
    /// flags: identical inputs always produce identical output.
    pub fn classify(&self, query: &str) -> Classification {
        let lower = query.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();

        if tokens.len() <= 2 {
            return classified(Strategy::NoRetrieval, "two or fewer tokens");
        }

        let head = tokens[..tokens.len().min(5)].join(" ");
        if self.greeting.is_match(&head) {
            return classified(Strategy::NoRetrieval, "greeting or acknowledgment");
        }

        if lower.chars().any(|c| c.is_ascii_digit()) && self.arithmetic_op.is_match(&lower) {
            return classified(Strategy::NoRetrieval, "arithmetic expression");
        }

        if self.enable_multi_step {
            let multi_clause = lower.contains(';')
                || lower.matches('?').count() > 1
                || self.clause_conjunction.is_match(&lower);
            if self.analysis.is_match(&lower) || multi_clause {
                return classified(Strategy::MultiStep, "analysis or multi-clause query");
            }
        }

        if self.factual.is_match(&lower) {
            return classified(Strategy::SinglePass, "factual question pattern");
        }

        classified(Strategy::SinglePass, "default retrieval strategy")
    }
}

fn classified(strategy: Strategy, reasoning: &str) -> Classification {
    debug!("Classified query as {strategy:?}: {reasoning}");
    Classification {
        strategy,
        reasoning: reasoning.to_string(),
    }
}
