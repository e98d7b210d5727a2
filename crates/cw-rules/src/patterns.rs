//! Intent pattern table and scoring classifier.
//!
//! Each intent owns an ordered list of regexes. An intent's score is the
//! number of its patterns matching the lower-cased input. The strictly
//! highest score wins; ties go to the intent declared first; a zero score
//! everywhere means `Unknown`.

use regex::Regex;
use std::sync::LazyLock;

use cw_protocol::Intent;

struct IntentPatterns {
    intent: Intent,
    patterns: Vec<Regex>,
}

impl IntentPatterns {
    fn new(intent: Intent, patterns: &[&str]) -> Self {
        Self {
            intent,
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
        }
    }

    fn score(&self, lower: &str) -> usize {
        self.patterns.iter().filter(|re| re.is_match(lower)).count()
    }
}

// ── Pattern table (declaration order is the tie-break order) ──

static INTENT_PATTERNS: LazyLock<Vec<IntentPatterns>> = LazyLock::new(|| {
    vec![
        IntentPatterns::new(
            Intent::Scan,
            &[
                r"\bscan(ning)?\b",
                r"\bports?\b",
                r"\bnmap\b",
                r"\bopen\s+ports?\b",
                r"\b(probe|sweep)\b",
                r"\bcheck\b.*\bports?\b",
            ],
        ),
        IntentPatterns::new(
            Intent::Recon,
            &[
                r"\brecon(naissance)?\b",
                r"\benumerat(e|ion)\b",
                r"\bwhois\b",
                r"\bsubdomains?\b",
                r"\bdns\b",
                r"\b(gather|collect|find)\b.*\binfo(rmation)?\b",
                r"\bfootprint(ing)?\b",
                r"\bosint\b",
            ],
        ),
        IntentPatterns::new(
            Intent::VulnScan,
            &[
                r"\bvuln(s|erability|erabilities)?\b",
                r"\bvulnerable\b",
                r"\bcves?\b",
                r"\bexploitable\b",
                r"\bweakness(es)?\b",
                r"\bsecurity\s+(audit|assessment)\b",
                r"\b(nikto|nuclei)\b",
            ],
        ),
        IntentPatterns::new(
            Intent::Query,
            &[
                r"^(what|how|why|who|when|where|explain|describe|tell me)\b",
                r"\?\s*$",
                r"\bwhat\s+(is|are)\b",
                r"\bexplain\b",
            ],
        ),
        IntentPatterns::new(
            Intent::GenerateShell,
            &[
                r"\b(reverse|bind)\s+shell\b",
                r"\bshell\s*code\b",
                r"\bpayload\b",
                r"\b(generate|create|make|build)\b.*\bshell\b",
                r"\b(lhost|lport)\b",
                r"\blisten(er|ing)?\b",
            ],
        ),
        IntentPatterns::new(
            Intent::Tools,
            &[
                r"\btools?\b",
                r"\bmodules?\b",
                r"\b(list|show)\b.*\b(tools?|modules?|capabilities)\b",
            ],
        ),
        IntentPatterns::new(
            Intent::Help,
            &[
                r"^\s*help\b",
                r"\bhelp\b",
                r"\busage\b",
                r"\bhow\s+do\s+i\s+use\b",
                r"\bcommands\b",
            ],
        ),
        IntentPatterns::new(
            Intent::History,
            &[
                r"\bhistory\b",
                r"\b(previous|past|recent|last)\s+commands?\b",
            ],
        ),
        IntentPatterns::new(
            Intent::Exit,
            &[
                r"^\s*(exit|quit|bye|goodbye)\b",
                r"\b(exit|quit)\b",
                r"\bclose\s+(the\s+)?(session|program)\b",
            ],
        ),
    ]
});

/// Score every intent against the text, in table order.
pub fn score_all(text: &str) -> Vec<(Intent, usize)> {
    let lower = text.to_lowercase();
    let lower = lower.trim();
    INTENT_PATTERNS
        .iter()
        .map(|entry| (entry.intent, entry.score(lower)))
        .collect()
}

/// Classify text by pattern score.
pub fn classify_text(text: &str) -> Intent {
    let mut best = Intent::Unknown;
    let mut best_score = 0;
    for (intent, score) in score_all(text) {
        // Strictly greater keeps the earlier intent on ties.
        if score > best_score {
            best = intent;
            best_score = score;
        }
    }
    best
}
