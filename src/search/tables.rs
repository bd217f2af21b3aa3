//! Static lookup tables for query expansion, intents and domain clusters.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::registry::{Category, Phase};

/// Synonym groups. Every word in a group expands to every other word.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["screenshot", "capture", "visual", "snapshot", "image", "picture"],
    &["email", "mail", "message", "inbox", "smtp"],
    &["send", "deliver", "dispatch", "notify"],
    &["verify", "verification", "validate", "check", "confirm"],
    &["test", "eval", "evaluation", "benchmark", "measure"],
    &["bug", "gap", "issue", "defect", "problem"],
    &["fix", "resolve", "repair", "patch"],
    &["search", "find", "lookup", "query", "discover"],
    &["fetch", "download", "scrape", "retrieve", "crawl"],
    &["web", "internet", "url", "page", "http", "website"],
    &["security", "vulnerability", "cve", "secure", "audit"],
    &["secret", "credential", "token", "password", "key"],
    &["learning", "knowledge", "memory", "lesson", "remember"],
    &["research", "recon", "investigate", "explore"],
    &["llm", "model", "ai", "gpt", "completion"],
    &["docs", "documentation", "readme", "guide", "markdown"],
    &["pr", "pull", "merge", "review"],
    &["ui", "interface", "layout", "frontend", "design"],
    &["gate", "release", "deploy", "ship"],
    &["report", "summary", "summarize", "overview"],
];

/// word stem -> expansion stems
pub static SYNONYMS: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for group in SYNONYM_GROUPS {
        let stems: Vec<String> = group
            .iter()
            .map(|w| super::tokenize::normalize_keyword(w))
            .collect();
        for stem in &stems {
            let entry = map.entry(stem.clone()).or_default();
            for other in &stems {
                if other != stem && !entry.contains(other) {
                    entry.push(other.clone());
                }
            }
        }
    }
    map
});

/// Coarse intent label -> categories searched for it.
pub const INTENTS: &[(&str, &[Category])] = &[
    ("security_audit", &[Category::Security]),
    ("ui_review", &[Category::UiCapture, Category::Vision]),
    (
        "verify_change",
        &[Category::Verification, Category::QualityGate, Category::Evaluation],
    ),
    ("research", &[Category::Web, Category::Recon, Category::Github]),
    ("communication", &[Category::Email]),
    ("learning", &[Category::Learning, Category::Flywheel]),
    ("documentation", &[Category::Documentation]),
    ("llm_ops", &[Category::Llm, Category::Evaluation]),
];

pub fn intent_categories(intent: &str) -> Option<&'static [Category]> {
    let wanted = intent.trim().to_ascii_lowercase();
    INTENTS
        .iter()
        .find(|(label, _)| *label == wanted)
        .map(|(_, cats)| *cats)
}

/// Query stems that imply a category.
const CATEGORY_HINTS: &[(&str, Category)] = &[
    ("verify", Category::Verification),
    ("verification", Category::Verification),
    ("gap", Category::Verification),
    ("eval", Category::Evaluation),
    ("benchmark", Category::Evaluation),
    ("regression", Category::Evaluation),
    ("gate", Category::QualityGate),
    ("lint", Category::QualityGate),
    ("learn", Category::Learning),
    ("knowledge", Category::Learning),
    ("recon", Category::Recon),
    ("research", Category::Recon),
    ("flywheel", Category::Flywheel),
    ("loop", Category::Flywheel),
    ("screenshot", Category::UiCapture),
    ("responsive", Category::UiCapture),
    ("vision", Category::Vision),
    ("image", Category::Vision),
    ("web", Category::Web),
    ("url", Category::Web),
    ("email", Category::Email),
    ("mail", Category::Email),
    ("inbox", Category::Email),
    ("security", Category::Security),
    ("vulnerability", Category::Security),
    ("secret", Category::Security),
    ("github", Category::Github),
    ("repo", Category::Github),
    ("doc", Category::Documentation),
    ("report", Category::Documentation),
    ("llm", Category::Llm),
    ("model", Category::Llm),
    ("prompt", Category::Llm),
];

const PHASE_HINTS: &[(&str, Phase)] = &[
    ("research", Phase::Research),
    ("investigate", Phase::Research),
    ("implement", Phase::Implement),
    ("build", Phase::Implement),
    ("verify", Phase::Verify),
    ("test", Phase::Verify),
    ("ship", Phase::Ship),
    ("deploy", Phase::Ship),
    ("release", Phase::Ship),
    ("learn", Phase::Learn),
    ("retrospective", Phase::Learn),
];

pub fn hinted_categories(stems: &[String]) -> Vec<Category> {
    let mut out = Vec::new();
    for stem in stems {
        for (hint, cat) in CATEGORY_HINTS {
            if hint == stem && !out.contains(cat) {
                out.push(*cat);
            }
        }
    }
    out
}

pub fn hinted_phases(stems: &[String]) -> Vec<Phase> {
    let mut out = Vec::new();
    for stem in stems {
        for (hint, phase) in PHASE_HINTS {
            if hint == stem && !out.contains(phase) {
                out.push(*phase);
            }
        }
    }
    out
}

/// Categories whose tools tend to be used together in one session.
pub const DOMAIN_CLUSTERS: &[&[Category]] = &[
    &[Category::UiCapture, Category::Vision],
    &[
        Category::Verification,
        Category::QualityGate,
        Category::Evaluation,
        Category::Flywheel,
    ],
    &[Category::Web, Category::Recon, Category::Github],
    &[Category::Learning, Category::Flywheel, Category::Documentation],
    &[Category::Llm, Category::Evaluation],
    &[Category::Security, Category::QualityGate],
    &[Category::Email, Category::Documentation],
];

/// Whether `a` and `b` share a domain cluster (a category always shares with itself).
pub fn co_occur(a: Category, b: Category) -> bool {
    a == b
        || DOMAIN_CLUSTERS
            .iter()
            .any(|cluster| cluster.contains(&a) && cluster.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_are_symmetric() {
        let shots = SYNONYMS.get("screenshot").unwrap();
        assert!(shots.contains(&"captur".to_string()) || shots.contains(&"capture".to_string()));
        for (stem, expansions) in SYNONYMS.iter() {
            for other in expansions {
                assert!(SYNONYMS[other].contains(stem), "{stem} -> {other} not symmetric");
            }
        }
    }

    #[test]
    fn test_intent_lookup() {
        assert_eq!(intent_categories("security_audit"), Some(&[Category::Security][..]));
        assert_eq!(intent_categories("UI_REVIEW").map(|c| c.len()), Some(2));
        assert!(intent_categories("astrology").is_none());
    }

    #[test]
    fn test_hints_and_clusters() {
        let stems = vec!["email".to_string(), "deploy".to_string()];
        assert_eq!(hinted_categories(&stems), vec![Category::Email]);
        assert_eq!(hinted_phases(&stems), vec![Phase::Ship]);
        assert!(co_occur(Category::UiCapture, Category::Vision));
        assert!(co_occur(Category::Web, Category::Web));
        assert!(!co_occur(Category::Email, Category::Security));
    }
}
