//! Individual scoring signals.
//!
//! Every function scores the whole index and returns only positive scores;
//! candidate narrowing happens in the engine.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use super::embedding::cosine_similarity;
use super::fusion::Scores;
use super::index::{RegistryIndex, DESC_WEIGHT, NAME_WEIGHT, TAG_WEIGHT};
use super::tables::{co_occur, hinted_categories, hinted_phases, SYNONYMS};
use super::tokenize::{char_trigrams, edit_distance, fuzzy_threshold, jaccard, QueryTerms};
use crate::registry::Registry;

/// Weight of a synonym relative to the word the user typed.
const SYNONYM_WEIGHT: f64 = 0.7;
/// Minimum name trigram overlap counted as a match.
const TRIGRAM_THRESHOLD: f64 = 0.15;

fn add(scores: &mut Scores, doc: usize, value: f64) {
    if value > 0.0 {
        *scores.entry(doc).or_insert(0.0) += value;
    }
}

fn distinct(items: &[String]) -> Vec<&String> {
    let mut seen = BTreeSet::new();
    items.iter().filter(|i| seen.insert(i.as_str())).collect()
}

/// Literal containment of a query token in the lowercase name or description.
pub fn exact(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let mut scores = Scores::new();
    let tokens = distinct(&q.tokens);
    for (doc, f) in index.docs.iter().enumerate() {
        for token in &tokens {
            if f.name_lc.contains(token.as_str()) {
                add(&mut scores, doc, NAME_WEIGHT);
            } else if f.desc_lc.contains(token.as_str()) {
                add(&mut scores, doc, DESC_WEIGHT);
            }
        }
    }
    scores
}

/// Inverted-index lookup of weighted stems, scaled by IDF.
pub fn keyword(index: &RegistryIndex, stems: &[(String, f64)]) -> Scores {
    let mut scores = Scores::new();
    for (stem, multiplier) in stems {
        let Some(postings) = index.inverted.get(stem) else {
            continue;
        };
        let idf = index.idf(stem);
        for &(doc, field_weight) in postings {
            add(&mut scores, doc, field_weight * idf * multiplier);
        }
    }
    scores
}

fn plain_stems(q: &QueryTerms) -> Vec<(String, f64)> {
    distinct(&q.stems).into_iter().map(|s| (s.clone(), 1.0)).collect()
}

pub fn keyword_plain(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    keyword(index, &plain_stems(q))
}

/// Keyword scoring after synonym expansion.
pub fn semantic(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let mut weighted = plain_stems(q);
    let typed: BTreeSet<&str> = q.stems.iter().map(String::as_str).collect();
    let mut expanded = BTreeSet::new();
    for stem in &q.stems {
        if let Some(synonyms) = SYNONYMS.get(stem) {
            for syn in synonyms {
                if !typed.contains(syn.as_str()) && expanded.insert(syn.clone()) {
                    weighted.push((syn.clone(), SYNONYM_WEIGHT));
                }
            }
        }
    }
    keyword(index, &weighted)
}

/// Edit-distance tolerant match against the raw word vocabulary.
pub fn fuzzy(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let mut scores = Scores::new();
    for token in distinct(&q.tokens) {
        let len = token.chars().count();
        if len < 3 {
            continue;
        }
        let threshold = fuzzy_threshold(len);
        let mut best: BTreeMap<usize, f64> = BTreeMap::new();
        for (word, postings) in &index.vocabulary {
            let word_len = word.chars().count();
            if word_len.abs_diff(len) > threshold {
                continue;
            }
            let distance = edit_distance(token, word);
            if distance > threshold {
                continue;
            }
            let similarity = 1.0 - distance as f64 / len.max(word_len) as f64;
            for &(doc, field_weight) in postings {
                let value = similarity * field_weight;
                let entry = best.entry(doc).or_insert(0.0);
                *entry = entry.max(value);
            }
        }
        for (doc, value) in best {
            add(&mut scores, doc, value);
        }
    }
    scores
}

/// Name segments starting with a query token.
pub fn prefix(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let mut scores = Scores::new();
    for token in distinct(&q.tokens) {
        if token.chars().count() < 2 {
            continue;
        }
        let Some(docs) = index.trie.lookup(token) else {
            continue;
        };
        for &doc in docs {
            let leading = index.docs[doc]
                .name_segments
                .first()
                .is_some_and(|s| s.starts_with(token.as_str()));
            add(&mut scores, doc, if leading { 1.5 } else { 1.0 });
        }
    }
    scores
}

/// Pattern match against name, tags and description.
pub fn regex(index: &RegistryIndex, re: &Regex) -> Scores {
    let mut scores = Scores::new();
    for (doc, f) in index.docs.iter().enumerate() {
        if re.is_match(&f.name_lc) {
            add(&mut scores, doc, NAME_WEIGHT);
        }
        if f.tags_lc.iter().any(|t| re.is_match(t)) {
            add(&mut scores, doc, TAG_WEIGHT);
        }
        if re.is_match(&f.desc_lc) {
            add(&mut scores, doc, DESC_WEIGHT);
        }
    }
    scores
}

/// TF-IDF cosine similarity.
pub fn dense(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let query = index.query_vector(&q.stems);
    let mut scores = Scores::new();
    if query.norm == 0.0 {
        return scores;
    }
    for (doc, vector) in index.tfidf.iter().enumerate() {
        add(&mut scores, doc, query.cosine(vector));
    }
    scores
}

/// Cosine similarity against precomputed tool embeddings.
pub fn embedding(index: &RegistryIndex, query: &[f32]) -> Scores {
    let mut scores = Scores::new();
    if let Some(vectors) = &index.embeddings {
        for (doc, vector) in vectors.iter().enumerate() {
            add(&mut scores, doc, f64::from(cosine_similarity(query, vector)));
        }
    }
    scores
}

/// Adjacent query word pairs found as phrases in a tool.
pub fn bigram(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let mut scores = Scores::new();
    for pair in distinct(&q.bigrams) {
        if let Some(docs) = index.bigrams.get(pair.as_str()) {
            for &doc in docs {
                add(&mut scores, doc, 1.0);
            }
        }
    }
    scores
}

/// Character-trigram overlap between the query and the tool name.
pub fn trigram(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let query = char_trigrams(&q.tokens.join(" "));
    let mut scores = Scores::new();
    for (doc, f) in index.docs.iter().enumerate() {
        let sim = jaccard(&query, &f.name_trigrams);
        if sim >= TRIGRAM_THRESHOLD {
            add(&mut scores, doc, sim);
        }
    }
    scores
}

/// Query tokens equal to whole name segments; the full name typed verbatim counts most.
pub fn name_match(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let joined = q.tokens.join("_");
    let mut scores = Scores::new();
    for (doc, f) in index.docs.iter().enumerate() {
        for token in distinct(&q.tokens) {
            if f.name_segments.iter().any(|s| s == token) {
                add(&mut scores, doc, 1.0);
            }
        }
        if f.name_lc == joined || q.raw.eq_ignore_ascii_case(&f.name_lc) {
            add(&mut scores, doc, 2.0);
        }
    }
    scores
}

/// Query stems matching tag words, plus multi-word tags quoted in the query.
pub fn tag_match(index: &RegistryIndex, q: &QueryTerms) -> Scores {
    let raw = q.raw.to_lowercase();
    let mut scores = Scores::new();
    for (doc, f) in index.docs.iter().enumerate() {
        for stem in distinct(&q.stems) {
            if f.tag_stems.contains(stem) {
                add(&mut scores, doc, 1.0);
            }
        }
        for tag in &f.tags_lc {
            if tag.contains(' ') && raw.contains(tag.as_str()) {
                add(&mut scores, doc, 1.0);
            }
        }
    }
    scores
}

/// Category and phase words in the query pointing at a tool's category/phase.
pub fn affinity(registry: &Registry, q: &QueryTerms) -> Scores {
    let categories = hinted_categories(&q.stems);
    let phases = hinted_phases(&q.stems);
    let mut scores = Scores::new();
    if categories.is_empty() && phases.is_empty() {
        return scores;
    }
    for (doc, tool) in registry.all().iter().enumerate() {
        if categories.contains(&tool.category) {
            add(&mut scores, doc, 1.0);
        }
        if phases.contains(&tool.phase) {
            add(&mut scores, doc, 0.5);
        }
    }
    scores
}

/// Share of the leading results whose category co-occurs with a tool's category.
pub fn cluster(registry: &Registry, leaders: &[usize]) -> Scores {
    let mut scores = Scores::new();
    if leaders.is_empty() {
        return scores;
    }
    let tools = registry.all();
    for (doc, tool) in tools.iter().enumerate() {
        let hits = leaders
            .iter()
            .filter(|&&l| l != doc && co_occur(tools[l].category, tool.category))
            .count();
        add(&mut scores, doc, hits as f64 / leaders.len() as f64);
    }
    scores
}

/// Tools named as next steps by the leading results, closer leaders weigh more.
pub fn workflow(registry: &Registry, leaders: &[usize]) -> Scores {
    let tools = registry.all();
    let mut scores = Scores::new();
    for (rank, &leader) in leaders.iter().enumerate() {
        for next in &tools[leader].quick_ref.next_tools {
            if let Some(doc) = registry.position(next) {
                if doc != leader {
                    add(&mut scores, doc, 1.0 / (rank as f64 + 1.0));
                }
            }
        }
    }
    scores
}
