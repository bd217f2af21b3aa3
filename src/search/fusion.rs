//! Reciprocal-rank fusion across scoring signals.
//!
//! Rank-producing signals contribute `weight / (k + rank + 1)`. Boost signals
//! have no meaningful ordering of their own, so their raw score is scaled to
//! [0, 1] within the signal and weighted as if it held rank zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw per-document scores of one signal. Only positive scores are kept.
pub type Scores = BTreeMap<usize, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Keyword,
    Fuzzy,
    Prefix,
    Semantic,
    Regex,
    Dense,
    Embedding,
    Bigram,
    Trigram,
    NameMatch,
    TagMatch,
    Affinity,
    Cluster,
    Workflow,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Keyword => "keyword",
            Signal::Fuzzy => "fuzzy",
            Signal::Prefix => "prefix",
            Signal::Semantic => "semantic",
            Signal::Regex => "regex",
            Signal::Dense => "dense",
            Signal::Embedding => "embedding",
            Signal::Bigram => "bigram",
            Signal::Trigram => "trigram",
            Signal::NameMatch => "name_match",
            Signal::TagMatch => "tag_match",
            Signal::Affinity => "affinity",
            Signal::Cluster => "cluster",
            Signal::Workflow => "workflow",
        }
    }

    /// Whether the signal's ordering is meaningful enough to feed RRF.
    pub fn is_rank(&self) -> bool {
        !matches!(
            self,
            Signal::NameMatch | Signal::TagMatch | Signal::Affinity | Signal::Cluster | Signal::Workflow
        )
    }
}

/// Tunable fusion constants (`[search.fusion]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionWeights {
    pub rrf_k: f64,
    pub keyword: f64,
    pub fuzzy: f64,
    pub prefix: f64,
    pub semantic: f64,
    pub regex: f64,
    pub dense: f64,
    pub embedding: f64,
    pub bigram: f64,
    pub trigram: f64,
    pub name: f64,
    pub tag: f64,
    pub affinity: f64,
    pub cluster: f64,
    pub workflow: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            keyword: 1.0,
            fuzzy: 0.6,
            prefix: 0.7,
            semantic: 0.7,
            regex: 0.5,
            dense: 0.9,
            embedding: 1.0,
            bigram: 0.8,
            trigram: 0.4,
            name: 1.2,
            tag: 0.6,
            affinity: 0.4,
            cluster: 0.25,
            workflow: 0.25,
        }
    }
}

impl FusionWeights {
    pub fn weight(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Keyword => self.keyword,
            Signal::Fuzzy => self.fuzzy,
            Signal::Prefix => self.prefix,
            Signal::Semantic => self.semantic,
            Signal::Regex => self.regex,
            Signal::Dense => self.dense,
            Signal::Embedding => self.embedding,
            Signal::Bigram => self.bigram,
            Signal::Trigram => self.trigram,
            Signal::NameMatch => self.name,
            Signal::TagMatch => self.tag,
            Signal::Affinity => self.affinity,
            Signal::Cluster => self.cluster,
            Signal::Workflow => self.workflow,
        }
    }

    fn k(&self) -> f64 {
        if self.rrf_k.is_finite() && self.rrf_k >= 0.0 {
            self.rrf_k
        } else {
            60.0
        }
    }
}

/// Fused score of one document plus what made it up.
#[derive(Debug, Clone, Default)]
pub struct Fused {
    pub composite: f64,
    pub contributions: Vec<(Signal, f64)>,
}

impl Fused {
    pub fn add(&mut self, signal: Signal, value: f64) {
        if value > 0.0 {
            self.composite += value;
            self.contributions.push((signal, value));
        }
    }
}

/// Competition ranks: tied scores share the rank of the first of them.
pub fn ranks(scores: &Scores) -> Vec<(usize, usize)> {
    let mut ordered: Vec<(usize, f64)> = scores.iter().map(|(&d, &s)| (d, s)).collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut out = Vec::with_capacity(ordered.len());
    let mut rank = 0;
    let mut prev: Option<f64> = None;
    for (pos, (doc, score)) in ordered.into_iter().enumerate() {
        if prev != Some(score) {
            rank = pos;
            prev = Some(score);
        }
        out.push((doc, rank));
    }
    out
}

/// Fold one signal into `acc`.
pub fn accumulate(
    acc: &mut BTreeMap<usize, Fused>,
    signal: Signal,
    scores: &Scores,
    weights: &FusionWeights,
) {
    let weight = weights.weight(signal);
    if weight <= 0.0 || scores.is_empty() {
        return;
    }
    let k = weights.k();

    if signal.is_rank() {
        for (doc, rank) in ranks(scores) {
            acc.entry(doc)
                .or_default()
                .add(signal, weight / (k + rank as f64 + 1.0));
        }
    } else {
        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return;
        }
        for (&doc, &score) in scores {
            acc.entry(doc)
                .or_default()
                .add(signal, weight * (score / max) / (k + 1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_share_ties() {
        let scores: Scores = [(0, 1.0), (1, 3.0), (2, 1.0), (3, 0.5)].into_iter().collect();
        let r: BTreeMap<usize, usize> = ranks(&scores).into_iter().collect();
        assert_eq!(r[&1], 0);
        assert_eq!(r[&0], 1);
        assert_eq!(r[&2], 1);
        assert_eq!(r[&3], 3);
    }

    #[test]
    fn test_rrf_contribution() {
        let weights = FusionWeights::default();
        let scores: Scores = [(4, 2.0), (7, 1.0)].into_iter().collect();
        let mut acc = BTreeMap::new();
        accumulate(&mut acc, Signal::Keyword, &scores, &weights);
        assert!((acc[&4].composite - 1.0 / 61.0).abs() < 1e-12);
        assert!((acc[&7].composite - 1.0 / 62.0).abs() < 1e-12);
        assert_eq!(acc[&4].contributions, vec![(Signal::Keyword, acc[&4].composite)]);
    }

    #[test]
    fn test_boost_scaled_by_signal_max() {
        let weights = FusionWeights::default();
        let scores: Scores = [(1, 2.0), (2, 1.0)].into_iter().collect();
        let mut acc = BTreeMap::new();
        accumulate(&mut acc, Signal::NameMatch, &scores, &weights);
        let top = weights.name / 61.0;
        assert!((acc[&1].composite - top).abs() < 1e-12);
        assert!((acc[&2].composite - top / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_disables_signal() {
        let weights = FusionWeights {
            regex: 0.0,
            ..FusionWeights::default()
        };
        let scores: Scores = [(1, 1.0)].into_iter().collect();
        let mut acc = BTreeMap::new();
        accumulate(&mut acc, Signal::Regex, &scores, &weights);
        assert!(acc.is_empty());
    }
}
