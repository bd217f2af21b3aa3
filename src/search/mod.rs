//! Hybrid tool search.
//!
//! [`SearchEngine::search`] never fails: empty queries, unknown filters and a
//! missing embedding provider all produce an empty (possibly degraded)
//! outcome instead of an error.

pub mod embedding;
pub mod fusion;
pub mod index;
pub mod strategies;
pub mod tables;
pub mod tokenize;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::RegexBuilder;
use serde::Serialize;
use smol_str::SmolStr;

use crate::config::SearchConfig;
use crate::error_recovery::CircuitBreaker;
use crate::registry::{Category, Phase, QuickRef, Registry};

use self::embedding::EmbeddingProvider;
pub use self::fusion::{FusionWeights, Signal};
use self::fusion::{accumulate, Fused, Scores};
use self::index::{embedding_text, RegistryIndex};
use self::tokenize::QueryTerms;

/// Upper bound on `limit`.
pub const MAX_LIMIT: usize = 50;
/// Preliminary results that drive cluster and workflow boosts.
const LEADERS: usize = 3;
/// Compiled regex size cap for user-supplied patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    Fuzzy,
    Prefix,
    Semantic,
    Regex,
    Dense,
    Embedding,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub const ALL: [SearchMode; 8] = [
        SearchMode::Exact,
        SearchMode::Fuzzy,
        SearchMode::Prefix,
        SearchMode::Semantic,
        SearchMode::Regex,
        SearchMode::Dense,
        SearchMode::Embedding,
        SearchMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Prefix => "prefix",
            SearchMode::Semantic => "semantic",
            SearchMode::Regex => "regex",
            SearchMode::Dense => "dense",
            SearchMode::Embedding => "embedding",
            SearchMode::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.as_str() == wanted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub category: Option<String>,
    pub phase: Option<String>,
    pub limit: Option<usize>,
    pub mode: SearchMode,
    pub explain: bool,
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Contribution {
    pub signal: Signal,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
    pub name: SmolStr,
    /// Composite relevance in [0, 1]
    pub score: f64,
    pub category: Category,
    pub phase: Phase,
    pub quick_ref: QuickRef,
    pub toolset: Option<SmolStr>,
    /// Set by the dispatcher from the loader snapshot.
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<Contribution>>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub results: Vec<ScoredResult>,
    /// Embeddings were wanted but the provider was unavailable or failing.
    pub degraded: bool,
    pub intent_categories: Vec<Category>,
    pub warnings: Vec<String>,
}

pub struct SearchEngine {
    registry: Arc<Registry>,
    index: RegistryIndex,
    embeddings: Arc<dyn EmbeddingProvider>,
    embedding_circuit: CircuitBreaker,
    weights: FusionWeights,
    default_limit: usize,
}

impl SearchEngine {
    pub fn new(
        registry: Arc<Registry>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: &SearchConfig,
    ) -> Self {
        let mut index = RegistryIndex::build(&registry);
        tracing::debug!(docs = index.len(), terms = index.vocabulary.len(), "Built search index");

        if embeddings.is_available() {
            let texts: Vec<String> = registry.all().iter().map(embedding_text).collect();
            match embeddings.embed(&texts) {
                Ok(vectors) if vectors.len() == texts.len() => {
                    tracing::info!(
                        "Embedded {} tools with provider {}",
                        vectors.len(),
                        embeddings.name()
                    );
                    index.embeddings = Some(vectors);
                }
                Ok(vectors) => {
                    tracing::warn!(
                        "Embedding provider returned {} vectors for {} tools, disabling embedding signal",
                        vectors.len(),
                        texts.len()
                    );
                }
                Err(e) => {
                    tracing::warn!("Tool embedding failed, disabling embedding signal: {}", e);
                }
            }
        }

        Self {
            registry,
            index,
            embeddings,
            embedding_circuit: CircuitBreaker::default(),
            weights: config.fusion.clone(),
            default_limit: config.default_limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Embedding signal usable right now.
    pub fn embeddings_available(&self) -> bool {
        self.index.embeddings.is_some()
            && self.embeddings.is_available()
            && !self.embedding_circuit.is_open()
    }

    pub fn search(&self, query: &str, opts: &SearchOptions) -> SearchOutcome {
        let mut outcome = SearchOutcome {
            mode: opts.mode,
            ..Default::default()
        };
        let limit = opts.limit.unwrap_or(self.default_limit).clamp(1, MAX_LIMIT);

        // unknown filters match nothing
        let category = match opts.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => match Category::parse(name) {
                Some(c) => Some(c),
                None => return outcome,
            },
            None => None,
        };
        let phase = match opts.phase.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => match Phase::parse(name) {
                Some(p) => Some(p),
                None => return outcome,
            },
            None => None,
        };

        let q = QueryTerms::parse(query);
        let regex_only = opts.mode == SearchMode::Regex;
        if (regex_only && q.raw.is_empty()) || (!regex_only && q.is_empty()) {
            return outcome;
        }

        // intent narrows to one scope per category
        let mut scopes: Vec<Option<Category>> = vec![category];
        if let Some(intent) = opts.intent.as_deref().filter(|s| !s.trim().is_empty()) {
            match tables::intent_categories(intent) {
                Some(cats) => {
                    let cats: Vec<Category> = cats
                        .iter()
                        .copied()
                        .filter(|c| category.map_or(true, |f| f == *c))
                        .collect();
                    outcome.intent_categories = cats.clone();
                    if cats.is_empty() {
                        return outcome;
                    }
                    scopes = cats.into_iter().map(Some).collect();
                }
                None => {
                    outcome
                        .warnings
                        .push(format!("Unknown intent '{}', searching all categories", intent));
                }
            }
        }

        let query_embedding = match opts.mode {
            SearchMode::Embedding | SearchMode::Hybrid => self.query_embedding(&q, &mut outcome),
            _ => None,
        };
        if opts.mode == SearchMode::Embedding && query_embedding.is_none() {
            outcome.degraded = true;
            if outcome.warnings.is_empty() {
                outcome.warnings.push("Embedding provider unavailable".to_string());
            }
            return outcome;
        }

        let pattern = match opts.mode {
            SearchMode::Regex => self.compile(&q.raw, &mut outcome),
            SearchMode::Hybrid if has_regex_syntax(&q.raw) => self.compile(&q.raw, &mut outcome),
            _ => None,
        };
        if opts.mode == SearchMode::Regex && pattern.is_none() {
            return outcome;
        }

        let mut merged: BTreeMap<usize, Fused> = BTreeMap::new();
        for scope in &scopes {
            let allowed: BTreeSet<usize> = self
                .registry
                .all()
                .iter()
                .enumerate()
                .filter(|(_, t)| scope.map_or(true, |c| t.category == c))
                .filter(|(_, t)| phase.map_or(true, |p| t.phase == p))
                .map(|(i, _)| i)
                .collect();
            if allowed.is_empty() {
                continue;
            }
            let fused = self.retrieve(
                &q,
                opts.mode,
                &allowed,
                query_embedding.as_deref(),
                pattern.as_ref(),
            );
            for (doc, f) in fused {
                match merged.get(&doc) {
                    Some(existing) if existing.composite >= f.composite => {}
                    _ => {
                        merged.insert(doc, f);
                    }
                }
            }
        }

        let max = merged.values().map(|f| f.composite).fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return outcome;
        }

        let preferred: Vec<Category> = scopes.iter().flatten().copied().collect();
        let tools = self.registry.all();
        let mut ranked: Vec<(usize, Fused)> = merged.into_iter().collect();
        ranked.sort_by(|(da, fa), (db, fb)| {
            let (ta, tb) = (&tools[*da], &tools[*db]);
            let pref = |t: &crate::registry::ToolDescriptor| {
                preferred.contains(&t.category) || phase == Some(t.phase)
            };
            fb.composite
                .total_cmp(&fa.composite)
                .then_with(|| pref(tb).cmp(&pref(ta)))
                .then_with(|| ta.name.len().cmp(&tb.name.len()))
                .then_with(|| ta.name.cmp(&tb.name))
        });
        ranked.truncate(limit);

        outcome.results = ranked
            .into_iter()
            .map(|(doc, f)| {
                let tool = &tools[doc];
                let breakdown = opts.explain.then(|| {
                    let mut parts: Vec<Contribution> = f
                        .contributions
                        .iter()
                        .map(|(signal, value)| Contribution {
                            signal: *signal,
                            score: value / max,
                        })
                        .collect();
                    parts.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.signal.cmp(&b.signal)));
                    parts
                });
                ScoredResult {
                    name: tool.name.clone(),
                    score: f.composite / max,
                    category: tool.category,
                    phase: tool.phase,
                    quick_ref: tool.quick_ref.clone(),
                    toolset: self.registry.toolset_of(&tool.name).cloned(),
                    loaded: false,
                    breakdown,
                }
            })
            .collect();

        tracing::debug!(
            query = %q.raw,
            mode = opts.mode.as_str(),
            results = outcome.results.len(),
            "search"
        );
        outcome
    }

    fn query_embedding(&self, q: &QueryTerms, outcome: &mut SearchOutcome) -> Option<Vec<f32>> {
        if self.index.embeddings.is_none() || !self.embeddings.is_available() {
            return None;
        }
        let texts = vec![q.raw.clone()];
        match self.embedding_circuit.call(|| self.embeddings.embed(&texts)) {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                tracing::warn!("Query embedding failed, continuing without: {}", e);
                outcome.degraded = true;
                outcome.warnings.push(format!("Embedding unavailable: {}", e));
                None
            }
        }
    }

    fn compile(&self, pattern: &str, outcome: &mut SearchOutcome) -> Option<regex::Regex> {
        match RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
        {
            Ok(re) => Some(re),
            Err(e) => {
                if outcome.mode == SearchMode::Regex {
                    outcome.warnings.push(format!("Invalid regex: {}", e));
                }
                None
            }
        }
    }

    /// Score one scope. Single modes keep the strategy's raw score; hybrid fuses.
    fn retrieve(
        &self,
        q: &QueryTerms,
        mode: SearchMode,
        allowed: &BTreeSet<usize>,
        query_embedding: Option<&[f32]>,
        pattern: Option<&regex::Regex>,
    ) -> BTreeMap<usize, Fused> {
        let index = &self.index;
        let single = |signal: Signal, scores: Scores| -> BTreeMap<usize, Fused> {
            scores
                .into_iter()
                .filter(|(doc, _)| allowed.contains(doc))
                .map(|(doc, score)| {
                    let mut f = Fused::default();
                    f.add(signal, score);
                    (doc, f)
                })
                .collect()
        };

        match mode {
            SearchMode::Exact => single(Signal::Keyword, strategies::exact(index, q)),
            SearchMode::Fuzzy => single(Signal::Fuzzy, strategies::fuzzy(index, q)),
            SearchMode::Prefix => single(Signal::Prefix, strategies::prefix(index, q)),
            SearchMode::Semantic => single(Signal::Semantic, strategies::semantic(index, q)),
            SearchMode::Dense => single(Signal::Dense, strategies::dense(index, q)),
            SearchMode::Regex => match pattern {
                Some(re) => single(Signal::Regex, strategies::regex(index, re)),
                None => BTreeMap::new(),
            },
            SearchMode::Embedding => match query_embedding {
                Some(v) => single(Signal::Embedding, strategies::embedding(index, v)),
                None => BTreeMap::new(),
            },
            SearchMode::Hybrid => self.hybrid(q, allowed, query_embedding, pattern),
        }
    }

    fn hybrid(
        &self,
        q: &QueryTerms,
        allowed: &BTreeSet<usize>,
        query_embedding: Option<&[f32]>,
        pattern: Option<&regex::Regex>,
    ) -> BTreeMap<usize, Fused> {
        let index = &self.index;
        let restrict = |mut scores: Scores| {
            scores.retain(|doc, _| allowed.contains(doc));
            scores
        };

        let mut rank_signals: Vec<(Signal, Scores)> = vec![
            (Signal::Keyword, strategies::keyword_plain(index, q)),
            (Signal::Fuzzy, strategies::fuzzy(index, q)),
            (Signal::Prefix, strategies::prefix(index, q)),
            (Signal::Semantic, strategies::semantic(index, q)),
            (Signal::Dense, strategies::dense(index, q)),
            (Signal::Bigram, strategies::bigram(index, q)),
            (Signal::Trigram, strategies::trigram(index, q)),
        ];
        if let Some(re) = pattern {
            rank_signals.push((Signal::Regex, strategies::regex(index, re)));
        }
        if let Some(v) = query_embedding {
            rank_signals.push((Signal::Embedding, strategies::embedding(index, v)));
        }

        let mut acc: BTreeMap<usize, Fused> = BTreeMap::new();
        for (signal, scores) in rank_signals {
            accumulate(&mut acc, signal, &restrict(scores), &self.weights);
        }

        // boosts only reinforce docs some rank signal already found
        let candidates: BTreeSet<usize> = acc.keys().copied().collect();
        let on_candidates = |mut scores: Scores| {
            scores.retain(|doc, _| candidates.contains(doc));
            scores
        };
        let boosts = [
            (Signal::NameMatch, strategies::name_match(index, q)),
            (Signal::TagMatch, strategies::tag_match(index, q)),
            (Signal::Affinity, strategies::affinity(&self.registry, q)),
        ];
        for (signal, scores) in boosts {
            accumulate(&mut acc, signal, &on_candidates(scores), &self.weights);
        }

        let leaders = self.leaders(&acc);
        accumulate(
            &mut acc,
            Signal::Cluster,
            &on_candidates(strategies::cluster(&self.registry, &leaders)),
            &self.weights,
        );
        // workflow may pull in a next step nothing else matched
        accumulate(
            &mut acc,
            Signal::Workflow,
            &restrict(strategies::workflow(&self.registry, &leaders)),
            &self.weights,
        );

        acc
    }

    /// Top preliminary docs, deterministic on ties.
    fn leaders(&self, acc: &BTreeMap<usize, Fused>) -> Vec<usize> {
        let tools = self.registry.all();
        let mut ordered: Vec<(usize, f64)> = acc.iter().map(|(&d, f)| (d, f.composite)).collect();
        ordered.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| tools[a.0].name.len().cmp(&tools[b.0].name.len()))
                .then_with(|| tools[a.0].name.cmp(&tools[b.0].name))
        });
        ordered.into_iter().take(LEADERS).map(|(d, _)| d).collect()
    }
}

fn has_regex_syntax(query: &str) -> bool {
    query
        .chars()
        .any(|c| matches!(c, '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'))
}
