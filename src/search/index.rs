//! Derived retrieval index over an immutable [`Registry`].
//!
//! Built once when the engine is constructed. Document ids are registry
//! positions, so a result can always be mapped back to its descriptor.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::tokenize::{char_trigrams, normalize_keyword, tokenize, word_bigrams};
use crate::registry::{Registry, ToolDescriptor};

/// Field weights for the inverted index.
pub const NAME_WEIGHT: f64 = 3.0;
pub const TAG_WEIGHT: f64 = 2.0;
pub const DESC_WEIGHT: f64 = 1.0;

/// Per-document text features.
#[derive(Debug, Clone)]
pub struct DocFeatures {
    pub name_lc: String,
    pub desc_lc: String,
    /// Name split on `_`, in order.
    pub name_segments: Vec<String>,
    /// Stems of every tag word.
    pub tag_stems: BTreeSet<String>,
    /// Tags as written, lowercased (multi-word tags kept whole).
    pub tags_lc: Vec<String>,
    /// Trigrams of the name with `_` replaced by spaces.
    pub name_trigrams: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, usize>,
    /// Docs having a name segment that passes through this node.
    docs: BTreeSet<usize>,
}

/// Prefix trie over name segments.
#[derive(Debug)]
pub struct PrefixTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl PrefixTrie {
    pub fn insert(&mut self, word: &str, doc: usize) {
        let mut cur = 0;
        for ch in word.chars() {
            cur = match self.nodes[cur].children.get(&ch) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[cur].children.insert(ch, next);
                    next
                }
            };
            self.nodes[cur].docs.insert(doc);
        }
    }

    /// Docs with a name segment starting with `prefix`.
    pub fn lookup(&self, prefix: &str) -> Option<&BTreeSet<usize>> {
        if prefix.is_empty() {
            return None;
        }
        let mut cur = 0;
        for ch in prefix.chars() {
            cur = *self.nodes[cur].children.get(&ch)?;
        }
        Some(&self.nodes[cur].docs)
    }
}

/// Sparse TF-IDF vector keyed by term id.
#[derive(Debug, Clone, Default)]
pub struct SparseVector {
    pub weights: BTreeMap<usize, f64>,
    pub norm: f64,
}

impl SparseVector {
    fn from_weights(weights: BTreeMap<usize, f64>) -> Self {
        let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
        Self { weights, norm }
    }

    pub fn cosine(&self, other: &SparseVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.weights.len() <= other.weights.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .weights
            .iter()
            .filter_map(|(term, w)| large.weights.get(term).map(|o| w * o))
            .sum();
        dot / (self.norm * other.norm)
    }
}

#[derive(Debug)]
pub struct RegistryIndex {
    pub docs: Vec<DocFeatures>,
    /// stem -> (doc, best field weight)
    pub inverted: HashMap<String, Vec<(usize, f64)>>,
    /// raw word -> (doc, best field weight); fuzzy matching vocabulary
    pub vocabulary: BTreeMap<String, Vec<(usize, f64)>>,
    /// stem bigram -> docs
    pub bigrams: HashMap<String, BTreeSet<usize>>,
    pub trie: PrefixTrie,
    term_ids: HashMap<String, usize>,
    idf: Vec<f64>,
    pub tfidf: Vec<SparseVector>,
    /// Dense vectors, one per doc, when an embedding provider produced them.
    pub embeddings: Option<Vec<Vec<f32>>>,
}

/// Text fed to the embedding provider for one tool.
pub fn embedding_text(tool: &ToolDescriptor) -> String {
    let tags: Vec<&str> = tool.tags.iter().map(|t| t.as_str()).collect();
    format!(
        "{}: {} ({})",
        tool.name.replace('_', " "),
        tool.description,
        tags.join(", ")
    )
}

impl RegistryIndex {
    pub fn build(registry: &Registry) -> Self {
        let n = registry.len();
        let mut docs = Vec::with_capacity(n);
        let mut inverted: HashMap<String, Vec<(usize, f64)>> = HashMap::new();
        let mut vocabulary: BTreeMap<String, Vec<(usize, f64)>> = BTreeMap::new();
        let mut bigrams: HashMap<String, BTreeSet<usize>> = HashMap::new();
        let mut trie = PrefixTrie::default();
        let mut term_ids: HashMap<String, usize> = HashMap::new();
        let mut doc_tf: Vec<BTreeMap<usize, f64>> = Vec::with_capacity(n);
        let mut df: Vec<usize> = Vec::new();

        for (doc, tool) in registry.all().iter().enumerate() {
            let name_words = tokenize(&tool.name);
            let desc_words = tokenize(&tool.description);
            let tag_words: Vec<String> = tool.tags.iter().flat_map(|t| tokenize(t)).collect();

            // best field weight per stem and per raw word
            let mut stem_weight: BTreeMap<String, f64> = BTreeMap::new();
            let mut word_weight: BTreeMap<String, f64> = BTreeMap::new();
            for (words, weight) in [
                (&name_words, NAME_WEIGHT),
                (&tag_words, TAG_WEIGHT),
                (&desc_words, DESC_WEIGHT),
            ] {
                for w in words {
                    let stem = normalize_keyword(w);
                    let e = stem_weight.entry(stem).or_insert(0.0);
                    *e = e.max(weight);
                    let e = word_weight.entry(w.clone()).or_insert(0.0);
                    *e = e.max(weight);
                }
            }
            for (stem, weight) in &stem_weight {
                inverted.entry(stem.clone()).or_default().push((doc, *weight));
            }
            for (word, weight) in word_weight {
                vocabulary.entry(word).or_default().push((doc, weight));
            }

            // bigrams within each field, never across field boundaries
            for words in [&name_words, &desc_words] {
                let field_stems: Vec<String> = words.iter().map(|w| normalize_keyword(w)).collect();
                for bigram in word_bigrams(&field_stems) {
                    bigrams.entry(bigram).or_default().insert(doc);
                }
            }
            for tag in &tool.tags {
                let tag_stems: Vec<String> = tokenize(tag).iter().map(|w| normalize_keyword(w)).collect();
                for bigram in word_bigrams(&tag_stems) {
                    bigrams.entry(bigram).or_default().insert(doc);
                }
            }

            let name_segments: Vec<String> = tool
                .name
                .to_lowercase()
                .split('_')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            for segment in &name_segments {
                trie.insert(segment, doc);
            }

            // term frequencies, name words counted double
            let mut tf: BTreeMap<usize, f64> = BTreeMap::new();
            let counted = name_words
                .iter()
                .chain(name_words.iter())
                .chain(tag_words.iter())
                .chain(desc_words.iter());
            for w in counted {
                let stem = normalize_keyword(w);
                let next_id = term_ids.len();
                let id = *term_ids.entry(stem).or_insert(next_id);
                if id == df.len() {
                    df.push(0);
                }
                *tf.entry(id).or_insert(0.0) += 1.0;
            }
            for id in tf.keys() {
                df[*id] += 1;
            }
            doc_tf.push(tf);

            docs.push(DocFeatures {
                name_lc: tool.name.to_lowercase(),
                desc_lc: tool.description.to_lowercase(),
                name_segments,
                tag_stems: tag_words.iter().map(|w| normalize_keyword(w)).collect(),
                tags_lc: tool.tags.iter().map(|t| t.to_lowercase()).collect(),
                name_trigrams: char_trigrams(&tool.name.replace('_', " ")),
            });
        }

        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((n as f64 + 1.0) / (d as f64 + 1.0)).ln() + 1.0)
            .collect();
        let tfidf = doc_tf
            .into_iter()
            .map(|tf| {
                let weights = tf
                    .into_iter()
                    .map(|(id, count)| (id, (1.0 + f64::ln(count)) * idf[id]))
                    .collect();
                SparseVector::from_weights(weights)
            })
            .collect();

        Self {
            docs,
            inverted,
            vocabulary,
            bigrams,
            trie,
            term_ids,
            idf,
            tfidf,
            embeddings: None,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Inverse document frequency of a stem; unknown stems get the maximum.
    pub fn idf(&self, stem: &str) -> f64 {
        match self.term_ids.get(stem) {
            Some(&id) => self.idf[id],
            None => ((self.docs.len() as f64 + 1.0).ln()) + 1.0,
        }
    }

    /// TF-IDF vector for query stems. Stems outside the vocabulary are dropped.
    pub fn query_vector(&self, stems: &[String]) -> SparseVector {
        let mut tf: BTreeMap<usize, f64> = BTreeMap::new();
        for stem in stems {
            if let Some(&id) = self.term_ids.get(stem) {
                *tf.entry(id).or_insert(0.0) += 1.0;
            }
        }
        let weights = tf
            .into_iter()
            .map(|(id, count)| (id, (1.0 + f64::ln(count)) * self.idf[id]))
            .collect();
        SparseVector::from_weights(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog;

    #[test]
    fn test_trie_prefix_lookup() {
        let mut trie = PrefixTrie::default();
        trie.insert("verification", 0);
        trie.insert("verify", 1);
        trie.insert("email", 2);
        assert_eq!(trie.lookup("veri").unwrap().len(), 2);
        assert_eq!(trie.lookup("verific").unwrap().iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(trie.lookup("x").is_none());
        assert!(trie.lookup("").is_none());
    }

    #[test]
    fn test_index_covers_catalog() {
        let reg = catalog::builtin().unwrap();
        let index = RegistryIndex::build(&reg);
        assert_eq!(index.len(), reg.len());

        let send = reg.position("send_email").unwrap();
        let postings = &index.inverted["email"];
        assert!(postings.contains(&(send, NAME_WEIGHT)));
        assert!(index.bigrams["send email"].contains(&send));
        assert!(index.trie.lookup("sen").unwrap().contains(&send));
        assert!(index.vocabulary.contains_key("inbox"));
    }

    #[test]
    fn test_tfidf_cosine_prefers_matching_doc() {
        let reg = catalog::builtin().unwrap();
        let index = RegistryIndex::build(&reg);
        let q = index.query_vector(&["email".to_string(), "send".to_string()]);
        let send = reg.position("send_email").unwrap();
        let fetch = reg.position("fetch_url").unwrap();
        assert!(q.cosine(&index.tfidf[send]) > q.cosine(&index.tfidf[fetch]));
        assert_eq!(index.query_vector(&["zzzz".to_string()]).norm, 0.0);
    }
}
