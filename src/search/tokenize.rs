//! Query and document text normalization.

use std::collections::BTreeSet;

/// Words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "do", "for",
    "from", "get", "how", "i", "in", "into", "is", "it", "me", "my", "need", "of", "on", "one",
    "or", "our", "please", "some", "that", "the", "their", "this", "to", "tool", "tools", "us",
    "want", "we", "what", "which", "with", "you", "your",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lowercase words of `text`, split on anything that is not alphanumeric.
/// Underscores split too, so `send_email` yields `send`, `email`.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Content words: [`words`] minus stop words and single characters.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 1 && !is_stop_word(w))
        .collect()
}

/// Basic suffix stemming.
pub fn normalize_keyword(word: &str) -> String {
    let mut word = word.to_string();
    if word.ends_with("ing") && word.len() > 5 {
        word.truncate(word.len() - 3);
    } else if word.ends_with("ed") && word.len() > 4 {
        word.truncate(word.len() - 2);
    } else if word.ends_with('s') && !word.ends_with("ss") && word.len() > 3 {
        word.truncate(word.len() - 1);
    }
    word
}

pub fn stems(tokens: &[String]) -> Vec<String> {
    tokens.iter().map(|t| normalize_keyword(t)).collect()
}

/// Adjacent stem pairs, `"a b"`.
pub fn word_bigrams(stems: &[String]) -> Vec<String> {
    stems
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect()
}

/// Character trigrams of `text` padded with a space on each side.
pub fn char_trigrams(text: &str) -> BTreeSet<String> {
    let padded: Vec<char> = format!(" {} ", text.to_lowercase()).chars().collect();
    padded
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// Levenshtein edit distance
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut cur = vec![0; b_len + 1];

    for i in 1..=a_len {
        cur[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            cur[j] = (prev[j] + 1) // deletion
                .min(cur[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b_len]
}

/// Largest edit distance still counted as a typo for a token of `len` chars.
pub fn fuzzy_threshold(len: usize) -> usize {
    if len <= 5 {
        1
    } else {
        2
    }
}

/// Tokenized form of one query, computed once per search.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    pub raw: String,
    pub tokens: Vec<String>,
    pub stems: Vec<String>,
    pub bigrams: Vec<String>,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let tokens = tokenize(query);
        let stems = stems(&tokens);
        let bigrams = word_bigrams(&stems);
        Self {
            raw: query.trim().to_string(),
            tokens,
            stems,
            bigrams,
        }
    }

    /// Nothing left to match on after stop-word removal.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn test_tokenize_drops_stop_words() {
        assert_eq!(tokenize("Send an email to the team"), vec!["send", "email", "team"]);
        assert_eq!(tokenize("send_email"), vec!["send", "email"]);
        assert!(tokenize("the of and").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_normalize_keyword() {
        assert_eq!(normalize_keyword("testing"), "test");
        assert_eq!(normalize_keyword("captured"), "captur");
        assert_eq!(normalize_keyword("emails"), "email");
        assert_eq!(normalize_keyword("address"), "address");
        assert_eq!(normalize_keyword("gas"), "gas");
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("verificaton", "verification"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_trigrams_and_jaccard() {
        let a = char_trigrams("email");
        assert!(a.contains(" em"));
        assert!(a.contains("il "));
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
        assert_eq!(jaccard(&a, &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_query_terms() {
        let q = QueryTerms::parse("capturing responsive screenshots");
        assert_eq!(q.stems, vec!["captur", "responsive", "screenshot"]);
        assert_eq!(q.bigrams, vec!["captur responsive", "responsive screenshot"]);
        assert!(QueryTerms::parse("to the").is_empty());
    }
}
