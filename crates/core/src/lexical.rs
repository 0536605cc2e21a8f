//! Lexical Vector (spec.md §4.4): a fixed-width, deterministic hashed
//! bag-of-terms used alongside the dense embedding for hybrid retrieval.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Compile-time dimensionality of the lexical vector.
pub const LEX_DIM: usize = 256;

/// Normalize a term: lowercase, strip leading/trailing non-alphanumerics.
fn normalize_term(term: &str) -> String {
    term.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

/// Split text into normalized terms, discarding empties.
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c.is_whitespace() || "(){}[]<>,;:\"'`".contains(c))
        .map(normalize_term)
        .filter(|t| !t.is_empty())
}

/// Hash a term deterministically into `[0, LEX_DIM)`. Uses
/// `DefaultHasher::new()` (fixed, un-randomized seed) rather than
/// `RandomState`, so the same text hashes to the same bucket across
/// processes and across runs — required by spec.md §4.4.
fn bucket(term: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    term.hash(&mut hasher);
    (hasher.finish() % LEX_DIM as u64) as usize
}

/// Build the lexical vector for a chunk of text: each term hashes into a
/// bucket and accumulates (term-frequency weighted), then the vector is
/// L2-normalized so it plays nicely with cosine scoring alongside the
/// dense embedding.
pub fn lexical_vector(text: &str) -> Vec<f32> {
    let mut buckets = vec![0f32; LEX_DIM];
    for term in terms(text) {
        buckets[bucket(&term)] += 1.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut buckets {
            *v /= norm;
        }
    }
    buckets
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` if
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let a = lexical_vector("the quick brown fox");
        let b = lexical_vector("the quick brown fox");
        assert_eq!(a, b);
    }

    #[test]
    fn has_fixed_dimension() {
        let v = lexical_vector("anything at all, really");
        assert_eq!(v.len(), LEX_DIM);
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let a = lexical_vector("fn parse_folder_config(path: &str) -> Config");
        let b = lexical_vector("fn parse_folder_config(root: &str) -> Config");
        let c = lexical_vector("completely unrelated banana smoothie recipe");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let v = lexical_vector("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
