use crate::error::Result;
use async_trait::async_trait;

/// Turns text into fixed-length vectors.
///
/// Providers are treated as unreliable collaborators: callers must handle
/// `Err` and degrade rather than assume availability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts; the output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    fn name(&self) -> &str {
        "embedder"
    }
}

/// Offline embedder based on feature hashing.
///
/// Identifier sub-tokens (`parseConfig` -> `parse`, `config`) and their
/// character trigrams are hashed into signed buckets, then the vector is
/// L2-normalised. Texts sharing vocabulary land close together, which is
/// enough for code search without a model download.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 384;

    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[must_use]
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = identifier_tokens(text);
        if tokens.is_empty() {
            return stub_embed(text, self.dimension);
        }

        let mut vec = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(&mut vec, token.as_bytes(), 1.0);
            if token.len() > 3 {
                let chars: Vec<char> = token.chars().collect();
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.accumulate(&mut vec, gram.as_bytes(), 0.25);
                }
            }
        }
        normalize(&mut vec);
        vec
    }

    fn accumulate(&self, vec: &mut [f32], bytes: &[u8], weight: f32) {
        let mut state = fnv1a_64(bytes);
        let bits = splitmix64(&mut state);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (bits % self.dimension as u64) as usize;
        let sign = if bits >> 63 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Split text into lower-cased identifier sub-tokens, breaking on
/// non-alphanumerics, snake_case and camelCase boundaries.
#[must_use]
pub fn identifier_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut prev_lower = false;
        for ch in word.chars() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Deterministic pseudo-random unit vector for text without identifiers
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_identifiers() {
        assert_eq!(
            identifier_tokens("fn parseConfig(user_id: u32)"),
            vec!["fn", "parse", "config", "user", "id", "u32"]
        );
        assert_eq!(identifier_tokens("HTTPServer"), vec!["httpserver"]);
        assert!(identifier_tokens("  ;; {} ").is_empty());
    }

    #[test]
    fn embeddings_are_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_one("load the user config");
        let b = embedder.embed_one("load the user config");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let punct = embedder.embed_one("{}();");
        let norm: f32 = punct.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("parse config file");
        let related = embedder.embed_one("fn parse_config(path: &Path) -> Config");
        let unrelated = embedder.embed_one("struct HttpRequestHandler { socket }");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn provider_returns_one_vector_per_text() {
        let embedder = HashingEmbedder::new(16);
        let out = embedder
            .embed(&["a b".to_string(), "c".to_string(), String::new()])
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.len() == 16));
    }
}
