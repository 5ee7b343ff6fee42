//! Seeded synthetic acceptability corpus.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Token sequences labelled acceptable (`1`) when a strict majority of
/// their tokens come from the lower half of the vocabulary.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticCorpus {
    sentences: Vec<Vec<usize>>,
    labels: Vec<usize>,
}

impl SyntheticCorpus {
    pub fn generate(size: usize, vocab_size: usize, max_len: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let vocab_size = vocab_size.max(2);
        let half = vocab_size / 2;

        let mut sentences = Vec::with_capacity(size);
        let mut labels = Vec::with_capacity(size);
        for _ in 0..size {
            let len = rng.gen_range(1..=max_len.max(1));
            let tokens: Vec<usize> = (0..len).map(|_| rng.gen_range(0..vocab_size)).collect();
            let low = tokens.iter().filter(|&&t| t < half).count();
            labels.push(usize::from(low * 2 > tokens.len()));
            sentences.push(tokens);
        }

        Self { sentences, labels }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Vec<usize>] {
        &self.sentences
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Consecutive `(sentences, labels)` batches; the last may be short.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = (&[Vec<usize>], &[usize])> + '_ {
        let batch_size = batch_size.max(1);
        self.sentences
            .chunks(batch_size)
            .zip(self.labels.chunks(batch_size))
    }
}
