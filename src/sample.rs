use crate::vocab::Vocab;
use crate::{real, Rng};

/// Turn tokenized sentences into sequences of vocabulary indices, dropping
/// unknown tokens silently and subsampling frequent words stochastically.
/// Called once per epoch so every epoch sees fresh draws.
pub fn subsample(
    sentences: &[Vec<String>],
    vocab: &Vocab,
    threshold: real,
    rng: &mut Rng,
) -> Vec<Vec<usize>> {
    sentences
        .iter()
        .map(|sentence| subsample_sentence(sentence, vocab, threshold, rng))
        .collect()
}

fn subsample_sentence(
    sentence: &[String],
    vocab: &Vocab,
    threshold: real,
    rng: &mut Rng,
) -> Vec<usize> {
    let mut sampled = Vec::with_capacity(sentence.len());
    for text in sentence {
        let Some(word) = vocab.lookup(text) else {
            continue;
        };
        if threshold > 0.0 && vocab.word(word).sample_probability < rng.rand_real() {
            continue;
        }
        sampled.push(word);
    }
    sampled
}
