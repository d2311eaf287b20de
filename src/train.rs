use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use anyhow::{ensure, Result};

use crate::config::{Config, ModelKind};
use crate::net::Net;
use crate::sample;
use crate::vocab::{UnigramTable, Vocab, VocabWord};
use crate::{real, sigmoid, Rng};

/// Drives the epochs: regenerates subsampled sentences, fans them out over
/// worker threads, and applies the configured windowing and output-layer
/// updates to the shared weight matrices.
///
/// The matrices are updated without per-row locking; two workers touching
/// the same row may lose each other's writes. The trained model is a
/// statistical result, not a bit-exact one.
pub struct Trainer<'a> {
    config: &'a Config,
    vocab: &'a Vocab,
    net: Net,
    table: Option<UnigramTable>,
    /// Raw corpus tokens processed so far, accumulated across all epochs.
    words_trained: AtomicU64,
    /// Raw corpus tokens per epoch.
    total_words: u64,
}

impl<'a> Trainer<'a> {
    /// Configuration errors are reported here, before any training starts.
    pub fn new(config: &'a Config, vocab: &'a Vocab, sentences: &[Vec<String>]) -> Result<Self> {
        config.validate()?;
        ensure!(
            !vocab.is_empty(),
            "vocabulary is empty after min-count filtering; nothing to train"
        );
        let total_words: u64 = sentences.iter().map(|s| s.len() as u64).sum();
        ensure!(total_words > 0, "training corpus is empty");

        let net = Net::new(vocab.len(), config);
        let table = config
            .train_method
            .uses_negative()
            .then(|| UnigramTable::new(vocab, config.table_size))
            .transpose()?;

        Ok(Trainer {
            config,
            vocab,
            net,
            table,
            words_trained: AtomicU64::new(0),
            total_words,
        })
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    /// Learning rate for a sentence starting after `processed` raw tokens.
    /// Decays linearly with overall progress and never drops below the
    /// configured floor. Reads of the shared counter race with worker
    /// increments by design, so per-sentence values are approximate.
    fn learning_rate(&self, processed: u64) -> real {
        let fraction =
            processed as f64 / (self.config.iterations as u64 * self.total_words) as f64;
        (self.config.init_alpha * (1.0 - fraction) as real).max(self.config.min_alpha)
    }

    pub fn train(&self, sentences: &[Vec<String>]) -> Result<()> {
        let num_threads = self.config.num_threads.max(1);

        for epoch in 0..self.config.iterations {
            // Fresh subsampling draws every epoch.
            let mut rng = Rng(epoch as u64);
            let samples =
                sample::subsample(sentences, self.vocab, self.config.subsample_threshold, &mut rng);

            // Pair each subsampled sequence with its raw token count; the
            // learning-rate counter advances by raw counts.
            let mut work: Vec<(Vec<usize>, u64)> = samples
                .into_iter()
                .zip(sentences.iter().map(|s| s.len() as u64))
                .collect();

            // Divvy the sentences up among the workers.
            let mut chunks: Vec<Vec<(Vec<usize>, u64)>> = (0..num_threads)
                .rev()
                .map(|i| {
                    let start = work.len() * i / num_threads;
                    work.split_off(start)
                })
                .collect();
            chunks.reverse();

            thread::scope(|s| {
                let this: &Trainer = self;
                let workers = chunks
                    .iter()
                    .enumerate()
                    .map(|(id, chunk)| s.spawn(move || this.train_worker(id, epoch, chunk)))
                    .collect::<Vec<_>>();
                for worker in workers {
                    worker.join().unwrap();
                }
            });
        }
        if self.config.debug_mode > 1 {
            println!();
        }
        Ok(())
    }

    fn train_worker(&self, id: usize, epoch: usize, sentences: &[(Vec<usize>, u64)]) {
        let mut rng = Rng((id + epoch * self.config.num_threads) as u64);

        for (i, (sentence, raw_len)) in sentences.iter().enumerate() {
            let processed = self.words_trained.load(Ordering::Relaxed);
            let alpha = self.learning_rate(processed);

            if self.config.debug_mode > 1 && i % 100 == 0 {
                print!(
                    "\rAlpha: {:.6}  Progress: {:.2}%  ",
                    alpha,
                    100.0 * processed as f64
                        / (self.config.iterations as u64 * self.total_words) as f64,
                );
                let _ = io::stdout().flush();
            }

            match self.config.model {
                ModelKind::Cbow => self.train_sentence_cbow(sentence, alpha, &mut rng),
                ModelKind::SkipGram => self.train_sentence_sg(sentence, alpha, &mut rng),
            }

            self.words_trained.fetch_add(*raw_len, Ordering::Relaxed);
        }
    }

    /// The randomized context around position `i`: the window shrinks by a
    /// fresh uniform draw in `[0, window)` on each use.
    fn window_bounds(&self, i: usize, len: usize, rng: &mut Rng) -> (usize, usize) {
        let reduced = rng.rand_u64() as usize % self.config.window;
        let begin = i.saturating_sub(self.config.window - reduced);
        let end = (i + self.config.window + 1 - reduced).min(len);
        (begin, end)
    }

    fn train_sentence_cbow(&self, sentence: &[usize], alpha: real, rng: &mut Rng) {
        let dim = self.net.dim();
        let mut projection: Vec<real> = vec![0.0; dim];
        let mut grad: Vec<real> = vec![0.0; dim];

        for i in 0..sentence.len() {
            let (begin, end) = self.window_bounds(i, sentence.len(), rng);
            let context_len = end - begin - 1;
            if context_len == 0 {
                continue;
            }

            // Distinct context words; a word repeated in the window
            // contributes its row once, but the mean still divides by the
            // number of window positions.
            let context: BTreeSet<usize> =
                (begin..end).filter(|&j| j != i).map(|j| sentence[j]).collect();

            projection.fill(0.0);
            grad.fill(0.0);
            for &word in &context {
                for (p, cell) in projection.iter_mut().zip(self.net.input_row(word)) {
                    *p += cell.get();
                }
            }
            if self.config.cbow_mean {
                for p in projection.iter_mut() {
                    *p /= context_len as real;
                }
            }

            self.apply_output_layer(sentence[i], &projection, &mut grad, alpha, rng);

            if self.config.cbow_mean {
                for g in grad.iter_mut() {
                    *g /= context_len as real;
                }
            }
            // The same gradient is broadcast to every context word.
            for &word in &context {
                for (cell, &g) in self.net.input_row(word).iter().zip(&grad) {
                    cell.add(g);
                }
            }
        }
    }

    fn train_sentence_sg(&self, sentence: &[usize], alpha: real, rng: &mut Rng) {
        let dim = self.net.dim();
        let mut projection: Vec<real> = vec![0.0; dim];
        let mut grad: Vec<real> = vec![0.0; dim];

        for i in 0..sentence.len() {
            let word = sentence[i];
            // The projection is a snapshot of this word's own row; updates
            // from the window below do not feed back into it.
            for (p, cell) in projection.iter_mut().zip(self.net.input_row(word)) {
                *p = cell.get();
            }
            grad.fill(0.0);

            let (begin, end) = self.window_bounds(i, sentence.len(), rng);
            for j in begin..end {
                if j == i {
                    continue;
                }
                self.apply_output_layer(sentence[j], &projection, &mut grad, alpha, rng);
            }

            for (cell, &g) in self.net.input_row(word).iter().zip(&grad) {
                cell.add(g);
            }
        }
    }

    /// Run the configured output-layer update(s) against `target`,
    /// accumulating into `grad` and updating the output rows in place.
    fn apply_output_layer(
        &self,
        target: usize,
        projection: &[real],
        grad: &mut [real],
        alpha: real,
        rng: &mut Rng,
    ) {
        if self.config.train_method.uses_softmax() {
            self.hierarchical_softmax(self.vocab.word(target), projection, grad, alpha);
        }
        if self.config.train_method.uses_negative() {
            self.negative_sampling(target, projection, grad, alpha, rng);
        }
    }

    /// One logistic decision per step of the target's Huffman path.
    fn hierarchical_softmax(
        &self,
        target: &VocabWord,
        projection: &[real],
        grad: &mut [real],
        alpha: real,
    ) {
        let dim = self.net.dim();
        let Some(matrix) = self.net.softmax_matrix() else {
            return;
        };

        for (&point, &code) in target.points.iter().zip(&target.codes) {
            let row = &matrix[point as usize * dim..][..dim];
            let f: real = row
                .iter()
                .zip(projection)
                .map(|(cell, &p)| cell.get() * p)
                .sum();
            let f = sigmoid(f);
            // 'g' is the gradient (d/df loss) multiplied by the learning rate
            let g = (1.0 - code as real - f) * alpha;
            // Propagate errors output -> hidden
            for (dst, cell) in grad.iter_mut().zip(row) {
                *dst += g * cell.get();
            }
            // Learn weights hidden -> output
            for (cell, &p) in row.iter().zip(projection) {
                cell.add(g * p);
            }
        }
    }

    /// Contrast the target against `negative` draws from the unigram table.
    /// Draws are deduplicated by index, and the true target is inserted
    /// last with label 1, so a colliding negative silently becomes the
    /// positive pair. That behavior is observable in trained output and is
    /// kept as is.
    fn negative_sampling(
        &self,
        target: usize,
        projection: &[real],
        grad: &mut [real],
        alpha: real,
        rng: &mut Rng,
    ) {
        let dim = self.net.dim();
        let (Some(matrix), Some(table)) = (self.net.negative_matrix(), self.table.as_ref()) else {
            return;
        };

        let mut targets: HashMap<usize, u8> = HashMap::with_capacity(self.config.negative + 1);
        for _ in 0..self.config.negative {
            targets.insert(table.sample(rng), 0);
        }
        targets.insert(target, 1);

        for (&word, &label) in &targets {
            let row = &matrix[word * dim..][..dim];
            let f: real = row
                .iter()
                .zip(projection)
                .map(|(cell, &p)| cell.get() * p)
                .sum();
            let f = sigmoid(f);
            let g = (label as real - f) * alpha;
            for (dst, cell) in grad.iter_mut().zip(row) {
                *dst += g * cell.get();
            }
            for (cell, &p) in row.iter().zip(projection) {
                cell.add(g * p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainMethod;

    fn sentences(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|s| s.iter().map(|w| w.to_string()).collect())
            .collect()
    }

    fn tiny_config(model: ModelKind, train_method: TrainMethod) -> Config {
        Config {
            iterations: 1,
            window: 1,
            min_count: 1,
            table_size: 1000,
            word_dim: 10,
            negative: 2,
            subsample_threshold: 0.0,
            cbow_mean: true,
            train_method,
            model,
            num_threads: 1,
            debug_mode: 0,
            ..Config::default()
        }
    }

    /// "a" and "b" alternate inside one window; "z" sits alone in its own
    /// sentence and never has a context.
    fn corpus() -> Vec<Vec<String>> {
        sentences(&[&["a", "b", "a", "b", "a", "b"], &["z"]])
    }

    fn assert_rows_changed(config: Config) {
        let corpus = corpus();
        let vocab = Vocab::build(&corpus, &config);
        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();

        let a = vocab.lookup("a").unwrap();
        let b = vocab.lookup("b").unwrap();
        let z = vocab.lookup("z").unwrap();
        let before_a = trainer.net().input_row_values(a);
        let before_b = trainer.net().input_row_values(b);
        let before_z = trainer.net().input_row_values(z);

        trainer.train(&corpus).unwrap();

        assert_ne!(trainer.net().input_row_values(a), before_a);
        assert_ne!(trainer.net().input_row_values(b), before_b);
        // A word that never appears inside any context window keeps its
        // initialized embedding, bit for bit.
        assert_eq!(trainer.net().input_row_values(z), before_z);
    }

    #[test]
    fn skipgram_negative_sampling_updates_windowed_rows_only() {
        assert_rows_changed(tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling));
    }

    #[test]
    fn skipgram_hierarchical_softmax_updates_windowed_rows_only() {
        assert_rows_changed(tiny_config(
            ModelKind::SkipGram,
            TrainMethod::HierarchicalSoftmax,
        ));
    }

    #[test]
    fn cbow_updates_windowed_rows_only() {
        assert_rows_changed(tiny_config(ModelKind::Cbow, TrainMethod::NegativeSampling));
    }

    #[test]
    fn both_methods_together_update_rows() {
        assert_rows_changed(tiny_config(ModelKind::SkipGram, TrainMethod::Both));
    }

    #[test]
    fn rejects_empty_vocabulary() {
        let corpus = sentences(&[&["the", "cat"], &["the", "dog"]]);
        let mut config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        config.min_count = 10;
        let vocab = Vocab::build(&corpus, &config);
        assert!(vocab.is_empty());
        assert!(Trainer::new(&config, &vocab, &corpus).is_err());
    }

    #[test]
    fn rejects_empty_corpus() {
        let corpus = corpus();
        let config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        let vocab = Vocab::build(&corpus, &config);
        assert!(Trainer::new(&config, &vocab, &[]).is_err());
    }

    #[test]
    fn single_word_vocabulary_trains_as_a_noop() {
        // With min_count 2 only "the" survives; no position ever has a
        // context word, so training leaves the embedding untouched.
        let corpus = sentences(&[&["the", "cat", "sat"], &["the", "dog", "ran"]]);
        let mut config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        config.min_count = 2;
        let vocab = Vocab::build(&corpus, &config);
        assert_eq!(vocab.len(), 1);

        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();
        let before = trainer.net().input_row_values(0);
        trainer.train(&corpus).unwrap();
        assert_eq!(trainer.net().input_row_values(0), before);

        // Same boundary under CBOW.
        config.model = ModelKind::Cbow;
        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();
        let before = trainer.net().input_row_values(0);
        trainer.train(&corpus).unwrap();
        assert_eq!(trainer.net().input_row_values(0), before);
    }

    #[test]
    fn learning_rate_decays_to_the_floor() {
        let corpus = corpus();
        let mut config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        config.iterations = 3;
        let vocab = Vocab::build(&corpus, &config);
        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();

        let total = 7 * 3; // raw tokens per epoch * iterations
        assert_eq!(trainer.learning_rate(0), config.init_alpha);
        assert!(trainer.learning_rate(total / 2) < config.init_alpha);
        assert!(trainer.learning_rate(total / 2) > trainer.learning_rate(total - 1));
        assert_eq!(trainer.learning_rate(total), config.min_alpha);
        // Counter races can overshoot the total; the rate still never
        // drops below the floor.
        assert_eq!(trainer.learning_rate(total * 10), config.min_alpha);
    }

    #[test]
    fn negative_collision_promotes_target_to_positive() {
        // A single-word vocabulary makes every table draw collide with the
        // target; the deduplicating map must leave only the positive label.
        let corpus = sentences(&[&["w", "w", "w"]]);
        let config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        let vocab = Vocab::build(&corpus, &config);
        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();

        let dim = trainer.net().dim();
        let projection = vec![1.0; dim];
        let mut grad = vec![0.0; dim];
        let alpha = 0.025;
        trainer.negative_sampling(0, &projection, &mut grad, alpha, &mut Rng(1));

        // One positive update from zero weights: g = (1 - 0.5) * alpha.
        let expected = 0.5 * alpha;
        let matrix = trainer.net().negative_matrix().unwrap();
        for cell in &matrix[..dim] {
            assert!((cell.get() - expected).abs() < 1e-6);
        }
        // The row started at zero, so nothing propagated into the gradient.
        assert!(grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn parallel_training_converges_on_all_threads() {
        // Smoke test for the scoped-thread fan-out: four workers, several
        // epochs, both sentences trained without panics and with updates
        // landing in the shared matrix.
        let corpus = sentences(&[
            &["a", "b", "c", "a", "b", "c"],
            &["b", "c", "a", "c", "b", "a"],
            &["c", "a", "b", "a", "c", "b"],
        ]);
        let mut config = tiny_config(ModelKind::SkipGram, TrainMethod::NegativeSampling);
        config.iterations = 3;
        config.num_threads = 4;
        let vocab = Vocab::build(&corpus, &config);
        let trainer = Trainer::new(&config, &vocab, &corpus).unwrap();

        let before: Vec<Vec<real>> = (0..vocab.len())
            .map(|w| trainer.net().input_row_values(w))
            .collect();
        trainer.train(&corpus).unwrap();
        let changed = (0..vocab.len())
            .filter(|&w| trainer.net().input_row_values(w) != before[w])
            .count();
        assert_eq!(changed, vocab.len());
        assert_eq!(
            trainer.words_trained.load(Ordering::Relaxed),
            3 * 18 // iterations * raw tokens
        );
    }
}
