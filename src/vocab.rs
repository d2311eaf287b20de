use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::{real, Rng};

/// One distinct vocabulary token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabWord {
    /// Dense index assigned after the descending-count sort.
    pub index: usize,
    pub text: String,
    /// Occurrences in the training corpus; immutable once the build is done.
    pub count: u64,
    /// Huffman path from the root to this word, 0 = left child.
    /// Empty unless hierarchical softmax is selected.
    pub codes: Vec<u8>,
    /// Internal-node displacements visited along the same path; always the
    /// same length as `codes`.
    pub points: Vec<u32>,
    /// Probability of keeping one occurrence of this word when subsampling.
    pub sample_probability: real,
}

/// The vocabulary: words in descending-count order plus a text lookup.
/// Built or loaded once; immutable for the duration of training.
pub struct Vocab {
    words: Vec<VocabWord>,
    index: HashMap<String, usize>,
}

impl Vocab {
    /// Count tokens across all sentences, discard those appearing fewer than
    /// `config.min_count` times, and finish the build (sort, indices,
    /// Huffman codes, subsampling probabilities).
    pub fn build(sentences: &[Vec<String>], config: &Config) -> Vocab {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for sentence in sentences {
            for word in sentence {
                *counts.entry(word.as_str()).or_insert(0) += 1;
            }
        }

        let entries = counts
            .into_iter()
            .filter(|&(_, count)| count >= config.min_count)
            .map(|(text, count)| (text.to_string(), count))
            .collect();
        Vocab::from_entries(entries, config)
    }

    /// Shared tail of the build and reload paths. Tie order after the sort
    /// is whatever the caller handed us; the sort is stable.
    fn from_entries(mut entries: Vec<(String, u64)>, config: &Config) -> Vocab {
        entries.sort_by_key(|&(_, count)| Reverse(count));

        let mut words: Vec<VocabWord> = entries
            .into_iter()
            .enumerate()
            .map(|(index, (text, count))| VocabWord {
                index,
                text,
                count,
                codes: Vec::new(),
                points: Vec::new(),
                sample_probability: 1.0,
            })
            .collect();

        if config.train_method.uses_softmax() {
            build_huffman_tree(&mut words);
        }
        precalc_sampling(&mut words, config.subsample_threshold);

        let index = words
            .iter()
            .map(|word| (word.text.clone(), word.index))
            .collect();
        Vocab { words, index }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[VocabWord] {
        &self.words
    }

    /// The word at a dense index. Panics if out of range.
    pub fn word(&self, index: usize) -> &VocabWord {
        &self.words[index]
    }

    /// Returns the index of a word, or None if it was filtered out or unseen.
    pub fn lookup(&self, text: &str) -> Option<usize> {
        self.index.get(text).copied()
    }

    pub fn get(&self, text: &str) -> Option<&VocabWord> {
        self.lookup(text).map(|i| &self.words[i])
    }

    /// Total corpus occurrences of all surviving words.
    pub fn total_words(&self) -> u64 {
        self.words.iter().map(|word| word.count).sum()
    }

    /// Write `index count text` lines in index order.
    pub fn save(&self, vocab_file: &Path) -> Result<()> {
        let mut fo = BufWriter::new(
            File::create(vocab_file).context("error creating vocab file for write")?,
        );
        for word in &self.words {
            writeln!(fo, "{} {} {}", word.index, word.count, word.text)
                .context("error writing vocab file")?;
        }
        Ok(())
    }

    /// Rebuild a vocabulary from a file written by [`Vocab::save`], without
    /// recounting the corpus. Codes, points and sampling probabilities are
    /// derived again from the stored counts.
    pub fn read(vocab_file: &Path, config: &Config) -> Result<Vocab> {
        let fin = BufReader::new(File::open(vocab_file).context("error opening vocabulary file")?);

        let mut entries = Vec::new();
        for (line_num, line) in fin.lines().enumerate() {
            let line = line.context("error reading vocabulary file")?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            ensure!(
                fields.len() == 3,
                "vocabulary file syntax error on line {}",
                line_num + 1
            );
            let count: u64 = fields[1].parse().with_context(|| {
                format!(
                    "error reading vocabulary file: unrecognized frequency number format on line {}",
                    line_num + 1
                )
            })?;
            entries.push((fields[2].to_string(), count));
        }
        Ok(Vocab::from_entries(entries, config))
    }
}

/// Build the binary Huffman tree over the word counts and store each leaf's
/// `codes`/`points` path. Frequent words get short codes.
///
/// Internal nodes live in an arena indexed `vocab_size + creation_order` and
/// are discarded once the paths are extracted.
fn build_huffman_tree(words: &mut [VocabWord]) {
    let vocab_size = words.len();
    if vocab_size == 0 {
        return;
    }

    // Children of internal nodes, indexed by creation order. Arena indices
    // below vocab_size are leaves.
    let mut children: Vec<(usize, usize)> = Vec::with_capacity(vocab_size - 1);

    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = words
        .iter()
        .enumerate()
        .map(|(i, word)| Reverse((word.count, i)))
        .collect();

    while heap.len() > 1 {
        let Reverse((left_count, left)) = heap.pop().unwrap();
        let Reverse((right_count, right)) = heap.pop().unwrap();
        let node = vocab_size + children.len();
        children.push((left, right));
        heap.push(Reverse((left_count + right_count, node)));
    }

    // Walk down from the root; 0 descends left, 1 right, and each step
    // records the parent's displacement before descending.
    let root = vocab_size + children.len() - 1;
    let mut stack: Vec<(usize, Vec<u8>, Vec<u32>)> = vec![(root, Vec::new(), Vec::new())];
    while let Some((node, codes, mut points)) = stack.pop() {
        if node < vocab_size {
            words[node].codes = codes;
            words[node].points = points;
        } else {
            let (left, right) = children[node - vocab_size];
            points.push((node - vocab_size) as u32);

            let mut codes_left = codes.clone();
            codes_left.push(0);
            let mut codes_right = codes;
            codes_right.push(1);

            stack.push((left, codes_left, points.clone()));
            stack.push((right, codes_right, points));
        }
    }
}

/// The subsampling keep-probability for each word:
/// `min(1, (sqrt(count / (t * total)) + 1) * (t * total) / count)`.
/// Rare words always survive; a non-positive threshold disables discarding.
fn precalc_sampling(words: &mut [VocabWord], threshold: real) {
    let total_words: u64 = words.iter().map(|word| word.count).sum();
    let threshold_count = threshold * total_words as real;

    for word in words {
        word.sample_probability = if threshold > 0.0 {
            let count = word.count as real;
            (((count / threshold_count).sqrt() + 1.0) * threshold_count / count).min(1.0)
        } else {
            1.0
        };
    }
}

/// A discrete sampler over vocabulary indices, slot density proportional to
/// `count^0.75` normalized. Built once, immutable.
pub struct UnigramTable(Vec<usize>);

impl UnigramTable {
    pub fn new(vocab: &Vocab, table_size: usize) -> Result<UnigramTable> {
        ensure!(
            !vocab.is_empty(),
            "cannot build a unigram table over an empty vocabulary"
        );

        let power: f64 = 0.75;
        let train_words_pow: f64 = vocab
            .words()
            .iter()
            .map(|word| (word.count as f64).powf(power))
            .sum();

        let vocab_size = vocab.len();
        let mut table = vec![0usize; table_size];
        let mut idx = 0;
        let mut d1 = (vocab.word(0).count as f64).powf(power) / train_words_pow;
        let mut scope = table_size as f64 * d1;
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = idx;
            // The cursor advances when the cumulative weight is exceeded;
            // the last word absorbs rounding leftovers.
            if i as f64 > scope && idx < vocab_size - 1 {
                idx += 1;
                d1 += (vocab.word(idx).count as f64).powf(power) / train_words_pow;
                scope = table_size as f64 * d1;
            }
        }
        Ok(UnigramTable(table))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Draw one vocabulary index.
    pub fn sample(&self, rng: &mut Rng) -> usize {
        self.0[(rng.rand_u64() >> 16) as usize % self.0.len()]
    }
}
