use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;

use crate::config::Config;
use crate::{real, Rng};

/// An f32 cell that many worker threads may read and write without locking.
/// Concurrent adds to the same cell can lose updates; that is the accepted
/// trade-off of asynchronous SGD, not a bug to fix with a mutex.
#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

/// The weight matrices, shared mutably across all training workers.
///
/// The input projection matrix always exists; each output matrix exists only
/// when its training method is selected.
pub struct Net {
    dim: usize,
    /// The learned word-vectors, one row per vocabulary word.
    input: AlignedBox<[Real]>,
    /// Hierarchical-softmax weights, one row per internal Huffman node.
    softmax: Option<AlignedBox<[Real]>>,
    /// Negative-sampling weights, one row per vocabulary word.
    negative: Option<AlignedBox<[Real]>>,
}

impl Net {
    /// Allocate and initialize the matrices: input rows uniform in
    /// `(-0.5, 0.5) / dim`, output rows zero.
    pub fn new(vocab_size: usize, config: &Config) -> Net {
        let dim = config.word_dim;

        let input: AlignedBox<[Real]> = AlignedBox::slice_from_default(128, vocab_size * dim)
            .expect("Memory allocation failed");
        // vocab_size - 1 internal nodes; keep one row for the degenerate
        // single-word tree so the allocation is never zero-sized.
        let softmax_rows = vocab_size.saturating_sub(1).max(1);
        let softmax = config.train_method.uses_softmax().then(|| {
            AlignedBox::slice_from_default(128, softmax_rows * dim)
                .expect("Memory allocation failed")
        });
        let negative = config.train_method.uses_negative().then(|| {
            AlignedBox::slice_from_default(128, vocab_size * dim)
                .expect("Memory allocation failed")
        });

        let mut rng = Rng(1);
        for cell in input.iter() {
            cell.set((rng.rand_real() - 0.5) / dim as real);
        }

        Net {
            dim,
            input,
            softmax,
            negative,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn input_row(&self, word: usize) -> &[Real] {
        &self.input[word * self.dim..][..self.dim]
    }

    pub fn input(&self) -> &[Real] {
        &self.input
    }

    pub fn softmax_matrix(&self) -> Option<&[Real]> {
        self.softmax.as_deref()
    }

    pub fn negative_matrix(&self) -> Option<&[Real]> {
        self.negative.as_deref()
    }

    /// Snapshot one input row as plain floats.
    pub fn input_row_values(&self, word: usize) -> Vec<real> {
        self.input_row(word).iter().map(Real::get).collect()
    }
}
