use anyhow::{ensure, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::real;

/// Output-layer strategy, chosen once at configuration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum TrainMethod {
    /// Logistic decisions along a Huffman-coded vocabulary tree.
    #[value(name = "hs")]
    HierarchicalSoftmax,
    /// Contrast the target against draws from the unigram table.
    #[value(name = "ns")]
    NegativeSampling,
    /// Run both updates for every target.
    #[value(name = "both")]
    Both,
}

impl TrainMethod {
    pub fn uses_softmax(self) -> bool {
        matches!(self, TrainMethod::HierarchicalSoftmax | TrainMethod::Both)
    }

    pub fn uses_negative(self) -> bool {
        matches!(self, TrainMethod::NegativeSampling | TrainMethod::Both)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ModelKind {
    #[value(name = "cbow")]
    Cbow,
    #[value(name = "sg")]
    SkipGram,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of training epochs over the whole corpus.
    pub iterations: usize,
    /// Context half-window size.
    pub window: usize,
    /// Words that appear fewer than this many times are discarded.
    pub min_count: u64,
    /// Number of slots in the negative-sampling unigram table.
    pub table_size: usize,
    /// Embedding vector length (number of dimensions).
    pub word_dim: usize,
    /// Number of negative examples drawn per target word.
    pub negative: usize,
    /// Subsampling threshold; 0 disables frequent-word downsampling.
    pub subsample_threshold: real,
    /// Starting learning rate.
    pub init_alpha: real,
    /// Learning-rate floor.
    pub min_alpha: real,
    /// Average context vectors instead of summing them (CBOW only).
    pub cbow_mean: bool,
    pub train_method: TrainMethod,
    pub model: ModelKind,
    pub num_threads: usize,
    /// 0 = quiet, 1 = summary lines, 2 = per-sentence progress.
    pub debug_mode: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            iterations: 5,
            window: 5,
            min_count: 5,
            table_size: 100_000_000,
            word_dim: 100,
            negative: 5,
            subsample_threshold: 1e-3,
            init_alpha: 0.025,
            min_alpha: 1e-4,
            cbow_mean: false,
            train_method: TrainMethod::NegativeSampling,
            model: ModelKind::SkipGram,
            num_threads: 12,
            debug_mode: 2,
        }
    }
}

impl Config {
    /// Check the hyperparameters before any training work starts.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.iterations > 0, "iterations must be at least 1");
        ensure!(self.window > 0, "window must be at least 1");
        ensure!(self.word_dim > 0, "embedding dimension must be at least 1");
        ensure!(
            self.init_alpha > 0.0,
            "initial learning rate must be positive"
        );
        ensure!(
            self.min_alpha >= 0.0 && self.min_alpha <= self.init_alpha,
            "learning-rate floor must be in 0..=initial learning rate"
        );
        if self.train_method.uses_negative() {
            ensure!(
                self.negative > 0,
                "negative sampling requires at least one negative example"
            );
            ensure!(
                self.table_size > 0,
                "negative sampling requires a non-empty unigram table"
            );
        }
        Ok(())
    }
}
