use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use wordvec::io::{save_embeddings, Model};
use wordvec::{real, Config, ModelKind, TrainMethod, Trainer, Vocab};

#[derive(Parser)]
#[command(about = "WORD VECTOR estimation toolkit", long_about = None, version = "0.1")]
struct Options {
    /// Use text data from FILE to train the model; one sentence per line,
    /// tokens separated by whitespace
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors
    #[arg(long = "output", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Set size of word vectors; default is 100
    #[arg(long = "size", default_value_t = 100)]
    word_dim: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5)
    #[arg(long, default_value_t = 1e-3)]
    sample: real,

    /// Output layer: hierarchical softmax, negative sampling, or both
    #[arg(long = "train-method", value_enum, default_value_t = TrainMethod::NegativeSampling)]
    train_method: TrainMethod,

    /// Number of negative examples; default is 5, common values are 3 - 10
    #[arg(long, default_value_t = 5)]
    negative: usize,

    /// Number of slots in the unigram table negative examples are drawn from
    #[arg(long = "table-size", default_value_t = 100_000_000)]
    table_size: usize,

    /// Use N threads
    #[arg(long = "threads", value_name = "N", default_value_t = 12)]
    num_threads: usize,

    /// Run more training iterations
    #[arg(long, default_value_t = 5)]
    iter: usize,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Set the starting learning rate; default is 0.025 for skip-gram and 0.05 for CBOW
    #[arg(long)]
    alpha: Option<real>,

    /// The learning rate never decays below this floor
    #[arg(long = "min-alpha", default_value_t = 1e-4)]
    min_alpha: real,

    /// Use the continuous bag of words model (otherwise, use skip-gram model)
    #[arg(long)]
    cbow: bool,

    /// Average context vectors instead of summing them (CBOW only)
    #[arg(long = "cbow-mean")]
    cbow_mean: bool,

    /// Set the debug mode (default = 2 = more info during training)
    #[arg(long = "debug", default_value_t = 2)]
    debug_mode: usize,

    /// Save the resulting vectors in binary mode
    #[arg(long, group = "format")]
    binary: bool,

    /// Save the whole model in bincode format
    #[arg(long, group = "format")]
    bincode: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,
}

impl Options {
    fn to_config(&self) -> Config {
        Config {
            iterations: self.iter,
            window: self.window,
            min_count: self.min_count,
            table_size: self.table_size,
            word_dim: self.word_dim,
            negative: self.negative,
            subsample_threshold: self.sample,
            init_alpha: self.alpha.unwrap_or(if self.cbow { 0.05 } else { 0.025 }),
            min_alpha: self.min_alpha,
            cbow_mean: self.cbow_mean,
            train_method: self.train_method,
            model: if self.cbow {
                ModelKind::Cbow
            } else {
                ModelKind::SkipGram
            },
            num_threads: self.num_threads,
            debug_mode: self.debug_mode,
        }
    }
}

/// One sentence per line, tokens split on whitespace.
fn read_corpus(path: &Path) -> Result<Vec<Vec<String>>> {
    let fin = BufReader::new(File::open(path).context("error opening training data file")?);
    let mut sentences = Vec::new();
    for line in fin.lines() {
        let line = line.context("error reading training data file")?;
        sentences.push(line.split_whitespace().map(str::to_string).collect());
    }
    Ok(sentences)
}

fn run(options: Options) -> Result<()> {
    let config = options.to_config();
    config.validate()?;

    let sentences = read_corpus(&options.train_file)?;
    let vocab = match &options.read_vocab_file {
        Some(f) => Vocab::read(f, &config)?,
        None => Vocab::build(&sentences, &config),
    };
    if config.debug_mode > 0 {
        println!("Vocab size: {}", vocab.len());
        println!("Words in train file: {}", vocab.total_words());
    }
    if let Some(f) = &options.save_vocab_file {
        vocab.save(f)?;
    }

    let Some(output_file) = &options.output_file else {
        return Ok(());
    };

    let trainer = Trainer::new(&config, &vocab, &sentences)?;
    println!(
        "Starting training using file {}",
        options.train_file.display()
    );
    trainer.train(&sentences)?;

    if options.bincode {
        Model::from_parts(&config, &vocab, trainer.net()).save(output_file)?;
    } else {
        save_embeddings(output_file, &vocab, trainer.net(), options.binary)?;
    }
    Ok(())
}

fn main() {
    let options = Options::parse();

    if let Err(err) = run(options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
