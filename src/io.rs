use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Index;
use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::net::{Net, Real};
use crate::vocab::{Vocab, VocabWord};
use crate::{normalize, real};

/// Write the learned word vectors, one row per vocabulary word in index
/// order.
///
/// The text form is `rows cols` on the first line, then `text` followed by
/// the components. The binary form is two little-endian u64 fields (rows,
/// cols) split by a space and closed by a newline, then per word: the token
/// bytes, a space, the raw f32 row, a newline.
pub fn save_embeddings(path: &Path, vocab: &Vocab, net: &Net, binary: bool) -> Result<()> {
    let mut fo = BufWriter::new(File::create(path).context("error creating output file")?);
    let dim = net.dim();

    if binary {
        fo.write_all(&(vocab.len() as u64).to_le_bytes())
            .context("error writing output file")?;
        fo.write_all(b" ").context("error writing output file")?;
        fo.write_all(&(dim as u64).to_le_bytes())
            .context("error writing output file")?;
        fo.write_all(b"\n").context("error writing output file")?;

        for word in vocab.words() {
            fo.write_all(word.text.as_bytes())
                .context("error writing output file")?;
            fo.write_all(b" ").context("error writing output file")?;
            let row: Vec<real> = net.input_row(word.index).iter().map(Real::get).collect();
            fo.write_all(bytemuck::cast_slice::<real, u8>(&row))
                .context("error writing output file")?;
            fo.write_all(b"\n").context("error writing output file")?;
        }
    } else {
        writeln!(fo, "{} {}", vocab.len(), dim).context("error writing output file")?;
        for word in vocab.words() {
            write!(fo, "{}", word.text).context("error writing output file")?;
            for cell in net.input_row(word.index) {
                write!(fo, " {}", cell.get()).context("error writing output file")?;
            }
            writeln!(fo).context("error writing output file")?;
        }
    }
    Ok(())
}

/// Load previously saved vectors into the input matrix. The load is
/// vocabulary-driven: rows for tokens absent from `vocab` are skipped
/// silently, and vocabulary words missing from the file keep their current
/// rows.
pub fn load_embeddings(path: &Path, vocab: &Vocab, net: &Net, binary: bool) -> Result<()> {
    if binary {
        load_embeddings_binary(path, vocab, net)
    } else {
        load_embeddings_text(path, vocab, net)
    }
}

fn load_embeddings_text(path: &Path, vocab: &Vocab, net: &Net) -> Result<()> {
    let fin = BufReader::new(File::open(path).context("error opening vectors file")?);
    let dim = net.dim();

    let mut lines = fin.lines();
    let header = lines
        .next()
        .ok_or_else(|| anyhow!("vectors file is empty"))?
        .context("error reading vectors file")?;
    let mut fields = header.split_whitespace();
    let _rows: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid vectors file header"))?
        .parse()
        .context("invalid vectors file header")?;
    let cols: usize = fields
        .next()
        .ok_or_else(|| anyhow!("invalid vectors file header"))?
        .parse()
        .context("invalid vectors file header")?;
    ensure!(
        cols == dim,
        "vectors file has {cols} dimensions, expected {dim}"
    );

    for line in lines {
        let line = line.context("error reading vectors file")?;
        let mut fields = line.split_whitespace();
        let Some(text) = fields.next() else {
            continue;
        };
        let Some(word) = vocab.lookup(text) else {
            continue;
        };
        for cell in net.input_row(word) {
            let value: real = fields
                .next()
                .ok_or_else(|| anyhow!("truncated vector row for {text:?}"))?
                .parse()
                .with_context(|| format!("bad vector component for {text:?}"))?;
            cell.set(value);
        }
    }
    Ok(())
}

fn load_embeddings_binary(path: &Path, vocab: &Vocab, net: &Net) -> Result<()> {
    let mut fin = BufReader::new(File::open(path).context("error opening vectors file")?);
    let dim = net.dim();

    let (_rows, cols) = read_binary_header(&mut fin)?;
    ensure!(
        cols == dim,
        "vectors file has {cols} dimensions, expected {dim}"
    );

    let mut row = vec![0.0 as real; cols];
    loop {
        let mut token = Vec::<u8>::new();
        let count = fin
            .read_until(b' ', &mut token)
            .context("error reading vectors file")?;
        if count == 0 {
            break;
        }
        if token.last() == Some(&b' ') {
            token.pop();
        }

        fin.read_exact(bytemuck::cast_slice_mut::<real, u8>(&mut row))
            .context("error reading vectors file")?;
        // Record terminator.
        let mut newline = [0u8; 1];
        fin.read_exact(&mut newline)
            .context("error reading vectors file")?;

        let text = String::from_utf8_lossy(&token);
        if let Some(word) = vocab.lookup(&text) {
            for (cell, &value) in net.input_row(word).iter().zip(&row) {
                cell.set(value);
            }
        }
    }
    Ok(())
}

fn read_binary_header(fin: &mut BufReader<File>) -> Result<(usize, usize)> {
    let mut field = [0u8; 8];
    let mut delim = [0u8; 1];
    fin.read_exact(&mut field)
        .context("error reading vectors file header")?;
    let rows = u64::from_le_bytes(field) as usize;
    fin.read_exact(&mut delim)
        .context("error reading vectors file header")?;
    fin.read_exact(&mut field)
        .context("error reading vectors file header")?;
    let cols = u64::from_le_bytes(field) as usize;
    fin.read_exact(&mut delim)
        .context("error reading vectors file header")?;
    Ok((rows, cols))
}

/// Word vectors loaded from a binary embedding file on their own, without a
/// vocabulary, for the query tools. Rows are normalized to unit length.
pub struct Embeddings {
    /// Embedding vector length (number of dimensions).
    dim: usize,
    vocab: Vec<String>,
    /// `data[k * dim..(k+1) * dim]` is the vector for word `k`.
    data: Vec<real>,
}

impl Index<usize> for Embeddings {
    type Output = [real];

    fn index(&self, i: usize) -> &[real] {
        &self.data[i * self.dim..][..self.dim]
    }
}

impl Embeddings {
    pub fn load(file_name: &Path) -> Result<Self> {
        let mut fin = BufReader::new(File::open(file_name).context("error opening input file")?);
        let (rows, dim) = read_binary_header(&mut fin)?;

        let mut vocab: Vec<String> = Vec::with_capacity(rows);
        let mut data = vec![0.0; rows * dim];
        for b in 0..rows {
            let mut token = Vec::<u8>::new();
            let count = fin
                .read_until(b' ', &mut token)
                .context("error reading input file")?;
            if count == 0 {
                break;
            }
            if token.last() == Some(&b' ') {
                token.pop();
            }
            vocab.push(String::from_utf8(token).context("invalid word in input file")?);

            let row = &mut data[b * dim..][..dim];
            fin.read_exact(bytemuck::cast_slice_mut::<real, u8>(row))
                .context("error reading input file")?;
            normalize(row);

            let mut newline = [0u8; 1];
            fin.read_exact(&mut newline)
                .context("error reading input file")?;
        }

        Ok(Embeddings { dim, vocab, data })
    }

    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Get the index for a word as string. Exact match only, case-sensitive.
    pub fn lookup_word(&self, word: &str) -> Option<usize> {
        self.vocab.iter().position(|v| v == word)
    }

    /// Get the word for a word-index. Panics if `word` is out of range.
    pub fn word(&self, word: usize) -> &str {
        &self.vocab[word]
    }
}

/// Everything needed to resume or inspect a training run, in bincode form.
#[derive(Serialize, Deserialize)]
pub struct Model {
    pub config: Config,
    pub vocab: Vec<VocabWord>,
    pub input: Vec<real>,
    pub softmax: Option<Vec<real>>,
    pub negative: Option<Vec<real>>,
}

impl Model {
    pub fn from_parts(config: &Config, vocab: &Vocab, net: &Net) -> Model {
        let snapshot = |m: &[Real]| m.iter().map(Real::get).collect::<Vec<real>>();
        Model {
            config: config.clone(),
            vocab: vocab.words().to_vec(),
            input: snapshot(net.input()),
            softmax: net.softmax_matrix().map(snapshot),
            negative: net.negative_matrix().map(snapshot),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let fo = BufWriter::new(File::create(path).context("error creating model file")?);
        bincode::serialize_into(fo, self).context("error writing model file")
    }

    pub fn load(path: &Path) -> Result<Model> {
        let fin = BufReader::new(
            File::open(path).with_context(|| format!("failed to open model file {path:?}"))?,
        );
        bincode::deserialize_from(fin)
            .with_context(|| format!("failed to load model from file {path:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, TrainMethod};
    use crate::norm;

    fn corpus() -> Vec<Vec<String>> {
        vec![
            vec!["the".into(), "cat".into(), "sat".into()],
            vec!["the".into(), "dog".into(), "ran".into()],
        ]
    }

    fn config() -> Config {
        Config {
            min_count: 1,
            word_dim: 6,
            table_size: 100,
            train_method: TrainMethod::NegativeSampling,
            model: ModelKind::SkipGram,
            ..Config::default()
        }
    }

    fn rows(vocab: &Vocab, net: &Net) -> Vec<Vec<real>> {
        (0..vocab.len()).map(|w| net.input_row_values(w)).collect()
    }

    #[test]
    fn binary_round_trip_is_bit_identical() {
        let config = config();
        let vocab = Vocab::build(&corpus(), &config);
        let net = Net::new(vocab.len(), &config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        save_embeddings(&path, &vocab, &net, true).unwrap();

        let fresh = Net::new(vocab.len(), &config);
        for cell in fresh.input() {
            cell.set(0.0);
        }
        load_embeddings(&path, &vocab, &fresh, true).unwrap();

        assert_eq!(rows(&vocab, &net), rows(&vocab, &fresh));
    }

    #[test]
    fn text_round_trip_recovers_rows() {
        let config = config();
        let vocab = Vocab::build(&corpus(), &config);
        let net = Net::new(vocab.len(), &config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        save_embeddings(&path, &vocab, &net, false).unwrap();

        let fresh = Net::new(vocab.len(), &config);
        for cell in fresh.input() {
            cell.set(0.0);
        }
        load_embeddings(&path, &vocab, &fresh, false).unwrap();

        for (a, b) in rows(&vocab, &net).iter().zip(rows(&vocab, &fresh)) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn loading_skips_tokens_missing_from_the_vocabulary() {
        let config = config();
        let full = Vocab::build(&corpus(), &config);
        let net = Net::new(full.len(), &config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        save_embeddings(&path, &full, &net, true).unwrap();

        // A vocabulary that only knows two of the saved words.
        let small = Vocab::build(
            &[vec!["cat".to_string(), "dog".to_string()]],
            &config,
        );
        let fresh = Net::new(small.len(), &config);
        load_embeddings(&path, &small, &fresh, true).unwrap();

        // Rows landed on the right words despite the skipped records.
        let cat_full = net.input_row_values(full.lookup("cat").unwrap());
        let cat_small = fresh.input_row_values(small.lookup("cat").unwrap());
        assert_eq!(cat_full, cat_small);
    }

    #[test]
    fn missing_vectors_file_is_an_error() {
        let config = config();
        let vocab = Vocab::build(&corpus(), &config);
        let net = Net::new(vocab.len(), &config);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        assert!(load_embeddings(&missing, &vocab, &net, true).is_err());
        assert!(load_embeddings(&missing, &vocab, &net, false).is_err());
    }

    #[test]
    fn embeddings_load_normalizes_rows() {
        let config = config();
        let vocab = Vocab::build(&corpus(), &config);
        let net = Net::new(vocab.len(), &config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        save_embeddings(&path, &vocab, &net, true).unwrap();

        let embeddings = Embeddings::load(&path).unwrap();
        assert_eq!(embeddings.num_words(), vocab.len());
        assert_eq!(embeddings.dim(), net.dim());
        for (i, word) in vocab.words().iter().enumerate() {
            assert_eq!(embeddings.word(i), word.text);
            assert_eq!(embeddings.lookup_word(&word.text), Some(i));
            assert!((norm(&embeddings[i]) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn model_round_trips_through_bincode() {
        let config = config();
        let vocab = Vocab::build(&corpus(), &config);
        let net = Net::new(vocab.len(), &config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        Model::from_parts(&config, &vocab, &net).save(&path).unwrap();

        let model = Model::load(&path).unwrap();
        assert_eq!(model.vocab.len(), vocab.len());
        for (a, b) in model.vocab.iter().zip(vocab.words()) {
            assert_eq!(a, b);
        }
        assert_eq!(model.input, net.input().iter().map(Real::get).collect::<Vec<_>>());
        assert!(model.softmax.is_none());
        assert_eq!(
            model.negative.as_ref().map(Vec::len),
            Some(vocab.len() * net.dim())
        );
    }
}
