use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use ordered_float::OrderedFloat;

use wordvec::{dot, normalize, Embeddings};

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "find the nearest words to a word or sentence", long_about = None)]
struct Options {
    /// Contains word projections in the BINARY FORMAT.
    #[arg(value_name = "FILE")]
    file_name: PathBuf,
}

fn main() {
    let options = Options::parse();

    let embeddings = Embeddings::load(&options.file_name).unwrap();

    'outer: loop {
        print!("Enter word or sentence (EXIT to break): ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                break;
            }
            Ok(0) => break,
            Ok(_) => {}
        }
        if line.trim() == "EXIT" {
            break;
        }

        let mut query: Vec<usize> = vec![];
        for word in line.split_whitespace() {
            println!();
            print!("Word: {word}  Position in vocabulary: ");
            match embeddings.lookup_word(word) {
                None => {
                    println!("None");
                    println!("Out of dictionary word!");
                    continue 'outer;
                }
                Some(i) => {
                    println!("{i}");
                    query.push(i);
                }
            }
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");

        let mut vec = vec![0.0f32; embeddings.dim()];
        for &i in &query {
            for (v, r) in vec.iter_mut().zip(embeddings[i].iter().copied()) {
                *v += r;
            }
        }
        normalize(&mut vec);

        let mut best: Vec<(&str, f32)> = (0..embeddings.num_words())
            .filter(|c| !query.contains(c))
            .map(|c| (embeddings.word(c), dot(&vec, &embeddings[c])))
            .collect();
        best.sort_by_key(|&(_word, dist)| OrderedFloat(-dist));
        for (word, dist) in best.iter().take(N) {
            println!("{word:50}\t\t{dist}");
        }
    }
}
