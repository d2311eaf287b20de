use std::cmp::Reverse;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use ordered_float::OrderedFloat;

use wordvec::{dot, normalize, Embeddings};

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "solve a - b = c - ? analogies over trained vectors", long_about = None)]
struct Options {
    /// Contains word projections in the BINARY FORMAT.
    #[arg(value_name = "FILE")]
    file_name: PathBuf,
}

fn main() {
    let options = Options::parse();

    let embeddings = Embeddings::load(&options.file_name).unwrap();

    let mut line = String::new();
    'outer: loop {
        print!("Enter three words (EXIT to break): ");
        let _ = std::io::stdout().flush();

        line.clear();
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

        if query.len() != 3 {
            println!(
                "{} words were entered.. three words are needed at the input to perform the calculation",
                query.len()
            );
            continue;
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");

        let mut vec = vec![0.0f32; embeddings.dim()];
        let a = &embeddings[query[0]];
        let b = &embeddings[query[1]];
        let c = &embeddings[query[2]];
        for i in 0..embeddings.dim() {
            vec[i] = b[i] - a[i] + c[i];
        }
        normalize(&mut vec);

        let mut best: Vec<(&str, f32)> = (0..embeddings.num_words())
            .filter(|c| !query.contains(c))
            .map(|c| (embeddings.word(c), dot(&vec, &embeddings[c])))
            .collect();
        best.sort_by_key(|&(_word, dist)| Reverse(OrderedFloat(dist)));
        for (word, dist) in best.iter().take(N) {
            println!("{word:>50}\t\t{dist:8.6}");
        }
    }
}
