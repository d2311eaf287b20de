pub mod config;
pub mod io;
pub mod net;
pub mod sample;
pub mod train;
pub mod vocab;

pub use config::{Config, ModelKind, TrainMethod};
pub use io::{Embeddings, Model};
pub use net::{Net, Real};
pub use train::Trainer;
pub use vocab::{UnigramTable, Vocab, VocabWord};

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

/// The linear-congruential generator used for all training randomness:
/// window jitter, subsampling draws, negative-table draws, and weight
/// initialization. Each worker thread owns one, seeded from its id.
pub struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}

pub fn sigmoid(x: real) -> real {
    1.0 / (1.0 + (-x).exp())
}

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    for e in v {
        *e /= len;
    }
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}
