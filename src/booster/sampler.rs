//! Row subsampling of the boosting rounds.
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::seq::index;

/// Draws the training rows of each round.
///
/// - `batch_size > 0` cycles through a shuffled partition
///   into mini-batches, one batch per round;
/// - otherwise, `fraction < 1` with `freq > 0` redraws
///   `⌈fraction · n⌉` rows every `freq` rounds;
/// - otherwise every row is used.
#[derive(Debug, Clone)]
pub struct RowSampler {
    n_sample: usize,
    fraction: f64,
    freq: usize,
    batch_size: usize,
    rng: StdRng,
    current: Vec<usize>,
    batches: Vec<Vec<usize>>,
    cursor: usize,
}

impl RowSampler {
    pub fn new(n_sample: usize, fraction: f64, freq: usize, batch_size: usize, seed: u64)
        -> Self
    {
        Self {
            n_sample,
            fraction,
            freq,
            batch_size,
            rng: StdRng::seed_from_u64(seed),
            current: (0..n_sample).collect(),
            batches: Vec::new(),
            cursor: 0,
        }
    }

    fn uses_batches(&self) -> bool {
        self.batch_size > 0 && self.batch_size < self.n_sample
    }

    fn uses_bagging(&self) -> bool {
        self.fraction < 1.0 && self.freq > 0
    }

    /// Rows used in round `iteration` (1-based), in increasing order.
    pub fn rows(&mut self, iteration: usize) -> &[usize] {
        if self.uses_batches() {
            if self.cursor == self.batches.len() {
                let mut perm = (0..self.n_sample).collect::<Vec<_>>();
                perm.shuffle(&mut self.rng);
                self.batches = perm.chunks(self.batch_size)
                    .map(|chunk| {
                        let mut batch = chunk.to_vec();
                        batch.sort_unstable();
                        batch
                    })
                    .collect();
                self.cursor = 0;
            }
            self.cursor += 1;
            return &self.batches[self.cursor - 1];
        }

        if self.uses_bagging() && (iteration - 1) % self.freq == 0 {
            let amount = subsample_size(self.n_sample, self.fraction);
            self.current = draw(&mut self.rng, self.n_sample, amount);
        }
        &self.current
    }
}

/// `⌈fraction · n⌉`, at least one row.
pub fn subsample_size(n_sample: usize, fraction: f64) -> usize {
    ((fraction * n_sample as f64).ceil() as usize).clamp(1, n_sample.max(1))
}

/// `amount` distinct rows out of `n_sample`, sorted.
pub fn draw(rng: &mut StdRng, n_sample: usize, amount: usize) -> Vec<usize> {
    let mut rows = index::sample(rng, n_sample, amount.min(n_sample)).into_vec();
    rows.sort_unstable();
    rows
}
