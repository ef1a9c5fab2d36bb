//! Deterministic per-worker random number generators.
//!
//! Every random draw of the augmenter comes from an explicit `Rng` passed by the caller.
//! When augmentation runs on several worker threads, each worker seeds its own generator
//! from the base seed, the epoch and its worker id so that runs are reproducible while
//! workers never share a stream.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seed formula: base_seed + (epoch << 32) + worker_id
pub fn worker_seed(base_seed: u64, epoch: usize, worker_id: usize) -> u64 {
    base_seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(worker_id as u64)
}

/// Returns a generator unique to `(base_seed, epoch, worker_id)`.
pub fn worker_rng(base_seed: u64, epoch: usize, worker_id: usize) -> StdRng {
    StdRng::seed_from_u64(worker_seed(base_seed, epoch, worker_id))
}
