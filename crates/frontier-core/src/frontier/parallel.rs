use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::sampler::{
    best_index, draw_into, validate_inputs, validate_sample_count, FrontierSample,
};
use crate::FrontierResult;

/// Draws per chunk. Fixed so output depends only on the seed, never on the
/// size of the thread pool.
pub const CHUNK_SIZE: usize = 1024;

/// Parallel counterpart of [`super::sample_frontier`]. The batch is split
/// into fixed-size chunks, each driven by its own `StdRng` derived from
/// `seed` and the chunk index; chunks are concatenated in index order.
pub fn sample_frontier_parallel(
    mean: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
    sample_count: usize,
    seed: u64,
) -> FrontierResult<FrontierSample> {
    validate_inputs(mean, covariance, risk_free_rate)?;
    validate_sample_count(sample_count)?;

    let n_chunks = sample_count.div_ceil(CHUNK_SIZE);
    let chunks: Vec<FrontierSample> = (0..n_chunks)
        .into_par_iter()
        .map(|c| {
            let count = CHUNK_SIZE.min(sample_count - c * CHUNK_SIZE);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, c));
            let mut chunk = FrontierSample {
                points: Vec::with_capacity(count),
                ..FrontierSample::default()
            };
            draw_into(mean, covariance, risk_free_rate, count, &mut rng, &mut chunk);
            chunk
        })
        .collect();

    let mut sample = FrontierSample {
        points: Vec::with_capacity(sample_count),
        ..FrontierSample::default()
    };
    for chunk in chunks {
        sample.points.extend(chunk.points);
        sample.skipped += chunk.skipped;
    }
    sample.best_index = best_index(&sample.points);

    tracing::debug!(
        requested = sample_count,
        chunks = n_chunks,
        kept = sample.points.len(),
        skipped = sample.skipped,
        threads = rayon::current_num_threads(),
        "frontier sampled in parallel"
    );
    Ok(sample)
}

/// SplitMix64 finaliser over seed and chunk index.
fn chunk_seed(seed: u64, chunk: usize) -> u64 {
    let mut z = seed.wrapping_add((chunk as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats() -> (Vec<f64>, Vec<Vec<f64>>) {
        (
            vec![0.0010, 0.0008, 0.0012],
            vec![
                vec![1e-4, 2e-5, 0.0],
                vec![2e-5, 1e-4, 1e-5],
                vec![0.0, 1e-5, 4e-5],
            ],
        )
    }

    #[test]
    fn test_parallel_deterministic_for_seed() {
        let (mean, cov) = stats();
        let a = sample_frontier_parallel(&mean, &cov, 0.01, 3000, 7).unwrap();
        let b = sample_frontier_parallel(&mean, &cov, 0.01, 3000, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3000);
    }

    #[test]
    fn test_parallel_independent_of_pool_size() {
        let (mean, cov) = stats();
        let wide = sample_frontier_parallel(&mean, &cov, 0.01, 2500, 11).unwrap();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let narrow = pool
            .install(|| sample_frontier_parallel(&mean, &cov, 0.01, 2500, 11))
            .unwrap();
        assert_eq!(wide, narrow);
    }

    #[test]
    fn test_parallel_zero_samples() {
        let (mean, cov) = stats();
        let s = sample_frontier_parallel(&mean, &cov, 0.01, 0, 1).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.best_index, None);
    }

    #[test]
    fn test_parallel_best_is_max() {
        let (mean, cov) = stats();
        let s = sample_frontier_parallel(&mean, &cov, 0.0, 2048, 3).unwrap();
        let best = s.best().unwrap();
        assert!(s.points.iter().all(|p| p.ratio <= best.ratio));
    }

    #[test]
    fn test_parallel_rejects_oversized_batch() {
        let (mean, cov) = stats();
        let err = sample_frontier_parallel(&mean, &cov, 0.0, usize::MAX, 1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Input);
    }

    #[test]
    fn test_chunk_seeds_differ() {
        assert_ne!(chunk_seed(42, 0), chunk_seed(42, 1));
        assert_ne!(chunk_seed(42, 0), chunk_seed(43, 0));
    }
}
