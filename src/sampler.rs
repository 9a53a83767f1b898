use rand::{Rng, seq::SliceRandom};

/// Draw `k` distinct uuids uniformly from `[0, n)`.
///
/// Shuffles the full index permutation with `rng` and keeps the first `k`,
/// so a generator seeded the same way always yields the same draw. `k` is
/// clamped to `n`. The caller's positives are not excluded; overlap is
/// handled by sample weighting and by the final filter.
pub fn sample_negatives<R: Rng + ?Sized>(
    n: usize,
    k: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(rng);
    permutation.truncate(k.min(n));
    permutation
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn draws_k_distinct_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let sample = sample_negatives(100, 30, &mut rng);

        assert_eq!(sample.len(), 30);
        assert!(sample.iter().all(|&i| i < 100));
        let unique: HashSet<_> = sample.iter().collect();
        assert_eq!(unique.len(), 30);
    }

    #[test]
    fn same_seed_same_draw() {
        let a = sample_negatives(1000, 50, &mut StdRng::seed_from_u64(7));
        let b = sample_negatives(1000, 50, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn shared_generator_advances_between_draws() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = sample_negatives(1000, 50, &mut rng);
        let b = sample_negatives(1000, 50, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn k_is_clamped_to_n() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut sample = sample_negatives(5, 10, &mut rng);
        sample.sort_unstable();
        assert_eq!(sample, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn zero_k_is_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_negatives(5, 0, &mut rng).is_empty());
        assert!(sample_negatives(0, 3, &mut rng).is_empty());
    }
}
