use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Generate the weight vector where each vertex has the same weight
pub fn gen_uniform_weights(no_of_vertices: usize) -> Vec<i64> {
    vec![1; no_of_vertices]
}

/// Generate the weight vector where each vertex has a random weight in
/// `[min_weight, max_weight]`
pub fn gen_random_weights(
    no_of_vertices: usize,
    min_weight: i64,
    max_weight: i64,
    seed: u64,
) -> Vec<i64> {
    if max_weight < min_weight {
        panic!("Max weight must be greater than min weight.");
    }

    if min_weight <= 0 {
        panic!("Max/min weight must be positive.");
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    (0..no_of_vertices)
        .map(|_| rng.gen_range(min_weight..=max_weight))
        .collect()
}
