// SPDX-License-Identifier: AGPL-3.0-only

//! Dense-layer parameter initialization.
//!
//! Weights and bias are drawn from `U(-1/√in, 1/√in)`, the usual default for
//! fully connected layers (Kaiming-uniform with `a = √5`).

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generator for layer initialization, seeded when `seed` is given.
pub fn init_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Fresh weights (`out × in`) and, if requested, a bias (`out`).
pub fn dense_uniform<R: Rng>(
    rng: &mut R,
    in_features: usize,
    out_features: usize,
    bias: bool,
) -> (Array2<f32>, Option<Array1<f32>>) {
    let bound = 1.0 / (in_features.max(1) as f32).sqrt();
    let weight = Array2::from_shape_fn((out_features, in_features), |_| {
        rng.gen_range(-bound..bound)
    });
    let bias = bias.then(|| Array1::from_shape_fn(out_features, |_| rng.gen_range(-bound..bound)));
    (weight, bias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_follow_fan_in() {
        let mut rng = init_rng(Some(42));
        let (w, b) = dense_uniform(&mut rng, 16, 8, true);
        assert_eq!(w.dim(), (8, 16));
        assert!(w.iter().all(|&x| x.abs() <= 0.25));
        let b = b.unwrap();
        assert_eq!(b.len(), 8);
        assert!(b.iter().all(|&x| x.abs() <= 0.25));
    }

    #[test]
    fn no_bias_when_disabled() {
        let mut rng = init_rng(Some(1));
        assert!(dense_uniform(&mut rng, 4, 3, false).1.is_none());
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = dense_uniform(&mut init_rng(Some(9)), 5, 5, true);
        let b = dense_uniform(&mut init_rng(Some(9)), 5, 5, true);
        assert_eq!(a, b);
    }
}
