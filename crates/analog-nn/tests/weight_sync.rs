// SPDX-License-Identifier: AGPL-3.0-only

//! Weight synchronization tests
//!
//! Exercise the write/read contract between a layer's logical weights and
//! its tile: exact and realistic round-trips, shadow consistency, scaling,
//! shape validation and the end-to-end dense computation.

use analog_nn::prelude::*;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};
use proptest::prelude::*;

fn layer(in_features: usize, out_features: usize, realistic: bool, omega: f32) -> AnalogLinear {
    let config = RpuConfig::default().with_seed(1234);
    AnalogLinear::new(in_features, out_features, true, &config, realistic, omega)
        .expect("layer construction")
}

fn max_abs(weights: &[f32], bias: Option<&Vec<f32>>) -> f32 {
    weights
        .iter()
        .chain(bias.into_iter().flatten())
        .fold(0.0f32, |m, w| m.max(w.abs()))
}

/// Exact writes read back unchanged
#[test]
fn test_non_realistic_round_trip() {
    let mut layer = layer(3, 2, false, 0.0);
    let w = array![[0.3f32, -0.7, 0.01], [0.0, 0.25, -0.125]];
    let b = array![0.9f32, -0.4];

    layer.set_weights(w.view(), Some(b.view())).expect("set_weights");
    let (rw, rb) = layer.get_weights().expect("read");

    assert_eq!(rw, w);
    assert_eq!(rb, Some(b));
}

/// Realistic writes do not reproduce their input
#[test]
fn test_realistic_read_diverges() {
    let mut layer = layer(3, 2, true, 0.0);
    let w = array![[0.3f32, -0.7, 0.01], [0.0, 0.25, -0.125]];
    let b = array![0.9f32, -0.4];

    layer.set_weights(w.view(), Some(b.view())).expect("set_weights");
    let (rw, rb) = layer.get_weights().expect("read");

    assert_ne!(rw, w);
    assert_ne!(rb, Some(b));
    // still close: noise is a perturbation, not a replacement
    for (a, e) in rw.iter().zip(w.iter()) {
        assert!((a - e).abs() < 0.2, "{a} too far from {e}");
    }
}

/// Two realistic reads draw independent noise
#[test]
fn test_realistic_reads_are_independent() {
    let mut layer = layer(4, 4, true, 0.0);
    let first = layer.get_weights().expect("read");
    let second = layer.get_weights().expect("read");
    assert_ne!(first.0, second.0);
}

/// The logical shadow equals the tile contents after any write
#[test]
fn test_shadow_matches_tile() {
    for realistic in [false, true] {
        let mut layer = layer(3, 2, realistic, 0.0);
        let w = array![[0.3f32, -0.7, 0.01], [0.0, 0.25, -0.125]];
        let b = array![0.9f32, -0.4];
        layer.set_weights(w.view(), Some(b.view())).expect("set_weights");

        let shadow = (layer.weight().clone(), layer.bias().cloned());
        let exact = layer.get_weights_exact().expect("exact read");
        assert_eq!(shadow, exact, "realistic={realistic}");
        if !realistic {
            assert_eq!(shadow, layer.get_weights().expect("read"));
        }
    }
}

/// Shadow after construction reflects the initialization written to the tile
#[test]
fn test_shadow_after_reset() {
    let mut layer = layer(5, 3, true, 0.0);
    layer.reset_parameters().expect("reset");
    let bound = 1.0 / 5.0f32.sqrt();
    assert!(layer.weight().iter().all(|w| w.abs() <= bound));
    assert_eq!(
        (layer.weight().clone(), layer.bias().cloned()),
        layer.get_weights_exact().expect("exact read")
    );
}

/// With omega > 0 the committed maximum equals omega
#[test]
fn test_scaling_hits_omega() {
    let mut layer = layer(3, 2, false, 0.8);
    let w = array![[0.3f32, -0.2, 0.1], [0.05, 0.4, -0.1]];
    let b = array![0.2f32, -0.1];
    layer.set_weights(w.view(), Some(b.view())).expect("set_weights");

    let tile = layer.analog_tile();
    let state = tile.state();
    assert_abs_diff_eq!(max_abs(&state.weights, None), 0.8, epsilon = 1e-6);
    assert_abs_diff_eq!(tile.out_scaling_alpha(), 0.5, epsilon = 1e-6);

    // logical view and forward are unchanged by the scaling
    let (rw, rb) = layer.get_weights().expect("read");
    for (a, e) in rw.iter().zip(w.iter()) {
        assert_abs_diff_eq!(a, e, epsilon = 1e-6);
    }
    for (a, e) in rb.expect("bias").iter().zip(b.iter()) {
        assert_abs_diff_eq!(a, e, epsilon = 1e-6);
    }
    layer.eval();
    let y = layer
        .forward(array![[1.0f32, 1.0, 1.0]].into_dyn().view())
        .expect("forward");
    assert_abs_diff_eq!(y[[0, 0]], 0.4, epsilon = 1e-5);
    assert_abs_diff_eq!(y[[0, 1]], 0.25, epsilon = 1e-5);
}

/// Realistic scaled writes land near omega
#[test]
fn test_scaling_realistic_is_approximate() {
    let mut layer = layer(4, 4, true, 0.6);
    let w = Array2::from_shape_fn((4, 4), |(i, j)| (i as f32 - j as f32) * 0.1);
    let b = Array1::from_elem(4, 0.05f32);
    layer.set_weights(w.view(), Some(b.view())).expect("set_weights");

    let state = layer.analog_tile().state();
    let max = max_abs(&state.weights, None);
    assert!((max - 0.6).abs() < 0.1, "max {max}");
}

/// Wrong shapes fail and leave the tile untouched
#[test]
fn test_shape_mismatch_leaves_tile_unchanged() {
    let mut layer = layer(3, 2, false, 0.0);
    let before = layer.analog_tile().state();
    let shadow = layer.weight().clone();

    let err = layer
        .set_weights(Array2::<f32>::zeros((3, 2)).view(), Some(Array1::<f32>::zeros(2).view()))
        .expect_err("transposed weights");
    assert!(err.is_shape());
    let err = layer
        .set_weights(Array2::<f32>::zeros((2, 3)).view(), Some(Array1::<f32>::zeros(3).view()))
        .expect_err("long bias");
    assert!(err.is_shape());
    let err = layer
        .set_weights(Array2::<f32>::zeros((2, 3)).view(), None)
        .expect_err("missing bias");
    assert!(err.is_shape());

    assert_eq!(layer.analog_tile().state(), before);
    assert_eq!(layer.weight(), &shadow);
}

/// 4→3 layer: exact weights, forward equals W·x + b
#[test]
fn test_end_to_end_dense() {
    let config = RpuConfig::default().with_seed(99);
    let mut layer = AnalogLinear::new(4, 3, true, &config, false, 0.0).expect("layer");
    let w = array![
        [0.1f32, -0.2, 0.3, -0.4],
        [0.5, 0.6, -0.7, 0.8],
        [-0.9, 0.05, 0.15, 0.25]
    ];
    let b = array![0.01f32, -0.02, 0.03];
    layer.set_weights(w.view(), Some(b.view())).expect("set_weights");

    let (rw, rb) = layer.get_weights().expect("read");
    assert_eq!(rw, w);
    assert_eq!(rb.as_ref(), Some(&b));

    let x = array![1.0f32, -2.0, 0.5, 3.0];
    let expected = w.dot(&x) + &b;
    let y = layer
        .forward(x.clone().insert_axis(ndarray::Axis(0)).into_dyn().view())
        .expect("forward");
    assert_eq!(y.shape(), &[1, 3]);
    for (i, e) in expected.iter().enumerate() {
        assert_abs_diff_eq!(y[[0, i]], *e, epsilon = 1e-5);
    }
}

/// Dense-layer fields are exposed unchanged
#[test]
fn test_layer_fields() {
    let layer = layer(6, 2, true, 0.5);
    assert_eq!(layer.in_features(), 6);
    assert_eq!(layer.out_features(), 2);
    assert!(layer.realistic_read_write());
    assert_abs_diff_eq!(layer.weight_scaling_omega(), 0.5);
    assert!(layer.has_bias());
}

/// A negative omega is a configuration error
#[test]
fn test_negative_omega_rejected() {
    let err = AnalogLinear::new(2, 2, true, &RpuConfig::default(), false, -0.5)
        .expect_err("negative omega");
    assert!(matches!(err, TileError::InvalidConfig { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_exact_round_trip(
        w in proptest::collection::vec(-1.0f32..1.0, 12),
        b in proptest::collection::vec(-1.0f32..1.0, 3),
    ) {
        let mut layer = layer(4, 3, false, 0.0);
        let w = Array2::from_shape_vec((3, 4), w).unwrap();
        let b = Array1::from_vec(b);
        layer.set_weights(w.view(), Some(b.view())).unwrap();
        let (rw, rb) = layer.get_weights().expect("read");
        prop_assert_eq!(rw, w);
        prop_assert_eq!(rb, Some(b));
    }

    #[test]
    fn prop_scaling_maps_max_to_omega(
        w in proptest::collection::vec(-2.0f32..2.0, 6),
        omega in 0.1f32..2.0,
    ) {
        prop_assume!(w.iter().any(|x| x.abs() > 1e-3));
        let mut layer = layer(3, 2, false, omega);
        let w = Array2::from_shape_vec((2, 3), w).unwrap();
        let b = Array1::<f32>::zeros(2);
        layer.set_weights(w.view(), Some(b.view())).unwrap();

        let state = layer.analog_tile().state();
        prop_assert!((max_abs(&state.weights, None) - omega).abs() <= 1e-5 * omega.max(1.0));

        let (rw, _) = layer.get_weights().expect("read");
        for (a, e) in rw.iter().zip(w.iter()) {
            prop_assert!((a - e).abs() <= 1e-5 * e.abs().max(1.0));
        }
    }

    #[test]
    fn prop_wrong_width_rejected(cols in 1usize..8) {
        prop_assume!(cols != 4);
        let mut layer = layer(4, 3, false, 0.0);
        let before = layer.analog_tile().state();
        let err = layer
            .set_weights(Array2::<f32>::zeros((3, cols)).view(), Some(Array1::<f32>::zeros(3).view()))
            .unwrap_err();
        prop_assert_eq!(err, TileError::shape("weight columns", 4, cols));
        prop_assert_eq!(layer.analog_tile().state(), before);
    }
}
