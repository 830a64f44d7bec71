// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ShardNet — Licensed under AGPL-3.0-or-later.

//! End-to-end behavior of the layer chain and the gradient reduce.

use approx::assert_relative_eq;
use sn_nn::layer::Layer;
use sn_nn::{
    Accumulator, Activation, Convolution, Dataset, FullyConnected, MaxPooling, Network, Sample,
    TrainConfig, Weight,
};
use sn_tensor::{correlate_valid, InitScheme, Matrix, Tensor, WeightInit};

fn known_input() -> Tensor {
    Tensor::from_vec(
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        &[3, 3],
    )
    .unwrap()
}

#[test]
fn convolution_forward_and_backward_on_known_values() {
    // One 2x2 all-one filter, zero bias, identity activation.
    let mut layer = Convolution::new(2, 2, 1)
        .with_activation(Activation::Identity)
        .with_init(WeightInit::new(InitScheme::Ones));
    let out_shape = layer.init_weights([3, 3, 1]).unwrap();
    assert_eq!(out_shape, [2, 2, 1]);

    let input = known_input();
    let output = layer.forward(&input).unwrap();
    for r in 0..2 {
        for c in 0..2 {
            let window = input.slice(0, 0).get(r, c)
                + input.slice(0, 0).get(r + 1, c)
                + input.slice(0, 0).get(r, c + 1)
                + input.slice(0, 0).get(r + 1, c + 1);
            assert_relative_eq!(output.slice(0, 0).get(r, c), window);
        }
    }

    let upstream = Tensor::ones(&[1, 1, 2, 2]).unwrap();
    layer.set_delta(&upstream).unwrap();
    let gradient = layer.gradient().unwrap().unwrap();
    let expected = correlate_valid(input.slice(0, 0), upstream.slice(0, 0)).unwrap();
    assert_eq!(gradient.w().slice(0, 0), &expected);
}

#[test]
fn fully_connected_identity_reproduces_flattened_input() {
    let mut layer = FullyConnected::new(9).with_activation(Activation::Identity);
    layer.init_weights([3, 3, 1]).unwrap();
    let eye = Matrix::from_fn(9, 9, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap();
    layer.set_weights(eye, vec![0.0; 9]).unwrap();

    let input = known_input();
    let output = layer.forward(&input).unwrap();
    assert_eq!(output.to_array(), input.to_array());

    // Propagated delta keeps the original input shape.
    layer
        .set_delta(&Tensor::ones(&[1, 1, 9, 1]).unwrap())
        .unwrap();
    let propagated = layer.derive_delta().unwrap();
    assert_eq!(propagated.shape(), input.shape());
}

#[test]
fn convolution_feeding_dense_runs_the_backward_chain() {
    // No pooling in between: the dense layer's propagated delta must come
    // back in the same axis layout the convolution emitted.
    let mut conv = Convolution::new(2, 2, 2)
        .with_activation(Activation::Identity)
        .with_init(WeightInit::default().with_seed(31));
    let conv_out = conv.init_weights([3, 3, 1]).unwrap();
    let mut dense = FullyConnected::new(3).with_init(WeightInit::default().with_seed(32));
    dense.init_weights(conv_out).unwrap();

    let input = known_input();
    let hidden = conv.forward(&input).unwrap();
    assert_eq!(hidden.shape(), [2, 1, 2, 2]);
    let output = dense.forward(&hidden).unwrap();

    let upstream = Tensor::ones(&output.shape()).unwrap();
    dense.set_delta(&upstream).unwrap();
    let propagated = dense.derive_delta().unwrap();
    assert_eq!(propagated.shape(), hidden.shape());
    conv.set_delta(&propagated).unwrap();
    let gradient = conv.gradient().unwrap().unwrap();
    assert_eq!(gradient.w().shape(), [2, 1, 2, 2]);

    // The same chain trains end to end through the driver.
    let mut net = Network::new();
    net.add_layer(
        Convolution::new(2, 2, 2)
            .with_activation(Activation::Identity)
            .with_init(WeightInit::default().with_seed(31)),
    );
    net.add_layer(FullyConnected::new(3).with_init(WeightInit::default().with_seed(32)));
    net.init([3, 3, 1]).unwrap();
    let mut data = Dataset::from_samples(vec![Sample::new(
        known_input(),
        Tensor::from_vec(vec![1.0, 0.0, 0.0], &[3, 1]).unwrap(),
    )]);
    net.fit(&mut data, &TrainConfig::default()).unwrap();
}

#[test]
fn reduce_round_averages_and_applies_once() {
    // Two workers on identical data must produce the same update as one.
    let mut accumulator = Accumulator::new(1);
    let gradient = Weight::new(Tensor::from_vec(vec![2.0; 4], &[2, 2]).unwrap(), vec![2.0]);
    accumulator.accumulate(vec![Some(gradient.clone())]).unwrap();
    accumulator.accumulate(vec![Some(gradient.clone())]).unwrap();
    let averaged = accumulator.average().unwrap();
    let avg = averaged[0].as_ref().unwrap();
    for value in avg.w().to_array() {
        assert_relative_eq!(value, 2.0);
    }
    assert_relative_eq!(avg.b()[0], 2.0);

    // clear() resets to the documented empty policy.
    accumulator.clear();
    assert!(accumulator.average().is_err());
}

#[test]
fn full_chain_trains_and_checkpoints() {
    let mut net = Network::new();
    net.add_layer(
        Convolution::new(3, 3, 4)
            .with_activation(Activation::Tanh)
            .with_init(WeightInit::default().with_seed(21)),
    );
    net.add_layer(MaxPooling::new(2));
    net.add_layer(FullyConnected::new(2).with_init(WeightInit::default().with_seed(22)));
    let out = net.init([8, 8, 1]).unwrap();
    assert_eq!(out, [2, 1, 1]);

    // Two constant-texture classes.
    let samples: Vec<Sample> = (0..12)
        .map(|i| {
            let class = i % 2;
            let fill = if class == 0 { 0.1 } else { 0.9 };
            Sample::new(
                Tensor::from_vec(vec![fill; 64], &[8, 8]).unwrap(),
                Tensor::from_vec(
                    vec![if class == 0 { 1.0 } else { 0.0 }, class as f32],
                    &[2, 1],
                )
                .unwrap(),
            )
        })
        .collect();
    let mut data = Dataset::from_samples(samples);
    let config = TrainConfig {
        epochs: 20,
        batch_size: 4,
        learning_rate: 0.5,
        shuffle_seed: Some(5),
    };
    let stats = net.fit(&mut data, &config).unwrap();
    assert!(stats.last().unwrap().mean_loss < stats.first().unwrap().mean_loss);

    let accuracy = net.evaluate(data.samples()).unwrap();
    assert!(accuracy > 0.5, "accuracy did not beat chance: {accuracy}");

    // Checkpoint round trip into a freshly wired network.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.bin");
    sn_nn::io::save_bincode(&net, &path).unwrap();
    let mut restored = Network::new();
    restored.add_layer(
        Convolution::new(3, 3, 4)
            .with_activation(Activation::Tanh)
            .with_init(WeightInit::default().with_seed(1)),
    );
    restored.add_layer(MaxPooling::new(2));
    restored.add_layer(FullyConnected::new(2).with_init(WeightInit::default().with_seed(2)));
    restored.init([8, 8, 1]).unwrap();
    sn_nn::io::load_bincode(&mut restored, &path).unwrap();
    let original = net.predict(&data.samples()[0].data).unwrap();
    let replayed = restored.predict(&data.samples()[0].data).unwrap();
    for (a, b) in original.to_array().iter().zip(replayed.to_array().iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-6);
    }
}
