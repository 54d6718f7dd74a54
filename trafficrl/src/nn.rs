//! Q-network used by the DQN agent.

use burn::{
    module::{Module, Param},
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{activation::relu, backend::Backend},
};

/// Configuration for the feedforward Q-network.
#[derive(Config, Debug)]
pub struct MlpConfig {
    pub input_dim: usize,
    /// Hidden layer widths, e.g. `[64, 64]`.
    pub hidden_layers: Vec<usize>,
    pub output_dim: usize,
}

/// Linear stack with ReLU hidden activations and a linear output head
/// (one Q-value per green phase).
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut layers = Vec::new();

        if self.hidden_layers.is_empty() {
            layers.push(LinearConfig::new(self.input_dim, self.output_dim).init(device));
        } else {
            layers.push(LinearConfig::new(self.input_dim, self.hidden_layers[0]).init(device));

            for i in 0..self.hidden_layers.len() - 1 {
                layers.push(
                    LinearConfig::new(self.hidden_layers[i], self.hidden_layers[i + 1])
                        .init(device),
                );
            }

            let last_hidden = *self.hidden_layers.last().unwrap();
            layers.push(LinearConfig::new(last_hidden, self.output_dim).init(device));
        }

        Mlp { layers }
    }
}

impl<B: Backend> Mlp<B> {
    /// Forward pass; the last dimension is the feature dimension.
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut x = input;

        for layer in &self.layers[..self.layers.len() - 1] {
            x = layer.forward(x);
            x = relu(x);
        }

        self.layers.last().unwrap().forward(x)
    }

    /// Move this network's parameters toward `other`'s:
    /// θ′ ← τθ + (1 − τ)θ′. τ = 1 is a hard copy (periodic target update).
    pub fn soft_update(&mut self, other: &Self, tau: f32) {
        for (target_layer, policy_layer) in self.layers.iter_mut().zip(other.layers.iter()) {
            soft_update_linear(target_layer, policy_layer, tau);
        }
    }
}

fn soft_update_tensor<B: Backend, const D: usize>(
    this: &mut Param<Tensor<B, D>>,
    that: &Param<Tensor<B, D>>,
    tau: f32,
) {
    // detach keeps the autodiff graph from accumulating across updates
    *this = this
        .clone()
        .map(|tensor| tensor * (1.0 - tau) + that.val().detach() * tau);
}

fn soft_update_linear<B: Backend>(this: &mut Linear<B>, that: &Linear<B>, tau: f32) {
    soft_update_tensor(&mut this.weight, &that.weight, tau);

    if let (Some(b1), Some(b2)) = (&mut this.bias, &that.bias) {
        soft_update_tensor(b1, b2, tau);
    }
}
