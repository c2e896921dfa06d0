use super::params::{ModelParameters, ParamBinding, ParamId, ParamKind};
use crate::core::autodiff::{Graph, Var};
use nalgebra::DMatrix;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activation {
    #[default]
    Tanh,
    Identity,
}

impl Activation {
    fn apply(self, graph: &mut Graph, x: Var) -> Var {
        match self {
            Activation::Tanh => graph.tanh(x),
            Activation::Identity => x,
        }
    }
}

/// `y = act(x·W + b)` applied row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    weight: ParamId,
    bias: Option<ParamId>,
    activation: Activation,
    in_dim: usize,
    out_dim: usize,
}

impl Dense {
    /// Registers a Glorot-uniform kernel (and a zero bias when `use_bias`).
    pub fn new(
        params: &mut ModelParameters,
        name: &str,
        in_dim: usize,
        out_dim: usize,
        use_bias: bool,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let limit = (6.0 / (in_dim + out_dim).max(1) as f64).sqrt();
        let kernel = DMatrix::from_fn(in_dim, out_dim, |_, _| rng.gen_range(-limit..limit));
        let weight = params.register(format!("{name}/kernel"), ParamKind::Weight, kernel);
        let bias = use_bias.then(|| {
            params.register(
                format!("{name}/bias"),
                ParamKind::Bias,
                DMatrix::zeros(1, out_dim),
            )
        });
        Self {
            weight,
            bias,
            activation,
            in_dim,
            out_dim,
        }
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn weight(&self) -> ParamId {
        self.weight
    }

    pub fn forward(&self, graph: &mut Graph, binding: &ParamBinding, x: Var) -> Var {
        let mut y = graph.matmul(x, binding.get(self.weight));
        if let Some(bias) = self.bias {
            y = graph.add_row(y, binding.get(bias));
        }
        self.activation.apply(graph, y)
    }
}

/// A stack of [`Dense`] layers sharing one activation. An empty stack is the
/// identity map.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForward {
    layers: Vec<Dense>,
    in_dim: usize,
}

impl FeedForward {
    pub fn new(
        params: &mut ModelParameters,
        name: &str,
        in_dim: usize,
        widths: &[usize],
        use_bias: bool,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let mut layers = Vec::with_capacity(widths.len());
        let mut width = in_dim;
        for (k, &next) in widths.iter().enumerate() {
            layers.push(Dense::new(
                params,
                &format!("{name}/dense-{k}"),
                width,
                next,
                use_bias,
                activation,
                rng,
            ));
            width = next;
        }
        Self { layers, in_dim }
    }

    pub fn out_dim(&self) -> usize {
        self.layers.last().map_or(self.in_dim, Dense::out_dim)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn forward(&self, graph: &mut Graph, binding: &ParamBinding, x: Var) -> Var {
        self.layers
            .iter()
            .fold(x, |h, layer| layer.forward(graph, binding, h))
    }
}
