use nalgebra::DMatrix;
use std::sync::Arc;

/// Handle to a value recorded on a [`Graph`].
///
/// Handles are only meaningful for the graph that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub(super) usize);

impl Var {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(super) enum Op {
    Variable,
    Constant,
    Add(Var, Var),
    Sub(Var, Var),
    Mul(Var, Var),
    Div(Var, Var),
    /// `(r, c) + (1, c)` broadcast over rows.
    AddRow(Var, Var),
    /// `(r, c) ⊙ (r, 1)` broadcast over columns.
    MulCol(Var, Var),
    /// Only the scale matters for the gradient.
    Affine { input: Var, scale: f64 },
    MatMul(Var, Var),
    Transpose(Var),
    Tanh(Var),
    Exp(Var),
    Sqrt(Var),
    Cos(Var),
    Sin(Var),
    Clamp { input: Var, lo: f64, hi: f64 },
    Huber { input: Var, delta: f64 },
    SumAll(Var),
    SumRows(Var),
    SumCols(Var),
    // Output shapes of these live on the recorded value.
    Broadcast { input: Var },
    RepeatRows { input: Var },
    RepeatCols { input: Var },
    Gather { input: Var, index: Arc<[usize]> },
    ScatterAdd { input: Var, index: Arc<[usize]> },
    SliceCols { input: Var, start: usize },
    PadCols { input: Var, start: usize },
}

impl Op {
    pub(super) fn inputs(&self) -> impl Iterator<Item = Var> {
        let pair = match *self {
            Op::Variable | Op::Constant => [None, None],
            Op::Add(a, b)
            | Op::Sub(a, b)
            | Op::Mul(a, b)
            | Op::Div(a, b)
            | Op::AddRow(a, b)
            | Op::MulCol(a, b)
            | Op::MatMul(a, b) => [Some(a), Some(b)],
            Op::Transpose(x)
            | Op::Tanh(x)
            | Op::Exp(x)
            | Op::Sqrt(x)
            | Op::Cos(x)
            | Op::Sin(x)
            | Op::SumAll(x)
            | Op::SumRows(x)
            | Op::SumCols(x) => [Some(x), None],
            Op::Affine { input, .. }
            | Op::Clamp { input, .. }
            | Op::Huber { input, .. }
            | Op::Broadcast { input, .. }
            | Op::RepeatRows { input, .. }
            | Op::RepeatCols { input, .. }
            | Op::Gather { input, .. }
            | Op::ScatterAdd { input, .. }
            | Op::SliceCols { input, .. }
            | Op::PadCols { input, .. } => [Some(input), None],
        };
        pair.into_iter().flatten()
    }
}

#[derive(Debug, Clone)]
pub(super) struct Node {
    pub(super) op: Op,
    pub(super) value: DMatrix<f64>,
}

/// An append-only tape of eagerly evaluated operations.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(super) nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Records a differentiable input.
    pub fn variable(&mut self, value: DMatrix<f64>) -> Var {
        self.push(Op::Variable, value)
    }

    /// Records an input that is never differentiated against.
    pub fn constant(&mut self, value: DMatrix<f64>) -> Var {
        self.push(Op::Constant, value)
    }

    pub fn scalar(&mut self, value: f64) -> Var {
        self.constant(DMatrix::from_element(1, 1, value))
    }

    pub fn zeros(&mut self, rows: usize, cols: usize) -> Var {
        self.constant(DMatrix::zeros(rows, cols))
    }

    /// Column vector `(len, 1)` from a slice.
    pub fn column(&mut self, values: &[f64]) -> Var {
        self.constant(DMatrix::from_column_slice(values.len(), 1, values))
    }

    pub fn value(&self, var: Var) -> &DMatrix<f64> {
        &self.nodes[var.0].value
    }

    /// The single entry of a `(1, 1)` value.
    pub fn scalar_value(&self, var: Var) -> f64 {
        let value = self.value(var);
        debug_assert_eq!(value.shape(), (1, 1), "scalar_value on non-scalar");
        value[(0, 0)]
    }

    pub fn shape(&self, var: Var) -> (usize, usize) {
        self.value(var).shape()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(super) fn push(&mut self, op: Op, value: DMatrix<f64>) -> Var {
        self.nodes.push(Node { op, value });
        Var(self.nodes.len() - 1)
    }
}
