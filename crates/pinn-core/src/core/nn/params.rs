use crate::core::autodiff::{Graph, Var};
use nalgebra::DMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Dense-layer kernel; subject to L2 regularization.
    Weight,
    Bias,
    /// Species embedding table.
    Embedding,
}

impl ParamKind {
    pub fn is_regularized(self) -> bool {
        matches!(self, ParamKind::Weight)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub value: DMatrix<f64>,
}

/// Every learnable tensor of a model, with a version counting committed
/// optimizer updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelParameters {
    entries: Vec<Parameter>,
    version: u64,
}

impl ModelParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, kind: ParamKind, value: DMatrix<f64>) -> ParamId {
        self.entries.push(Parameter {
            name: name.into(),
            kind,
            value,
        });
        ParamId(self.entries.len() - 1)
    }

    pub fn get(&self, id: ParamId) -> &DMatrix<f64> {
        &self.entries[id.0].value
    }

    pub fn parameter(&self, id: ParamId) -> &Parameter {
        &self.entries[id.0]
    }

    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.entries.iter().position(|p| p.name == name).map(ParamId)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn n_scalars(&self) -> usize {
        self.entries.iter().map(|p| p.value.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Parameter)> {
        self.entries.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn all_finite(&self) -> bool {
        self.entries
            .iter()
            .all(|p| p.value.iter().all(|v| v.is_finite()))
    }

    /// Records every parameter as a graph variable.
    pub fn bind(&self, graph: &mut Graph) -> ParamBinding {
        ParamBinding {
            vars: self
                .entries
                .iter()
                .map(|p| graph.variable(p.value.clone()))
                .collect(),
        }
    }

    /// Mutable access for optimizers; call [`ModelParameters::commit`] once
    /// the update is complete.
    pub(crate) fn value_mut(&mut self, id: ParamId) -> &mut DMatrix<f64> {
        &mut self.entries[id.0].value
    }

    pub(crate) fn commit(&mut self) {
        self.version += 1;
    }
}

/// Graph variables of one [`ModelParameters`] binding.
#[derive(Debug, Clone)]
pub struct ParamBinding {
    vars: Vec<Var>,
}

impl ParamBinding {
    pub fn get(&self, id: ParamId) -> Var {
        self.vars[id.0]
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Σ‖W‖² over regularized parameters, recorded on `graph`.
    pub fn l2_penalty(&self, graph: &mut Graph, params: &ModelParameters) -> Var {
        let mut total = graph.scalar(0.0);
        for (id, parameter) in params.iter() {
            if parameter.kind.is_regularized() {
                let squared = graph.square(self.get(id));
                let sum = graph.sum_all(squared);
                total = graph.add(total, sum);
            }
        }
        total
    }

    /// Evaluates `∂output/∂θ` for every bound parameter.
    pub fn gradients(&self, graph: &mut Graph, output: Var) -> Gradients {
        let grads = graph.grad(output, &self.vars);
        Gradients {
            values: grads.into_iter().map(|g| graph.value(g).clone()).collect(),
        }
    }
}

/// Gradient matrices aligned with a [`ModelParameters`] layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    values: Vec<DMatrix<f64>>,
}

impl Gradients {
    pub fn zeros_like(params: &ModelParameters) -> Self {
        Self {
            values: params
                .entries
                .iter()
                .map(|p| DMatrix::zeros(p.value.nrows(), p.value.ncols()))
                .collect(),
        }
    }

    pub fn get(&self, id: ParamId) -> &DMatrix<f64> {
        &self.values[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &DMatrix<f64>)> {
        self.values.iter().enumerate().map(|(i, g)| (ParamId(i), g))
    }

    pub fn accumulate(&mut self, other: &Gradients) {
        for (mine, theirs) in self.values.iter_mut().zip(&other.values) {
            *mine += theirs;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for g in &mut self.values {
            *g *= factor;
        }
    }

    pub fn global_norm(&self) -> f64 {
        self.values
            .iter()
            .map(|g| g.norm_squared())
            .sum::<f64>()
            .sqrt()
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|g| g.iter().all(|v| v.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_params() -> (ModelParameters, ParamId, ParamId) {
        let mut params = ModelParameters::new();
        let w = params.register("w", ParamKind::Weight, DMatrix::from_element(2, 2, 1.5));
        let b = params.register("b", ParamKind::Bias, DMatrix::from_element(1, 2, -2.0));
        (params, w, b)
    }

    #[test]
    fn register_assigns_sequential_ids_and_counts_scalars() {
        let (params, w, b) = two_params();
        assert_eq!(w.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(params.n_scalars(), 6);
        assert_eq!(params.find("b"), Some(b));
        assert_eq!(params.version(), 0);
    }

    #[test]
    fn l2_penalty_skips_biases() {
        let (params, w, b) = two_params();
        let mut graph = Graph::new();
        let binding = params.bind(&mut graph);
        let penalty = binding.l2_penalty(&mut graph, &params);
        assert!((graph.scalar_value(penalty) - 4.0 * 2.25).abs() < 1e-12);
        let grads = binding.gradients(&mut graph, penalty);
        assert_eq!(grads.get(w), &DMatrix::from_element(2, 2, 3.0));
        assert_eq!(grads.get(b), &DMatrix::zeros(1, 2));
    }

    #[test]
    fn gradients_accumulate_scale_and_report_norm() {
        let (params, w, _) = two_params();
        let mut total = Gradients::zeros_like(&params);
        let mut step = Gradients::zeros_like(&params);
        step.values[0] = DMatrix::from_element(2, 2, 1.0);
        total.accumulate(&step);
        total.accumulate(&step);
        assert_eq!(total.get(w), &DMatrix::from_element(2, 2, 2.0));
        assert!((total.global_norm() - 4.0).abs() < 1e-12);
        total.scale(0.5);
        assert!((total.global_norm() - 2.0).abs() < 1e-12);
        assert!(total.all_finite());
        total.values[1][(0, 0)] = f64::NAN;
        assert!(!total.all_finite());
    }

    #[test]
    fn commit_increments_version() {
        let (mut params, w, _) = two_params();
        params.value_mut(w)[(0, 0)] = 0.0;
        params.commit();
        assert_eq!(params.version(), 1);
        assert_eq!(params.get(w)[(0, 0)], 0.0);
    }
}
