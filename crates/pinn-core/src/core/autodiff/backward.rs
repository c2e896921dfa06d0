use super::graph::{Graph, Op, Var};
#[cfg(test)]
use nalgebra::DMatrix;

impl Graph {
    /// Gradients of the scalar `output` with respect to each of `wrt`.
    ///
    /// The adjoints are recorded on this graph, so the returned handles can be
    /// used in further computation and differentiated again. Nodes that do not
    /// depend on any of `wrt` are never visited. A `wrt` entry that `output`
    /// does not reach gets a zero matrix of its own shape.
    pub fn grad(&mut self, output: Var, wrt: &[Var]) -> Vec<Var> {
        debug_assert_eq!(self.shape(output), (1, 1), "grad of non-scalar output");
        let Some(lowest) = wrt.iter().map(|v| v.0).min() else {
            return Vec::new();
        };

        let end = output.0 + 1;
        let mut depends = vec![false; end];
        for v in wrt.iter().filter(|v| v.0 < end) {
            depends[v.0] = true;
        }
        for i in lowest..end {
            if !depends[i] {
                let reached = self.nodes[i].op.inputs().any(|v| depends[v.0]);
                depends[i] = reached;
            }
        }

        let mut adjoints: Vec<Option<Var>> = vec![None; end];
        if depends[output.0] {
            adjoints[output.0] = Some(self.scalar(1.0));
        }

        for i in (lowest..end).rev() {
            let Some(upstream) = adjoints[i] else {
                continue;
            };
            let op = self.nodes[i].op.clone();
            for (input, contribution) in self.vjp(Var(i), &op, upstream, &depends) {
                adjoints[input.0] = Some(match adjoints[input.0] {
                    Some(existing) => self.add(existing, contribution),
                    None => contribution,
                });
            }
        }

        wrt.iter()
            .map(|&v| match adjoints.get(v.0).copied().flatten() {
                Some(adjoint) => adjoint,
                None => {
                    let (rows, cols) = self.shape(v);
                    self.zeros(rows, cols)
                }
            })
            .collect()
    }

    /// Contributions of `node`'s adjoint `g` to the adjoints of its inputs,
    /// restricted to inputs that lead back to a differentiation target.
    fn vjp(&mut self, node: Var, op: &Op, g: Var, depends: &[bool]) -> Vec<(Var, Var)> {
        let wanted = |v: Var| depends[v.0];
        let mut out = Vec::with_capacity(2);
        match *op {
            Op::Variable | Op::Constant => {}
            Op::Add(a, b) => {
                if wanted(a) {
                    out.push((a, g));
                }
                if wanted(b) {
                    out.push((b, g));
                }
            }
            Op::Sub(a, b) => {
                if wanted(a) {
                    out.push((a, g));
                }
                if wanted(b) {
                    out.push((b, self.neg(g)));
                }
            }
            Op::Mul(a, b) => {
                if wanted(a) {
                    out.push((a, self.mul(g, b)));
                }
                if wanted(b) {
                    out.push((b, self.mul(g, a)));
                }
            }
            Op::Div(a, b) => {
                if wanted(a) {
                    out.push((a, self.div(g, b)));
                }
                if wanted(b) {
                    let gy = self.mul(g, node);
                    let q = self.div(gy, b);
                    out.push((b, self.neg(q)));
                }
            }
            Op::AddRow(a, row) => {
                if wanted(a) {
                    out.push((a, g));
                }
                if wanted(row) {
                    out.push((row, self.sum_rows(g)));
                }
            }
            Op::MulCol(a, col) => {
                if wanted(a) {
                    out.push((a, self.mul_col(g, col)));
                }
                if wanted(col) {
                    let ga = self.mul(g, a);
                    out.push((col, self.sum_cols(ga)));
                }
            }
            Op::Affine { input, scale } => {
                if wanted(input) {
                    out.push((input, self.scale(g, scale)));
                }
            }
            Op::MatMul(a, b) => {
                if wanted(a) {
                    let bt = self.transpose(b);
                    out.push((a, self.matmul(g, bt)));
                }
                if wanted(b) {
                    let at = self.transpose(a);
                    out.push((b, self.matmul(at, g)));
                }
            }
            Op::Transpose(x) => {
                if wanted(x) {
                    out.push((x, self.transpose(g)));
                }
            }
            Op::Tanh(x) => {
                if wanted(x) {
                    let y2 = self.square(node);
                    let slope = self.affine(y2, -1.0, 1.0);
                    out.push((x, self.mul(g, slope)));
                }
            }
            Op::Exp(x) => {
                if wanted(x) {
                    out.push((x, self.mul(g, node)));
                }
            }
            Op::Sqrt(x) => {
                if wanted(x) {
                    let twice = self.scale(node, 2.0);
                    out.push((x, self.div(g, twice)));
                }
            }
            Op::Cos(x) => {
                if wanted(x) {
                    let s = self.sin(x);
                    let gs = self.mul(g, s);
                    out.push((x, self.neg(gs)));
                }
            }
            Op::Sin(x) => {
                if wanted(x) {
                    let c = self.cos(x);
                    out.push((x, self.mul(g, c)));
                }
            }
            Op::Clamp { input, lo, hi } => {
                if wanted(input) {
                    let mask = self
                        .value(input)
                        .map(|v| if (lo..=hi).contains(&v) { 1.0 } else { 0.0 });
                    let mask = self.constant(mask);
                    out.push((input, self.mul(g, mask)));
                }
            }
            Op::Huber { input, delta } => {
                if wanted(input) {
                    let slope = self.clamp(input, -delta, delta);
                    out.push((input, self.mul(g, slope)));
                }
            }
            Op::SumAll(x) => {
                if wanted(x) {
                    let (rows, cols) = self.shape(x);
                    out.push((x, self.broadcast(g, rows, cols)));
                }
            }
            Op::SumRows(x) => {
                if wanted(x) {
                    let rows = self.shape(x).0;
                    out.push((x, self.repeat_rows(g, rows)));
                }
            }
            Op::SumCols(x) => {
                if wanted(x) {
                    let cols = self.shape(x).1;
                    out.push((x, self.repeat_cols(g, cols)));
                }
            }
            Op::Broadcast { input } => {
                if wanted(input) {
                    out.push((input, self.sum_all(g)));
                }
            }
            Op::RepeatRows { input } => {
                if wanted(input) {
                    out.push((input, self.sum_rows(g)));
                }
            }
            Op::RepeatCols { input } => {
                if wanted(input) {
                    out.push((input, self.sum_cols(g)));
                }
            }
            Op::Gather { input, ref index } => {
                if wanted(input) {
                    let rows = self.shape(input).0;
                    out.push((input, self.scatter_add(g, index.clone(), rows)));
                }
            }
            Op::ScatterAdd { input, ref index } => {
                if wanted(input) {
                    out.push((input, self.gather(g, index.clone())));
                }
            }
            Op::SliceCols { input, start } => {
                if wanted(input) {
                    let total = self.shape(input).1;
                    out.push((input, self.pad_cols(g, start, total)));
                }
            }
            Op::PadCols { input, start } => {
                if wanted(input) {
                    let len = self.shape(input).1;
                    out.push((input, self.slice_cols(g, start, len)));
                }
            }
        }
        out
    }
}

/// Central finite-difference gradient of a scalar function of one matrix.
#[cfg(test)]
pub(crate) fn numeric_gradient(
    f: impl Fn(&mut Graph, Var) -> Var,
    at: &DMatrix<f64>,
    step: f64,
) -> DMatrix<f64> {
    let evaluate = |x: DMatrix<f64>| {
        let mut graph = Graph::new();
        let input = graph.variable(x);
        let out = f(&mut graph, input);
        graph.scalar_value(out)
    };
    DMatrix::from_fn(at.nrows(), at.ncols(), |i, j| {
        let mut plus = at.clone();
        plus[(i, j)] += step;
        let mut minus = at.clone();
        minus[(i, j)] -= step;
        (evaluate(plus) - evaluate(minus)) / (2.0 * step)
    })
}
