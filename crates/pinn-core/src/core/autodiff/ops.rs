use super::graph::{Graph, Op, Var};
use nalgebra::DMatrix;
use std::sync::Arc;

fn same_shape(graph: &Graph, a: Var, b: Var) {
    debug_assert_eq!(
        graph.shape(a),
        graph.shape(b),
        "element-wise operands differ in shape"
    );
}

impl Graph {
    pub fn add(&mut self, a: Var, b: Var) -> Var {
        same_shape(self, a, b);
        let value = self.value(a) + self.value(b);
        self.push(Op::Add(a, b), value)
    }

    pub fn sub(&mut self, a: Var, b: Var) -> Var {
        same_shape(self, a, b);
        let value = self.value(a) - self.value(b);
        self.push(Op::Sub(a, b), value)
    }

    pub fn mul(&mut self, a: Var, b: Var) -> Var {
        same_shape(self, a, b);
        let value = self.value(a).component_mul(self.value(b));
        self.push(Op::Mul(a, b), value)
    }

    pub fn div(&mut self, a: Var, b: Var) -> Var {
        same_shape(self, a, b);
        let value = self.value(a).component_div(self.value(b));
        self.push(Op::Div(a, b), value)
    }

    /// Adds the row vector `row` (1 × c) to every row of `a` (r × c).
    pub fn add_row(&mut self, a: Var, row: Var) -> Var {
        let (x, r) = (self.value(a), self.value(row));
        debug_assert_eq!(r.nrows(), 1);
        debug_assert_eq!(r.ncols(), x.ncols());
        let value = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] + r[(0, j)]);
        self.push(Op::AddRow(a, row), value)
    }

    /// Scales row `i` of `a` (r × c) by `col[i]` (r × 1).
    pub fn mul_col(&mut self, a: Var, col: Var) -> Var {
        let (x, s) = (self.value(a), self.value(col));
        debug_assert_eq!(s.ncols(), 1);
        debug_assert_eq!(s.nrows(), x.nrows());
        let value = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * s[(i, 0)]);
        self.push(Op::MulCol(a, col), value)
    }

    /// `scale · x + offset`, element-wise.
    pub fn affine(&mut self, x: Var, scale: f64, offset: f64) -> Var {
        let value = self.value(x).map(|v| scale * v + offset);
        self.push(Op::Affine { input: x, scale }, value)
    }

    pub fn scale(&mut self, x: Var, factor: f64) -> Var {
        self.affine(x, factor, 0.0)
    }

    pub fn neg(&mut self, x: Var) -> Var {
        self.affine(x, -1.0, 0.0)
    }

    pub fn square(&mut self, x: Var) -> Var {
        self.mul(x, x)
    }

    pub fn matmul(&mut self, a: Var, b: Var) -> Var {
        debug_assert_eq!(self.value(a).ncols(), self.value(b).nrows());
        let value = self.value(a) * self.value(b);
        self.push(Op::MatMul(a, b), value)
    }

    pub fn transpose(&mut self, x: Var) -> Var {
        let value = self.value(x).transpose();
        self.push(Op::Transpose(x), value)
    }

    pub fn tanh(&mut self, x: Var) -> Var {
        let value = self.value(x).map(f64::tanh);
        self.push(Op::Tanh(x), value)
    }

    pub fn exp(&mut self, x: Var) -> Var {
        let value = self.value(x).map(f64::exp);
        self.push(Op::Exp(x), value)
    }

    pub fn sqrt(&mut self, x: Var) -> Var {
        let value = self.value(x).map(f64::sqrt);
        self.push(Op::Sqrt(x), value)
    }

    pub fn cos(&mut self, x: Var) -> Var {
        let value = self.value(x).map(f64::cos);
        self.push(Op::Cos(x), value)
    }

    pub fn sin(&mut self, x: Var) -> Var {
        let value = self.value(x).map(f64::sin);
        self.push(Op::Sin(x), value)
    }

    pub fn clamp(&mut self, x: Var, lo: f64, hi: f64) -> Var {
        let value = self.value(x).map(|v| v.clamp(lo, hi));
        self.push(Op::Clamp { input: x, lo, hi }, value)
    }

    /// Huber penalty: `½x²` inside `[−δ, δ]`, `δ(|x| − ½δ)` outside.
    pub fn huber(&mut self, x: Var, delta: f64) -> Var {
        let value = self.value(x).map(|v| {
            if v.abs() <= delta {
                0.5 * v * v
            } else {
                delta * (v.abs() - 0.5 * delta)
            }
        });
        self.push(Op::Huber { input: x, delta }, value)
    }

    /// Sum of every entry, as a `(1, 1)` value.
    pub fn sum_all(&mut self, x: Var) -> Var {
        let value = DMatrix::from_element(1, 1, self.value(x).sum());
        self.push(Op::SumAll(x), value)
    }

    /// Column sums: `(r, c) → (1, c)`.
    pub fn sum_rows(&mut self, x: Var) -> Var {
        let m = self.value(x);
        let value = DMatrix::from_fn(1, m.ncols(), |_, j| m.column(j).sum());
        self.push(Op::SumRows(x), value)
    }

    /// Row sums: `(r, c) → (r, 1)`.
    pub fn sum_cols(&mut self, x: Var) -> Var {
        let m = self.value(x);
        let value = DMatrix::from_fn(m.nrows(), 1, |i, _| m.row(i).sum());
        self.push(Op::SumCols(x), value)
    }

    /// Fills a `(rows, cols)` matrix with a `(1, 1)` value.
    pub fn broadcast(&mut self, x: Var, rows: usize, cols: usize) -> Var {
        let v = self.scalar_value(x);
        let value = DMatrix::from_element(rows, cols, v);
        self.push(Op::Broadcast { input: x }, value)
    }

    /// Stacks a `(1, c)` row `rows` times.
    pub fn repeat_rows(&mut self, x: Var, rows: usize) -> Var {
        let m = self.value(x);
        debug_assert_eq!(m.nrows(), 1);
        let value = DMatrix::from_fn(rows, m.ncols(), |_, j| m[(0, j)]);
        self.push(Op::RepeatRows { input: x }, value)
    }

    /// Places a `(r, 1)` column side by side `cols` times.
    pub fn repeat_cols(&mut self, x: Var, cols: usize) -> Var {
        let m = self.value(x);
        debug_assert_eq!(m.ncols(), 1);
        let value = DMatrix::from_fn(m.nrows(), cols, |i, _| m[(i, 0)]);
        self.push(Op::RepeatCols { input: x }, value)
    }

    /// Row `k` of the result is row `index[k]` of `x`.
    pub fn gather(&mut self, x: Var, index: Arc<[usize]>) -> Var {
        let m = self.value(x);
        let value = DMatrix::from_fn(index.len(), m.ncols(), |k, j| m[(index[k], j)]);
        self.push(Op::Gather { input: x, index }, value)
    }

    /// Adds row `k` of `x` into row `index[k]` of a `(rows, c)` zero matrix.
    pub fn scatter_add(&mut self, x: Var, index: Arc<[usize]>, rows: usize) -> Var {
        let m = self.value(x);
        debug_assert_eq!(m.nrows(), index.len());
        let mut value = DMatrix::zeros(rows, m.ncols());
        for (k, &target) in index.iter().enumerate() {
            for j in 0..m.ncols() {
                value[(target, j)] += m[(k, j)];
            }
        }
        self.push(Op::ScatterAdd { input: x, index }, value)
    }

    pub fn slice_cols(&mut self, x: Var, start: usize, len: usize) -> Var {
        let value = self.value(x).columns(start, len).into_owned();
        self.push(Op::SliceCols { input: x, start }, value)
    }

    /// Embeds `x` at column `start` of a zero matrix with `total` columns.
    pub fn pad_cols(&mut self, x: Var, start: usize, total: usize) -> Var {
        let m = self.value(x);
        let mut value = DMatrix::zeros(m.nrows(), total);
        value.columns_mut(start, m.ncols()).copy_from(m);
        self.push(Op::PadCols { input: x, start }, value)
    }

    /// Horizontal concatenation of equally tall blocks.
    pub fn concat_cols(&mut self, blocks: &[Var]) -> Var {
        let total: usize = blocks.iter().map(|&b| self.shape(b).1).sum();
        let mut start = 0;
        let mut result = None;
        for &block in blocks {
            let width = self.shape(block).1;
            let padded = self.pad_cols(block, start, total);
            start += width;
            result = Some(match result {
                Some(acc) => self.add(acc, padded),
                None => padded,
            });
        }
        result.unwrap_or_else(|| self.zeros(0, 0))
    }
}
