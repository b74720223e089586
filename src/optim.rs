use nalgebra::{Cholesky, Matrix6, Vector6};

const UPPER_TRIANGLE: usize = 21;
const SYSTEM_SIZE: usize = UPPER_TRIANGLE + 6;

/// Accumulator for the 6x6 point-to-plane normal equations.
///
/// Stores the upper triangle of `JᵀJ` (21 floats) followed by `Jᵀr`
/// (6 floats) in a flat array so that partial sums from parallel workers can
/// be merged with a plain element-wise addition, mirroring the block-then-
/// final reduction the estimation kernel performs.
#[derive(Clone, Copy, Debug)]
pub struct NormalEquations {
    data: [f32; SYSTEM_SIZE],
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::zeros()
    }
}

impl NormalEquations {
    pub fn zeros() -> Self {
        Self {
            data: [0.0; SYSTEM_SIZE],
        }
    }

    /// Accumulates one residual row: `jacobian` is the 6-entry row of `J`,
    /// `rhs` the corresponding right-hand-side value.
    pub fn add_row(&mut self, jacobian: &[f32; 6], rhs: f32) {
        let mut index = 0;
        for i in 0..6 {
            for j in i..6 {
                self.data[index] += jacobian[i] * jacobian[j];
                index += 1;
            }
        }
        for i in 0..6 {
            self.data[UPPER_TRIANGLE + i] += jacobian[i] * rhs;
        }
    }

    /// Element-wise sum, used as the reduction operator.
    pub fn merge(mut self, other: &Self) -> Self {
        for (lfs, rhs) in self.data.iter_mut().zip(other.data.iter()) {
            *lfs += rhs;
        }
        self
    }

    /// Solves the accumulated system in double precision.
    ///
    /// Returns `None` when any entry is non-finite or the system is singular
    /// (`|det| < 1e-15`), which callers treat as a tracking failure.
    pub fn solve(&self) -> Option<Vector6<f32>> {
        if self.data.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut a = Matrix6::<f64>::zeros();
        let mut index = 0;
        for i in 0..6 {
            for j in i..6 {
                a[(i, j)] = self.data[index] as f64;
                a[(j, i)] = self.data[index] as f64;
                index += 1;
            }
        }
        let mut b = Vector6::<f64>::zeros();
        for i in 0..6 {
            b[i] = self.data[UPPER_TRIANGLE + i] as f64;
        }

        let det = a.determinant();
        if det.abs() < 1e-15 || !det.is_finite() {
            return None;
        }

        let solution = Cholesky::new(a)?.solve(&b);
        Some(nalgebra::convert(solution))
    }
}
