use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use thiserror::Error;

/// Configuration for the conjugate gradient solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub max_iters: usize,
    pub rel_tol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            rel_tol: 1e-10,
        }
    }
}

impl Config {
    /// Validates that the tolerance is finite and positive.
    ///
    /// # Errors
    ///
    /// Returns an error if the tolerance is non-finite or not positive.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.rel_tol.is_finite() || self.rel_tol <= 0.0 {
            return Err("rel_tol must be finite and positive");
        }
        Ok(())
    }
}

/// Errors that can occur during a conjugate gradient solve.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("matrix is {rows}x{cols} but right-hand side has length {rhs}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        rhs: usize,
    },

    #[error(
        "conjugate gradient did not converge within {iterations} iterations \
         (relative residual {residual:.3e})"
    )]
    DidNotConverge { iterations: usize, residual: f64 },

    #[error(
        "conjugate gradient broke down at iteration {iteration}: \
         the system is not positive definite"
    )]
    Breakdown { iteration: usize },
}

/// The result of a converged conjugate gradient solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// The solution vector.
    pub x: DVector<f64>,
    /// Iterations taken to converge.
    pub iterations: usize,
    /// Relative residual at convergence.
    pub residual: f64,
}

/// Solves `A x = b` for a sparse symmetric positive definite `A` by the
/// conjugate gradient method.
///
/// `x0` seeds the iteration: warm-starting from a nearby solution (for
/// example, the pressures of the previous solve) typically converges in a
/// handful of iterations, which is why repeated solves pass it explicitly.
/// Convergence is declared when the residual norm drops below
/// `config.rel_tol` times the right-hand-side norm.
///
/// # Errors
///
/// Returns an error if the shapes are inconsistent, the iteration budget
/// is exhausted before convergence, or the matrix proves not positive
/// definite (a singular network with no path to any injection or outflow).
pub fn solve(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    config: &Config,
) -> Result<Solution, Error> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(Error::ShapeMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: n,
        });
    }

    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(Solution {
            x: DVector::zeros(n),
            iterations: 0,
            residual: 0.0,
        });
    }

    let mut x = match x0 {
        Some(seed) => seed.clone(),
        None => DVector::zeros(n),
    };
    let mut residual = b - a * &x;
    let mut rel_residual = residual.norm() / b_norm;
    if rel_residual <= config.rel_tol {
        return Ok(Solution {
            x,
            iterations: 0,
            residual: rel_residual,
        });
    }

    let mut direction = residual.clone();
    let mut residual_sq = residual.dot(&residual);

    for iteration in 1..=config.max_iters {
        let a_direction = a * &direction;
        let curvature = direction.dot(&a_direction);
        if !curvature.is_finite() || curvature <= 0.0 {
            return Err(Error::Breakdown { iteration });
        }

        let alpha = residual_sq / curvature;
        x.axpy(alpha, &direction, 1.0);
        residual.axpy(-alpha, &a_direction, 1.0);

        rel_residual = residual.norm() / b_norm;
        if rel_residual <= config.rel_tol {
            return Ok(Solution {
                x,
                iterations: iteration,
                residual: rel_residual,
            });
        }

        let next_residual_sq = residual.dot(&residual);
        direction = &residual + &direction * (next_residual_sq / residual_sq);
        residual_sq = next_residual_sq;
    }

    Err(Error::DidNotConverge {
        iterations: config.max_iters,
        residual: rel_residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;

    /// A small SPD system: the 1D discrete Laplacian with Dirichlet ends.
    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 2.0);
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
                coo.push(i + 1, i, -1.0);
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn solves_a_small_spd_system() {
        let a = tridiagonal(10);
        let expected = DVector::from_fn(10, |i, _| (i as f64 * 0.7).sin());
        let b = &a * &expected;

        let solution = solve(&a, &b, None, &Config::default()).unwrap();

        assert_relative_eq!(solution.x, expected, epsilon = 1e-8);
        assert!(solution.residual <= Config::default().rel_tol);
    }

    #[test]
    fn warm_start_converges_faster() {
        let a = tridiagonal(50);
        let expected = DVector::from_fn(50, |i, _| 1.0 + (i as f64 * 0.3).cos());
        let b = &a * &expected;

        let cold = solve(&a, &b, None, &Config::default()).unwrap();
        let warm = solve(&a, &b, Some(&cold.x), &Config::default()).unwrap();

        assert!(warm.iterations < cold.iterations);
        assert_relative_eq!(warm.x, expected, epsilon = 1e-7);
    }

    #[test]
    fn zero_rhs_returns_zero() {
        let a = tridiagonal(5);
        let b = DVector::zeros(5);
        let solution = solve(&a, &b, None, &Config::default()).unwrap();
        assert_eq!(solution.x, DVector::zeros(5));
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn reports_shape_mismatch() {
        let a = tridiagonal(5);
        let b = DVector::zeros(4);
        assert!(matches!(
            solve(&a, &b, None, &Config::default()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn singular_system_does_not_converge() {
        // An all-zero matrix has no positive curvature along any direction.
        let coo = CooMatrix::new(4, 4);
        let a = CsrMatrix::from(&coo);
        let b = DVector::from_element(4, 1.0);

        assert!(matches!(
            solve(&a, &b, None, &Config::default()),
            Err(Error::Breakdown { .. })
        ));
    }

    #[test]
    fn exhausted_budget_is_an_error() {
        let a = tridiagonal(50);
        let expected = DVector::from_fn(50, |i, _| i as f64);
        let b = &a * &expected;

        let config = Config {
            max_iters: 2,
            ..Config::default()
        };
        assert!(matches!(
            solve(&a, &b, None, &config),
            Err(Error::DidNotConverge { iterations: 2, .. })
        ));
    }
}
