use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Largest accepted residual norm, relative to `1 + |z|`
    pub tolerance: f64,
    pub check_residual: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Lu,
            tolerance: 1e-9,
            check_residual: true,
        }
    }
}

/// Available solver methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Direct LU decomposition with partial pivoting
    Lu,
    /// QR decomposition with column pivoting
    Qr,
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::Lu => write!(f, "lu"),
            SolverMethod::Qr => write!(f, "qr"),
        }
    }
}

impl FromStr for SolverMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lu" => Ok(SolverMethod::Lu),
            "qr" => Ok(SolverMethod::Qr),
            other => Err(format!("unknown solver method '{}'", other)),
        }
    }
}

/// Solver statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverStats {
    pub method_used: SolverMethod,
    pub residual_norm: f64,
    pub solve_time: f64,
}

/// Dense linear system solver
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `A x = z`, failing with `SingularSystem` when no finite,
    /// stable solution exists.
    pub fn solve(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> CircuitResult<(DVector<f64>, SolverStats)> {
        let start_time = Instant::now();

        if matrix.nrows() != matrix.ncols() {
            return Err(CircuitError::singular("matrix must be square"));
        }
        if matrix.nrows() != rhs.len() {
            return Err(CircuitError::singular("matrix and RHS dimensions don't match"));
        }
        if matrix.is_empty() {
            return Err(CircuitError::singular("system has zero dimension"));
        }

        let solution = match self.config.method {
            SolverMethod::Lu => matrix
                .clone()
                .lu()
                .solve(rhs)
                .ok_or_else(|| CircuitError::singular("LU decomposition failed - matrix is singular"))?,
            SolverMethod::Qr => matrix
                .clone()
                .col_piv_qr()
                .solve(rhs)
                .ok_or_else(|| CircuitError::singular("QR decomposition failed - matrix is singular"))?,
        };

        if solution.iter().any(|value| !value.is_finite()) {
            return Err(CircuitError::singular("solution contains non-finite values"));
        }

        let residual_norm = (matrix * &solution - rhs).norm();
        if self.config.check_residual && residual_norm > self.config.tolerance * (1.0 + rhs.norm()) {
            return Err(CircuitError::singular(format!(
                "residual norm {:.3e} exceeds tolerance - matrix is ill-conditioned",
                residual_norm
            )));
        }

        let stats = SolverStats {
            method_used: self.config.method,
            residual_norm,
            solve_time: start_time.elapsed().as_secs_f64(),
        };
        debug!(
            "Solved {}x{} system with {} (residual {:.2e})",
            matrix.nrows(),
            matrix.ncols(),
            stats.method_used,
            stats.residual_norm
        );
        Ok((solution, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_lu_solver() {
        let solver = LinearSolver::new();

        // Create a simple 2x2 system: [2 1; 1 2] * [x; y] = [3; 3]
        // Solution should be [1; 1]
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let rhs = DVector::from_vec(vec![3.0, 3.0]);

        let (solution, stats) = solver.solve(&matrix, &rhs).unwrap();

        assert!((solution[0] - 1.0).abs() < 1e-10);
        assert!((solution[1] - 1.0).abs() < 1e-10);
        assert!(stats.residual_norm < 1e-10);
        assert_eq!(stats.method_used, SolverMethod::Lu);
    }

    #[test]
    fn test_dense_qr_solver() {
        let solver = LinearSolver::with_config(SolverConfig {
            method: SolverMethod::Qr,
            ..SolverConfig::default()
        });

        // Zero on the leading diagonal, as in a voltage-source branch row
        let matrix = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.2]);
        let rhs = DVector::from_vec(vec![10.0, 0.0]);

        let (solution, stats) = solver.solve(&matrix, &rhs).unwrap();
        assert!((solution[0] + 2.0).abs() < 1e-9);
        assert!((solution[1] - 10.0).abs() < 1e-9);
        assert_eq!(stats.method_used, SolverMethod::Qr);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        let rhs = DVector::from_vec(vec![1.0, 0.0]);

        for method in [SolverMethod::Lu, SolverMethod::Qr] {
            let solver = LinearSolver::with_config(SolverConfig {
                method,
                ..SolverConfig::default()
            });
            assert!(matches!(
                solver.solve(&matrix, &rhs),
                Err(CircuitError::SingularSystem { .. })
            ));
        }
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        let solver = LinearSolver::new();
        let result = solver.solve(&DMatrix::zeros(0, 0), &DVector::zeros(0));
        assert!(matches!(result, Err(CircuitError::SingularSystem { .. })));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let solver = LinearSolver::new();
        let result = solver.solve(&DMatrix::identity(2, 2), &DVector::zeros(3));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("LU".parse::<SolverMethod>().unwrap(), SolverMethod::Lu);
        assert_eq!("qr".parse::<SolverMethod>().unwrap(), SolverMethod::Qr);
        assert!("cg".parse::<SolverMethod>().is_err());
    }
}
