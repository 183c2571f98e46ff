//! Error types for the Voltaic simulation engine.
//!
//! This module provides a unified error type [`SimError`] that covers
//! all error conditions that can occur during circuit analysis, matrix
//! factorization, and timestep integration.

use thiserror::Error;

use crate::circuit::ElementId;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all Voltaic operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    // ============ Topology Errors ============
    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    /// Element lookup by id failed
    #[error("Element {id} not found in circuit")]
    ElementNotFound { id: ElementId },

    /// Element parameters or wiring are inconsistent
    #[error("Invalid element '{name}': {message}")]
    InvalidElement { name: String, message: String },

    // ============ Numerical Errors ============
    /// A matrix row has no nonzero entries (nothing drives this unknown)
    #[error("Matrix row {row} is empty ({location}) - circuit is not solvable")]
    EmptyMatrixRow { row: usize, location: String },

    /// No usable pivot was found while factoring
    #[error("Singular matrix at row {row} ({location}) - circuit is not solvable")]
    SingularMatrix { row: usize, location: String },

    /// Newton-Raphson iteration did not converge
    #[error("Circuit will not converge after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    // ============ Configuration Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },
}

impl SimError {
    /// Create a convergence failure error
    pub fn convergence_failure(iterations: usize, residual: f64) -> Self {
        Self::ConvergenceFailure {
            iterations,
            residual,
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create an invalid element error
    pub fn invalid_element(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidElement {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the timestep controller may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyMatrixRow { .. } | Self::SingularMatrix { .. } | Self::ConvergenceFailure { .. }
        )
    }
}
