//! Error type shared by the library and the `envfit` binary.
//!
//! Every variant maps to a process exit code so `main` can stay tiny.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Invalid settings: unknown shape/method, order above the shape maximum,
    /// non-positive goodness-of-fit dof, malformed ranges or overrides.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or empty input dataset.
    #[error("data error: {0}")]
    Data(String),

    /// Non-finite likelihoods, singular matrices and similar numerical failures.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// The robust fit stayed unstable up to the restart ceiling.
    #[error(
        "fit of {model} is unstable: tried {restarts} random initialisations without acceptable convergence"
    )]
    NonConvergence { model: String, restarts: usize },

    /// An internal invariant was broken (e.g. non-increasing dof in a family scan).
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Io(_) => 2,
            AppError::Data(_) => 3,
            AppError::Numerical(_) | AppError::Invariant(_) => 4,
            AppError::NonConvergence { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(AppError::config("x").exit_code(), 2);
        assert_eq!(AppError::data("x").exit_code(), 3);
        assert_eq!(AppError::numerical("x").exit_code(), 4);
        let fatal = AppError::NonConvergence {
            model: "Power2".to_string(),
            restarts: 1024,
        };
        assert_eq!(fatal.exit_code(), 5);
        assert!(fatal.to_string().contains("1024"));
    }
}
