use thiserror::Error;

/// Errors raised while compiling or evaluating a scalar expression (C1).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unbound name '{0}'")]
    UnboundName(String),
    #[error("domain error evaluating '{0}': result was not finite")]
    Domain(String),
}

/// Errors raised by the dense linear-algebra layer (C2).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("matrix is not square ({0}x{1})")]
    NotSquare(usize, usize),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("matrix is singular (pivot magnitude below tolerance)")]
    Singular,
    #[error("non-finite value encountered during a linear-algebra operation")]
    NonFinite,
    #[error("eigendecomposition did not converge")]
    EigenNonConvergence,
}

/// Top-level error type threaded through every analysis entry point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error("model/vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("iteration did not converge within the allotted steps")]
    DidNotConverge,
    #[error("integration diverged (non-finite state)")]
    Diverged,
    #[error("requested resolution {0} is smaller than the minimum of 2")]
    ResolutionTooSmall(usize),
    #[error("operation was cancelled via the abort token")]
    Cancelled,
}

pub type KernelResult<T> = Result<T, KernelError>;
