use thiserror::Error;

/// Rejected layer configuration. Raised at construction and never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error(
        "stride ({width}, {height}) cancels out: an up/down combination that sums to zero has no defined output size"
    )]
    CancellingStride { width: isize, height: isize },
    /// Rejected even when the other component keeps the sum non-zero, e.g.
    /// `(0, 3)`: a zero-extent block has no defined output size.
    #[error("stride ({width}, {height}) has a zero component")]
    ZeroStride { width: isize, height: isize },
    #[error("scale factor must be finite and non-negative, got {0}")]
    InvalidScale(f64),
    #[error("stride block {width}x{height} is not representable in the element type")]
    UnrepresentableBlock { width: usize, height: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum LayerError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("{operation} requires a known input shape; supply one at construction or call forward first")]
    InvalidState { operation: &'static str },
    #[error("{operation}: expected a (batch, width, height, channels) tensor, got rank {rank}")]
    WrongRank { operation: &'static str, rank: usize },
    #[error("{operation}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        operation: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("upsampling {axis} extent {extent} by stride {stride} overflows the output size")]
    OutputTooLarge {
        axis: &'static str,
        extent: usize,
        stride: usize,
    },
    #[error("cannot downsample {axis} extent {extent} by stride {stride}")]
    IndivisibleExtent {
        axis: &'static str,
        extent: usize,
        stride: usize,
    },
}
