pub mod core;

pub use crate::core::upsample::{
    BackwardRule, Mode, Stride, UpsampleConfiguration, UpsampleLayer,
};
pub use crate::core::{ConfigurationError, Layer, LayerError, Shape};
