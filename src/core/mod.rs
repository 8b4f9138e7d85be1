use std::sync::Mutex;

use lazy_static::lazy_static;
use ndarray::prelude::*;

mod error;
pub mod upsample;

pub use self::error::{ConfigurationError, LayerError};

/// (batch, width, height, channels)
pub type Shape = (usize, usize, usize, usize);

lazy_static! {
    static ref COUNTER: Mutex<u64> = Mutex::new(0);
}

fn generate_sequential_layer_id(kind: &str) -> String {
    let mut num = COUNTER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *num += 1;
    format!("{}{}", kind, num)
}

pub(crate) fn shape_vec(shape: Shape) -> Vec<usize> {
    vec![shape.0, shape.1, shape.2, shape.3]
}

/// The calls a layer container makes on each of its layers.
///
/// `forward` caches whatever it needs on the layer itself; the upstream
/// gradient is loaded into the layer before `backward` runs, and `backward`
/// writes the gradient with respect to the layer's input into the buffer it
/// is handed.
pub trait Layer<A> {
    fn identifier(&self) -> &str;
    fn input_shape(&self) -> Option<Shape>;
    fn output_shape(&self) -> Option<Shape>;
    fn forward(&mut self, input: ArrayViewD<'_, A>) -> Result<(), LayerError>;
    fn backward(&mut self, input_gradient: ArrayViewMutD<'_, A>) -> Result<(), LayerError>;
    fn describe(&self) -> Result<String, LayerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_layer_ids_are_distinct() {
        let first = generate_sequential_layer_id("Upsample");
        let second = generate_sequential_layer_id("Upsample");
        assert!(first.starts_with("Upsample"));
        assert_ne!(first, second);
    }
}
