//! Nearest-neighbor upsampling over (batch, width, height, channels) tensors.
//!
//! A positive stride replicates every source cell into a `|sw| × |sh|` block.
//! A negative stride runs the layer in reverse: every `|sw| × |sh|` block of
//! the input is summed into a single cell.

use std::fmt;

use log::debug;
use ndarray::prelude::*;
use num_traits::{Float, ToPrimitive};

use super::{
    generate_sequential_layer_id, shape_vec, ConfigurationError, Layer, LayerError, Shape,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    /// The same stride along width and height.
    Uniform(isize),
    /// (width, height)
    Pair(isize, isize),
}

impl Stride {
    pub fn components(&self) -> (isize, isize) {
        match *self {
            Stride::Uniform(stride) => (stride, stride),
            Stride::Pair(width, height) => (width, height),
        }
    }
}

impl From<isize> for Stride {
    fn from(stride: isize) -> Self {
        Stride::Uniform(stride)
    }
}

impl From<(isize, isize)> for Stride {
    fn from((width, height): (isize, isize)) -> Self {
        Stride::Pair(width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Upsample,
    /// the reversed mode, selected by a stride whose components sum negative
    Downsample,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Mode::Upsample => "upsample",
            Mode::Downsample => "downsample",
        })
    }
}

/// How upsample mode gathers the gradient of a replicated block back onto its
/// source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackwardRule {
    /// Average over the block. Backward applied to the forward output gives
    /// back the forward input.
    #[default]
    BlockMean,
    /// Sum over the block: the transpose of replication, i.e. the training
    /// gradient.
    BlockSum,
}

#[derive(Debug, Clone)]
pub struct UpsampleConfiguration<A> {
    pub input_shape: Option<Shape>,
    pub stride: Stride,
    pub scales: A,
    pub backward_rule: BackwardRule,
}

impl<A: Float> Default for UpsampleConfiguration<A> {
    fn default() -> Self {
        Self {
            input_shape: None,
            stride: Stride::Uniform(2),
            scales: A::one(),
            backward_rule: BackwardRule::default(),
        }
    }
}

#[derive(Debug)]
pub struct UpsampleLayer<A> {
    identifier: String,
    input_shape: Option<Shape>,
    stride: Stride,
    mode: Mode,
    // stride magnitudes (width, height)
    block: (usize, usize),
    block_area: A,
    scales: A,
    backward_rule: BackwardRule,
    output: Option<Array4<A>>,
    delta: Option<Array4<A>>,
}

fn infer_output_shape(
    mode: Mode,
    (sw, sh): (usize, usize),
    (batch, width, height, channels): Shape,
) -> Result<Shape, LayerError> {
    match mode {
        Mode::Upsample => {
            let scaled = |axis: &'static str, extent: usize, stride: usize| {
                extent
                    .checked_mul(stride)
                    .ok_or(LayerError::OutputTooLarge {
                        axis,
                        extent,
                        stride,
                    })
            };
            Ok((
                batch,
                scaled("width", width, sw)?,
                scaled("height", height, sh)?,
                channels,
            ))
        }
        Mode::Downsample => {
            for (axis, extent, stride) in [("width", width, sw), ("height", height, sh)] {
                if extent % stride != 0 {
                    return Err(LayerError::IndivisibleExtent {
                        axis,
                        extent,
                        stride,
                    });
                }
            }
            Ok((batch, width / sw, height / sh, channels))
        }
    }
}

/// Every output cell copies the source cell whose block it falls in. `shape`
/// is an already validated output shape.
fn replicate<A: Float>(
    source: ArrayView4<'_, A>,
    (sw, sh): (usize, usize),
    factor: A,
    shape: Shape,
) -> Array4<A> {
    Array4::from_shape_fn(shape, |(n, i, j, k)| {
        source[[n, i / sw, j / sh, k]] * factor
    })
}

/// Every output cell is the sum of one `sw × sh` block of the source.
fn block_sum<A: Float>(source: ArrayView4<'_, A>, (sw, sh): (usize, usize), factor: A) -> Array4<A> {
    let (batch, width, height, channels) = source.dim();
    Array4::from_shape_fn(
        (batch, width / sw, height / sh, channels),
        |(n, i, j, k)| {
            source
                .slice(s![n, i * sw..(i + 1) * sw, j * sh..(j + 1) * sh, k])
                .sum()
                * factor
        },
    )
}

impl<A: Float> UpsampleLayer<A> {
    pub fn new(
        identifier: Option<&str>,
        configuration: UpsampleConfiguration<A>,
    ) -> Result<Self, LayerError> {
        let UpsampleConfiguration {
            input_shape,
            stride,
            scales,
            backward_rule,
        } = configuration;

        let (width, height) = stride.components();
        let mode = match width.saturating_add(height).signum() {
            1 => Mode::Upsample,
            -1 => Mode::Downsample,
            _ => return Err(ConfigurationError::CancellingStride { width, height }.into()),
        };
        if width == 0 || height == 0 {
            return Err(ConfigurationError::ZeroStride { width, height }.into());
        }
        if !scales.is_finite() || scales < A::zero() {
            return Err(ConfigurationError::InvalidScale(scales.to_f64().unwrap_or(f64::NAN)).into());
        }

        let block = (width.unsigned_abs(), height.unsigned_abs());
        let block_area = block
            .0
            .checked_mul(block.1)
            .and_then(num_traits::cast)
            .ok_or(ConfigurationError::UnrepresentableBlock {
                width: block.0,
                height: block.1,
            })?;
        if let Some(shape) = input_shape {
            infer_output_shape(mode, block, shape)?;
        }

        let identifier = match identifier {
            Some(identifier) => identifier.to_owned(),
            None => generate_sequential_layer_id("Upsample"),
        };
        debug!(
            "creating {} layer {} with stride {:?} and input shape {:?}",
            mode, identifier, stride, input_shape
        );
        Ok(Self {
            identifier,
            input_shape,
            stride,
            mode,
            block,
            block_area,
            scales,
            backward_rule,
            output: None,
            delta: None,
        })
    }

    pub fn with_stride(stride: Stride) -> Result<Self, LayerError> {
        Self::new(
            None,
            UpsampleConfiguration {
                stride,
                ..UpsampleConfiguration::default()
            },
        )
    }

    /// The stride in the form it was configured with.
    pub fn stride(&self) -> Stride {
        self.stride
    }

    pub fn scales(&self) -> A {
        self.scales
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_reversed(&self) -> bool {
        self.mode == Mode::Downsample
    }

    pub fn backward_rule(&self) -> BackwardRule {
        self.backward_rule
    }

    pub fn output_shape_for(&self, input_shape: Shape) -> Result<Shape, LayerError> {
        infer_output_shape(self.mode, self.block, input_shape)
    }

    pub fn output(&self) -> Option<&Array4<A>> {
        self.output.as_ref()
    }

    pub fn delta(&self) -> Option<&Array4<A>> {
        self.delta.as_ref()
    }

    /// The gradient with respect to this layer's output, allocated as zeros if
    /// forward has not run yet.
    pub fn delta_mut(&mut self) -> Result<&mut Array4<A>, LayerError> {
        let input_shape = self.input_shape.ok_or(LayerError::InvalidState {
            operation: "delta",
        })?;
        let output_shape = infer_output_shape(self.mode, self.block, input_shape)?;
        Ok(self
            .delta
            .get_or_insert_with(|| Array4::zeros(output_shape)))
    }

    pub fn set_delta(&mut self, delta: ArrayD<A>) -> Result<(), LayerError> {
        let input_shape = self.input_shape.ok_or(LayerError::InvalidState {
            operation: "set_delta",
        })?;
        let output_shape = infer_output_shape(self.mode, self.block, input_shape)?;
        let rank = delta.ndim();
        let delta = delta
            .into_dimensionality::<Ix4>()
            .map_err(|_| LayerError::WrongRank {
                operation: "set_delta",
                rank,
            })?;
        if delta.dim() != output_shape {
            return Err(LayerError::ShapeMismatch {
                operation: "set_delta",
                expected: shape_vec(output_shape),
                actual: delta.shape().to_vec(),
            });
        }
        self.delta = Some(delta);
        Ok(())
    }

    /// Adopts `shape` as the input shape if none is known yet, and returns the
    /// matching output shape. A shape that disagrees with the established one
    /// is rejected and leaves the layer untouched.
    fn establish_input_shape(&mut self, shape: Shape) -> Result<Shape, LayerError> {
        match self.input_shape {
            Some(known) if known != shape => Err(LayerError::ShapeMismatch {
                operation: "forward",
                expected: shape_vec(known),
                actual: shape_vec(shape),
            }),
            Some(known) => infer_output_shape(self.mode, self.block, known),
            None => {
                let output_shape = infer_output_shape(self.mode, self.block, shape)?;
                debug!("{} inferred input shape {:?}", self.identifier, shape);
                self.input_shape = Some(shape);
                Ok(output_shape)
            }
        }
    }
}

impl<A: Float> Layer<A> for UpsampleLayer<A> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn input_shape(&self) -> Option<Shape> {
        self.input_shape
    }

    fn output_shape(&self) -> Option<Shape> {
        self.input_shape
            .and_then(|shape| infer_output_shape(self.mode, self.block, shape).ok())
    }

    fn forward(&mut self, input: ArrayViewD<'_, A>) -> Result<(), LayerError> {
        let rank = input.ndim();
        let input = input
            .into_dimensionality::<Ix4>()
            .map_err(|_| LayerError::WrongRank {
                operation: "forward",
                rank,
            })?;
        let output_shape = self.establish_input_shape(input.dim())?;
        let output = match self.mode {
            Mode::Upsample => replicate(input, self.block, self.scales, output_shape),
            Mode::Downsample => block_sum(input, self.block, self.scales),
        };
        debug_assert_eq!(output.dim(), output_shape);
        self.output = Some(output);
        self.delta = Some(Array4::zeros(output_shape));
        Ok(())
    }

    fn backward(&mut self, input_gradient: ArrayViewMutD<'_, A>) -> Result<(), LayerError> {
        let input_shape = self.input_shape.ok_or(LayerError::InvalidState {
            operation: "backward",
        })?;
        let rank = input_gradient.ndim();
        let mut input_gradient =
            input_gradient
                .into_dimensionality::<Ix4>()
                .map_err(|_| LayerError::WrongRank {
                    operation: "backward",
                    rank,
                })?;
        if input_gradient.dim() != input_shape {
            return Err(LayerError::ShapeMismatch {
                operation: "backward",
                expected: shape_vec(input_shape),
                actual: input_gradient.shape().to_vec(),
            });
        }

        let (mode, block, scales) = (self.mode, self.block, self.scales);
        let factor = match self.backward_rule {
            BackwardRule::BlockMean => scales / self.block_area,
            BackwardRule::BlockSum => scales,
        };
        let delta = self.delta_mut()?;
        let gradient = match mode {
            Mode::Upsample => block_sum(delta.view(), block, factor),
            // the transpose of a block sum is a broadcast
            Mode::Downsample => replicate(delta.view(), block, scales, input_shape),
        };
        input_gradient.assign(&gradient);
        Ok(())
    }

    fn describe(&self) -> Result<String, LayerError> {
        let input_shape = self.input_shape.ok_or(LayerError::InvalidState {
            operation: "describe",
        })?;
        let (batch, width, height, channels) = input_shape;
        let (out_batch, out_width, out_height, out_channels) =
            infer_output_shape(self.mode, self.block, input_shape)?;
        Ok(format!(
            "{:<10} {:>3}x{:<3} scale {:.2}  {:>5} x{:>4} x{:>4} x{:>4}  ->  {:>5} x{:>4} x{:>4} x{:>4}",
            self.mode,
            self.block.0,
            self.block.1,
            self.scales.to_f64().unwrap_or(f64::NAN),
            batch,
            width,
            height,
            channels,
            out_batch,
            out_width,
            out_height,
            out_channels,
        ))
    }
}
