use std::env;
use std::error::Error;

use log::info;
use ndarray::prelude::*;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use upsample::{Layer, Stride, UpsampleConfiguration, UpsampleLayer};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = env::args().collect::<Vec<_>>();

    let instructions =
        "pass a stride (`2`, `-2`) or a width and height stride (`3 -2`); the default is 2";

    let stride = match args.len() {
        1 => Stride::Uniform(2),
        2 => Stride::Uniform(args[1].parse()?),
        3 => Stride::Pair(args[1].parse()?, args[2].parse()?),
        _ => {
            println!("{}", instructions);
            return Ok(());
        }
    };

    let mut layer = UpsampleLayer::<f32>::new(
        Some("demo_upsample"),
        UpsampleConfiguration {
            stride,
            ..UpsampleConfiguration::default()
        },
    )?;

    // four blocks along each spatial axis, so downsampling divides evenly
    let (sw, sh) = stride.components();
    let input = Array::random(
        (2, 4 * sw.unsigned_abs(), 4 * sh.unsigned_abs(), 3),
        Uniform::new(0., 1.),
    );
    info!("forward on input of shape {:?}", input.dim());
    layer.forward(input.view().into_dyn())?;
    println!("{}", layer.describe()?);

    let output = layer
        .output()
        .ok_or("forward should store an output")?
        .clone();
    layer.set_delta(output.into_dyn())?;
    let mut gradient = Array4::<f32>::zeros(input.dim());
    layer.backward(gradient.view_mut().into_dyn())?;

    let discrepancy = (&gradient - &input)
        .iter()
        .fold(0f32, |worst, d| worst.max(d.abs()));
    println!(
        "max |backward(forward(x)) - x| = {} ({} mode)",
        discrepancy,
        layer.mode()
    );
    Ok(())
}
