//! # Blob Fillers
//!
//! Initial values for parameter blobs that have no dump on disk. The
//! defaults reproduce what a freshly instantiated Caffe layer holds.

use super::{Blob, BlobData};
use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::Deserialize;

/// How to initialize a parameter blob.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filler {
    /// Every element set to `value`.
    Constant {
        #[serde(default)]
        value: BlobData,
    },
    /// Uniform in `[min, max]`.
    Uniform { min: BlobData, max: BlobData },
    /// Uniform in `[-s, s]` with `s = sqrt(3 / fan_in)`, where `fan_in` is
    /// the element count divided by the first dimension.
    Xavier,
}

impl Default for Filler {
    fn default() -> Self {
        Filler::Constant { value: 0.0 }
    }
}

impl Filler {
    pub fn constant(value: BlobData) -> Self {
        Filler::Constant { value }
    }

    /// Allocates a blob of `shape` initialized by this filler.
    pub fn fill<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Blob {
        match *self {
            Filler::Constant { value } => Blob::full(shape, value),
            Filler::Uniform { min, max } => {
                let (low, high) = if min <= max { (min, max) } else { (max, min) };
                Blob::new(uniform_data(shape, low, high, rng))
            }
            Filler::Xavier => {
                let count: usize = shape.iter().product();
                let fan_in = match shape.first() {
                    Some(&n) if n > 0 => count / n,
                    _ => count,
                };
                if fan_in == 0 {
                    return Blob::zeros(shape);
                }
                let scale = (3.0 / fan_in as BlobData).sqrt();
                Blob::new(uniform_data(shape, -scale, scale, rng))
            }
        }
    }
}

fn uniform_data<R: Rng + ?Sized>(
    shape: &[usize],
    low: BlobData,
    high: BlobData,
    rng: &mut R,
) -> ArrayD<BlobData> {
    let range = Uniform::new_inclusive(low, high);
    ArrayD::from_shape_simple_fn(IxDyn(shape), || range.sample(rng))
}
