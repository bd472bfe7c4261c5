//! # Blob Module
//!
//! Defines the `Blob` struct holding one parameter array of a layer
//! (weights, biases, running statistics), together with the `.npy`
//! codec used for parameter dumps and the fillers used for blobs that
//! have no dump.

use ndarray::{ArrayD, IxDyn};

// --- Submodules ---
pub mod filler;
pub mod npy;

// --- Re-exports ---
pub use filler::Filler;
pub use npy::{read_npy, NpyArray, NpyError};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("Element count mismatch: blob has shape {expected:?}, source has shape {got:?}")]
    CountMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
}

/// Element type of every blob. Caffe stores parameters as `float`.
pub type BlobData = f32;

/// # Blob
///
/// A dense, row-major parameter array with a fixed shape. The shape is
/// decided when the owning network is instantiated; data loaded later is
/// reshaped to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    data: ArrayD<BlobData>,
}

impl Blob {
    /// Creates a blob from an existing array.
    pub fn new(data: ArrayD<BlobData>) -> Self {
        Blob { data }
    }

    /// Creates a zero-filled blob.
    pub fn zeros(shape: &[usize]) -> Self {
        Blob::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Creates a blob with every element set to `value`.
    pub fn full(shape: &[usize], value: BlobData) -> Self {
        Blob::new(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Returns the shape of the blob.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the total number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Read-only access to the underlying array.
    pub fn data(&self) -> &ArrayD<BlobData> {
        &self.data
    }

    /// Elements in row-major order.
    pub fn to_vec(&self) -> Vec<BlobData> {
        self.data.iter().copied().collect()
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: BlobData) {
        self.data.fill(value);
    }

    /// Copies `source` into the blob, keeping the blob's shape.
    ///
    /// The source must hold the same number of elements; it is read in
    /// row-major order and laid out in the blob's shape. This mirrors
    /// assigning a dumped array into an already allocated parameter.
    pub fn assign(&mut self, source: &ArrayD<BlobData>) -> Result<(), BlobError> {
        if source.len() != self.count() {
            return Err(BlobError::CountMismatch {
                expected: self.shape().to_vec(),
                got: source.shape().to_vec(),
            });
        }
        if source.shape() == self.shape() {
            self.data.assign(source);
        } else {
            let flat: Vec<BlobData> = source.iter().copied().collect();
            self.data = ArrayD::from_shape_vec(IxDyn(self.shape()), flat)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_assign_same_shape() {
        let mut blob = Blob::zeros(&[2, 2]);
        let src = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        blob.assign(&src).unwrap();
        assert_eq!(blob.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_assign_reshapes_by_count() {
        let mut blob = Blob::zeros(&[4, 1, 1, 1]);
        let src = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        blob.assign(&src).unwrap();
        assert_eq!(blob.shape(), &[4, 1, 1, 1]);
        assert_eq!(blob.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_assign_count_mismatch() {
        let mut blob = Blob::zeros(&[3]);
        let src = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        let err = blob.assign(&src).unwrap_err();
        assert!(matches!(err, BlobError::CountMismatch { .. }));
    }

    #[test]
    fn test_full_and_fill() {
        let mut blob = Blob::full(&[1], 7.0);
        assert_eq!(blob.to_vec(), vec![7.0]);
        blob.fill(1.0);
        assert_eq!(blob.to_vec(), vec![1.0]);
    }
}
