//! # Neural Network Layer Modules
//!
//! One description per supported Caffe layer type.

// --- Re-export Layer Implementations ---
pub mod input;
pub use input::DummyData;

pub mod conv;
pub use conv::Convolution;

pub mod pooling;
pub use pooling::{PoolMethod, Pooling};

pub mod normalization;
pub use normalization::{BatchNorm, Scale};

pub mod activation;
pub use activation::{ReLU, Softmax, TanH};

pub mod flatten;
pub use flatten::Flatten;

pub mod linear;
pub use linear::InnerProduct;

// Geometry shared by convolution and pooling
pub mod window;
pub use window::Window;
