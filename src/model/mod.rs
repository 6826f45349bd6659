//! Model module
//!
//! - `cnn`: the trainable Burn module
//! - `frozen`: backend-independent inference weights produced by export

pub mod cnn;
pub mod frozen;

pub use cnn::{ConvBlock, RecycleClassifier, RecycleClassifierConfig};
pub use frozen::{checked_product, ClassifierLayout, FrozenClassifier, NamedTensor, MAX_LAYOUT_DIM};
