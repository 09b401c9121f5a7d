//! Digit classifier backends
//!
//! Implementations of the [`DigitClassifier`](crate::classifier::DigitClassifier)
//! trait. The production backend runs a pretrained convolutional digit model
//! through the rten inference runtime.

pub mod rten;
