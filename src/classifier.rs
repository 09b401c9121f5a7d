use image::GrayImage;

use crate::error::SudokuError;

/// Trait that digit classification backends implement.
///
/// A backend receives a single-channel square canvas (side length
/// `ExtractionConfig::canvas_size`, glyph strokes as non-zero pixels on a
/// black background) and returns the digit it depicts, in `0..=9`. Backends
/// only run the model; the blank-cell short circuit and the 0/4 remap are
/// pipeline concerns and must not be duplicated here.
pub trait DigitClassifier: Send + Sync {
    /// Returns the backend identifier (e.g., "rten")
    fn name(&self) -> &'static str;

    /// Classify one glyph canvas into a digit in `0..=9`
    fn classify(&self, canvas: &GrayImage) -> Result<u8, SudokuError>;
}
