use std::path::PathBuf;

use crate::Args;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: Option<PathBuf>,
    pub max_file_size: usize,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            model_path: args.model_path,
            max_file_size: args.max_file_size,
        }
    }
}

/// Tunable constants of the extraction pipeline.
///
/// The defaults were calibrated against photographs of printed puzzles taken
/// with a phone camera under indoor lighting. Recalibrating for a different
/// capture setup means changing these values, not the pipeline code.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Working canvas height the input is resized to, preserving aspect ratio.
    pub target_height: u32,
    /// Border rows/columns whose brightest channel stays at or below this
    /// value are cropped away during normalization.
    pub crop_threshold: u8,
    /// Sigma of the Gaussian blur applied before thresholding.
    pub blur_sigma: f32,
    /// Side length of the adaptive-threshold neighborhood. Must be odd.
    pub threshold_block_size: u32,
    /// Bias subtracted from the neighborhood mean when binarizing.
    pub threshold_bias: i16,
    /// Side length of the square canvas handed to the digit classifier.
    pub canvas_size: u32,
    /// Blank border, in pixels, kept around a glyph on its canvas.
    pub glyph_margin: u32,
    /// Connected features with a bounding-box area at or below this pixel
    /// count are treated as print noise and the cell as blank.
    pub min_glyph_area: u32,
    /// Remap a predicted 0 on a non-blank canvas to 4. Compensates for a
    /// recurring 0/4 confusion of the bundled model; disable when swapping in
    /// a classifier with different confusion characteristics.
    pub remap_zero_to_four: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target_height: 600,
            crop_threshold: 50,
            blur_sigma: 1.7,
            threshold_block_size: 11,
            threshold_bias: 2,
            canvas_size: 28,
            glyph_margin: 4,
            min_glyph_area: 100,
            remap_zero_to_four: true,
        }
    }
}
