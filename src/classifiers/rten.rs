//! rten digit classifier backend
//!
//! Pure Rust inference over a pretrained 10-way digit CNN. No system
//! dependencies required. Downloads the model automatically on first use
//! unless an explicit path is configured.

use crate::classifier::DigitClassifier;
use crate::config::Config;
use crate::error::SudokuError;
use image::GrayImage;
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Default model URL; a 28x28 grayscale digit CNN exported for rten
const DIGIT_MODEL_URL: &str =
    "https://superdoku-models.s3-accelerate.amazonaws.com/digit-classifier.rten";

/// Side length of the model's expected input canvas
const MODEL_INPUT_SIZE: u32 = 28;

/// Number of output classes (digits 0-9)
const MODEL_CLASSES: usize = 10;

static INSTANCE: OnceLock<Arc<RtenClassifier>> = OnceLock::new();

/// Digit classifier wrapping an rten model
pub struct RtenClassifier {
    model: Model,
}

impl RtenClassifier {
    /// Create a new classifier, downloading the model if needed
    pub fn new(config: &Config) -> Result<Self, SudokuError> {
        tracing::info!("Initializing rten digit classifier...");

        let model_path = match &config.model_path {
            Some(path) => path.clone(),
            None => ensure_model_downloaded(DIGIT_MODEL_URL, "digit-classifier.rten")?,
        };

        let model = Model::load_file(&model_path).map_err(|e| {
            SudokuError::ClassifierInit(format!("Failed to load digit model: {}", e))
        })?;

        tracing::info!("rten digit classifier initialized from {:?}", model_path);

        Ok(Self { model })
    }

    /// Process-wide instance, loaded lazily on first use.
    ///
    /// Model loading is expensive; every later call returns the same
    /// instance and never re-initializes.
    pub fn global(config: &Config) -> Result<Arc<Self>, SudokuError> {
        if let Some(classifier) = INSTANCE.get() {
            return Ok(Arc::clone(classifier));
        }
        let built = Arc::new(Self::new(config)?);
        Ok(Arc::clone(INSTANCE.get_or_init(|| built)))
    }
}

impl DigitClassifier for RtenClassifier {
    fn name(&self) -> &'static str {
        "rten"
    }

    fn classify(&self, canvas: &GrayImage) -> Result<u8, SudokuError> {
        let (width, height) = canvas.dimensions();
        if width != MODEL_INPUT_SIZE || height != MODEL_INPUT_SIZE {
            return Err(SudokuError::ModelInference(format!(
                "Expected {}x{} canvas, got {}x{}",
                MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, width, height
            )));
        }

        // NCHW float input, pixel values normalized to [0, 1]
        let pixels: Vec<f32> = canvas.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        let input = NdTensor::from_data(
            [1, 1, MODEL_INPUT_SIZE as usize, MODEL_INPUT_SIZE as usize],
            pixels,
        );

        let output = self
            .model
            .run_one(input.into(), None)
            .map_err(|e| SudokuError::ModelInference(format!("Model run failed: {}", e)))?;

        let scores: NdTensor<f32, 2> = output.try_into().map_err(|_| {
            SudokuError::ModelInference("Model returned unexpected output shape".to_string())
        })?;

        if scores.len() != MODEL_CLASSES {
            return Err(SudokuError::ModelInference(format!(
                "Expected {} class scores, got {}",
                MODEL_CLASSES,
                scores.len()
            )));
        }

        let (digit, _) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| {
                SudokuError::ModelInference("Model produced no class scores".to_string())
            })?;

        Ok(digit as u8)
    }
}

/// Ensure the model is downloaded and return its path
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<PathBuf, SudokuError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("superdoku");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        SudokuError::ClassifierInit(format!("Failed to create cache directory: {}", e))
    })?;

    let model_path = cache_dir.join(filename);

    if !model_path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &model_path)?;
        tracing::info!("Downloaded {} to {:?}", filename, model_path);
    } else {
        tracing::info!("Using cached model from {:?}", model_path);
    }

    Ok(model_path)
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path) -> Result<(), SudokuError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| SudokuError::ClassifierInit(format!("Failed to download model: {}", e)))?;

    let mut file = File::create(path).map_err(|e| {
        SudokuError::ClassifierInit(format!("Failed to create model file: {}", e))
    })?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        SudokuError::ClassifierInit(format!("Failed to read response body: {}", e))
    })?;

    file.write_all(&buffer)
        .map_err(|e| SudokuError::ClassifierInit(format!("Failed to write model file: {}", e)))?;

    Ok(())
}
