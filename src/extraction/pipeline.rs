use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use serde::Serialize;

use crate::classifier::DigitClassifier;
use crate::config::ExtractionConfig;
use crate::error::SudokuError;

use super::grid::PuzzleGrid;
use super::steps::{enhance, glyph, locate, normalize, partition};

/// Timing information for a single pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of a full pipeline run including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    /// The recognized puzzle
    pub grid: PuzzleGrid,
    /// Total pipeline time in milliseconds
    pub total_time_ms: u64,
    /// Individual stage timings
    pub stages: Vec<StageTiming>,
}

/// The image-to-grid extraction pipeline.
///
/// Stages run strictly in sequence, each consuming the previous stage's
/// output: normalize, enhance, locate/rectify, partition, per-cell glyph
/// extraction, classification, assembly. A run holds no state between
/// invocations; recognizing the same input twice yields the same grid.
pub struct SudokuExtractor {
    classifier: Arc<dyn DigitClassifier>,
    config: ExtractionConfig,
}

impl SudokuExtractor {
    pub fn new(classifier: Arc<dyn DigitClassifier>) -> Self {
        Self::with_config(classifier, ExtractionConfig::default())
    }

    pub fn with_config(classifier: Arc<dyn DigitClassifier>, config: ExtractionConfig) -> Self {
        Self { classifier, config }
    }

    /// Identifier of the classification backend in use
    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Recognize a puzzle from an image file
    pub fn recognize_path(&self, path: &Path) -> Result<ExtractionReport, SudokuError> {
        let image = image::open(path).map_err(|e| SudokuError::Decode(e.to_string()))?;
        self.recognize(&image)
    }

    /// Recognize a puzzle from encoded image bytes (PNG, JPEG, ...)
    pub fn recognize_bytes(&self, data: &[u8]) -> Result<ExtractionReport, SudokuError> {
        let image =
            image::load_from_memory(data).map_err(|e| SudokuError::Decode(e.to_string()))?;
        self.recognize(&image)
    }

    /// Recognize a puzzle from a decoded image
    pub fn recognize(&self, image: &DynamicImage) -> Result<ExtractionReport, SudokuError> {
        let start = Instant::now();
        let mut stages = Vec::new();

        let normalized = run_stage("normalize", &mut stages, || {
            Ok(normalize::apply(image, &self.config))
        })?;
        let gray = normalized.to_luma8();

        // Thickened lines for gross shape analysis only; the rectified copy
        // below is resampled from the untouched grayscale.
        let enhanced = run_stage("enhance", &mut stages, || {
            Ok(enhance::binarize(&gray, true, &self.config))
        })?;

        let rectified = run_stage("locate", &mut stages, || {
            let corners = locate::find_corners(&enhanced)?;
            locate::rectify(&gray, &corners)
        })?;

        let canvases = run_stage("extract", &mut stages, || {
            let cells = partition::cell_boxes(rectified.width());
            let cell_source = enhance::binarize(&rectified, false, &self.config);
            Ok(cells
                .iter()
                .map(|cell| glyph::extract_digit(&cell_source, cell, &self.config))
                .collect::<Vec<_>>())
        })?;

        let digits = run_stage("classify", &mut stages, || self.classify_cells(&canvases))?;

        let grid = PuzzleGrid::from_digits(&digits);
        tracing::debug!("Recognized puzzle:\n{}", grid);

        Ok(ExtractionReport {
            grid,
            total_time_ms: start.elapsed().as_millis() as u64,
            stages,
        })
    }

    /// Classify every cell canvas into a digit.
    ///
    /// Blank canvases short-circuit to 0 without touching the model. A model
    /// failure on any single cell fails the whole grid; a partially guessed
    /// puzzle is worse than an explicit error.
    fn classify_cells(&self, canvases: &[GrayImage]) -> Result<Vec<u8>, SudokuError> {
        let mut digits = Vec::with_capacity(canvases.len());
        for canvas in canvases {
            if glyph::is_blank(canvas) {
                digits.push(0);
                continue;
            }

            let mut digit = self.classifier.classify(canvas)?;
            if digit == 0 && self.config.remap_zero_to_four {
                // The bundled model habitually confuses printed 4s with 0s,
                // and a true 0 never appears on a non-blank cell.
                digit = 4;
            }
            digits.push(digit);
        }
        Ok(digits)
    }
}

fn run_stage<T, F>(
    name: &str,
    timings: &mut Vec<StageTiming>,
    stage_fn: F,
) -> Result<T, SudokuError>
where
    F: FnOnce() -> Result<T, SudokuError>,
{
    let stage_start = Instant::now();
    let result = stage_fn()?;
    let time_ms = stage_start.elapsed().as_millis() as u64;
    tracing::debug!("Stage {} completed in {}ms", name, time_ms);
    timings.push(StageTiming {
        name: name.to_string(),
        time_ms,
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::rect::Rect;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CANONICAL_PUZZLE: [u8; 81] = [
        5, 3, 0, 0, 7, 0, 0, 0, 0, //
        6, 0, 0, 1, 9, 5, 0, 0, 0, //
        0, 9, 8, 0, 0, 0, 0, 6, 0, //
        8, 0, 0, 0, 6, 0, 0, 0, 3, //
        4, 0, 0, 8, 0, 3, 0, 0, 1, //
        7, 0, 0, 0, 2, 0, 0, 0, 6, //
        0, 6, 0, 0, 0, 0, 2, 8, 0, //
        0, 0, 0, 4, 1, 9, 0, 0, 5, //
        0, 0, 0, 0, 8, 0, 0, 7, 9, //
    ];

    // ------------------------------------------------------------------
    // Synthetic puzzle rendering
    // ------------------------------------------------------------------

    /// 5x7 block font for the rendered test puzzles. Every digit is a single
    /// 4-connected stroke and covers the center of its glyph box, so the
    /// cell extractor's central scan always finds it.
    const DIGIT_FONT: [[&str; 7]; 10] = [
        [
            "XXXXX", "X...X", "X...X", "X...X", "X...X", "X...X", "XXXXX",
        ],
        [
            "..X..", ".XX..", "..X..", "..X..", "..X..", "..X..", ".XXX.",
        ],
        [
            "XXXXX", "....X", "....X", "XXXXX", "X....", "X....", "XXXXX",
        ],
        [
            "XXXXX", "....X", "....X", "XXXXX", "....X", "....X", "XXXXX",
        ],
        [
            "X...X", "X...X", "X...X", "XXXXX", "....X", "....X", "....X",
        ],
        [
            "XXXXX", "X....", "X....", "XXXXX", "....X", "....X", "XXXXX",
        ],
        [
            "XXXXX", "X....", "X....", "XXXXX", "X...X", "X...X", "XXXXX",
        ],
        [
            "XXXXX", "....X", "...XX", "...X.", "..XX.", "..X..", "..X..",
        ],
        [
            "XXXXX", "X...X", "X...X", "XXXXX", "X...X", "X...X", "XXXXX",
        ],
        [
            "XXXXX", "X...X", "X...X", "XXXXX", "....X", "....X", "XXXXX",
        ],
    ];

    const GLYPH_SCALE: u32 = 6;

    fn render_glyph(img: &mut RgbImage, digit: u8, center_x: u32, center_y: u32) {
        let x0 = center_x - 5 * GLYPH_SCALE / 2;
        let y0 = center_y - 7 * GLYPH_SCALE / 2;
        for (row, line) in DIGIT_FONT[digit as usize].iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                if ch != 'X' {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        img.put_pixel(
                            x0 + col as u32 * GLYPH_SCALE + dx,
                            y0 + row as u32 * GLYPH_SCALE + dy,
                            Rgb([0, 0, 0]),
                        );
                    }
                }
            }
        }
    }

    /// Render a clean fronto-parallel 600x600 photo of a puzzle
    fn render_puzzle(digits: &[u8; 81]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(600, 600, Rgb([255, 255, 255]));
        let inset = 20u32;
        let side = 560u32;

        // 3 px grid lines
        for i in 0..=9u32 {
            let offset = inset + i * side / 9;
            for t in offset - 1..=offset + 1 {
                for v in inset - 1..=inset + side + 1 {
                    img.put_pixel(t, v, Rgb([0, 0, 0]));
                    img.put_pixel(v, t, Rgb([0, 0, 0]));
                }
            }
        }

        for row in 0..9u32 {
            for col in 0..9u32 {
                let digit = digits[(row * 9 + col) as usize];
                if digit != 0 {
                    let center_x = inset + (2 * col + 1) * side / 18;
                    let center_y = inset + (2 * row + 1) * side / 18;
                    render_glyph(&mut img, digit, center_x, center_y);
                }
            }
        }

        DynamicImage::ImageRgb8(img)
    }

    /// Render one isolated cell the way it looks inside the grid
    fn render_cell(digit: u8) -> GrayImage {
        let mut img = RgbImage::from_pixel(62, 62, Rgb([255, 255, 255]));
        render_glyph(&mut img, digit, 31, 31);
        DynamicImage::ImageRgb8(img).to_luma8()
    }

    // ------------------------------------------------------------------
    // Stub classifiers
    // ------------------------------------------------------------------

    /// Always predicts the same digit and counts its invocations
    struct CountingStub {
        digit: u8,
        calls: AtomicUsize,
    }

    impl CountingStub {
        fn new(digit: u8) -> Self {
            Self {
                digit,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DigitClassifier for CountingStub {
        fn name(&self) -> &'static str {
            "counting-stub"
        }

        fn classify(&self, _canvas: &GrayImage) -> Result<u8, SudokuError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.digit)
        }
    }

    /// Recognizes the rendered test font by nearest-template matching
    struct TemplateStub {
        templates: Vec<(u8, GrayImage)>,
    }

    impl TemplateStub {
        fn new(config: &ExtractionConfig) -> Self {
            let templates = (1..=9u8)
                .map(|digit| {
                    let cell = render_cell(digit);
                    let binary = enhance::binarize(&cell, false, config);
                    let canvas = glyph::extract_digit(
                        &binary,
                        &Rect::at(0, 0).of_size(62, 62),
                        config,
                    );
                    assert!(!glyph::is_blank(&canvas), "template {} came out blank", digit);
                    (digit, canvas)
                })
                .collect();
            Self { templates }
        }
    }

    impl DigitClassifier for TemplateStub {
        fn name(&self) -> &'static str {
            "template-stub"
        }

        fn classify(&self, canvas: &GrayImage) -> Result<u8, SudokuError> {
            let difference = |template: &GrayImage| -> u64 {
                template
                    .pixels()
                    .zip(canvas.pixels())
                    .map(|(a, b)| (a.0[0] as i64 - b.0[0] as i64).unsigned_abs())
                    .sum()
            };
            let (digit, _) = self
                .templates
                .iter()
                .map(|(digit, template)| (*digit, difference(template)))
                .min_by_key(|(_, diff)| *diff)
                .expect("no templates");
            Ok(digit)
        }
    }

    fn template_extractor() -> SudokuExtractor {
        let config = ExtractionConfig::default();
        let stub = TemplateStub::new(&config);
        SudokuExtractor::with_config(Arc::new(stub), config)
    }

    // ------------------------------------------------------------------
    // Classification stage properties
    // ------------------------------------------------------------------

    fn blank_canvas() -> GrayImage {
        GrayImage::new(28, 28)
    }

    fn marked_canvas() -> GrayImage {
        let mut canvas = blank_canvas();
        for y in 8..20 {
            for x in 12..16 {
                canvas.put_pixel(x, y, image::Luma([255]));
            }
        }
        canvas
    }

    #[test]
    fn blank_canvases_never_reach_the_model() {
        let stub = Arc::new(CountingStub::new(9));
        let extractor = SudokuExtractor::new(Arc::clone(&stub) as Arc<dyn DigitClassifier>);

        let canvases = vec![blank_canvas(), blank_canvas(), blank_canvas()];
        let digits = extractor.classify_cells(&canvases).unwrap();

        assert_eq!(digits, vec![0, 0, 0]);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_blank_canvases_invoke_the_model_once_each() {
        let stub = Arc::new(CountingStub::new(9));
        let extractor = SudokuExtractor::new(Arc::clone(&stub) as Arc<dyn DigitClassifier>);

        let canvases = vec![blank_canvas(), marked_canvas(), marked_canvas()];
        let digits = extractor.classify_cells(&canvases).unwrap();

        assert_eq!(digits, vec![0, 9, 9]);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_prediction_on_non_blank_canvas_remaps_to_four() {
        let stub = Arc::new(CountingStub::new(0));
        let extractor = SudokuExtractor::new(Arc::clone(&stub) as Arc<dyn DigitClassifier>);

        let digits = extractor
            .classify_cells(&[marked_canvas(), blank_canvas()])
            .unwrap();
        assert_eq!(digits, vec![4, 0]);
    }

    #[test]
    fn remap_can_be_disabled() {
        let config = ExtractionConfig {
            remap_zero_to_four: false,
            ..ExtractionConfig::default()
        };
        let stub = Arc::new(CountingStub::new(0));
        let extractor = SudokuExtractor::with_config(stub, config);

        let digits = extractor.classify_cells(&[marked_canvas()]).unwrap();
        assert_eq!(digits, vec![0]);
    }

    // ------------------------------------------------------------------
    // Full pipeline properties
    // ------------------------------------------------------------------

    #[test]
    fn canonical_puzzle_round_trips() {
        let image = render_puzzle(&CANONICAL_PUZZLE);
        let report = template_extractor().recognize(&image).unwrap();
        assert_eq!(report.grid.flatten(), CANONICAL_PUZZLE.to_vec());
    }

    #[test]
    fn pipeline_is_idempotent() {
        let image = render_puzzle(&CANONICAL_PUZZLE);
        let extractor = template_extractor();

        let first = extractor.recognize(&image).unwrap();
        let second = extractor.recognize(&image).unwrap();
        assert_eq!(first.grid, second.grid);
    }

    #[test]
    fn classified_sequence_is_row_major() {
        let mut digits = [0u8; 81];
        digits[2 * 9 + 5] = 7;

        let image = render_puzzle(&digits);
        let report = template_extractor().recognize(&image).unwrap();

        let flat = report.grid.flatten();
        for (index, &digit) in flat.iter().enumerate() {
            if index == 23 {
                assert_eq!(digit, 7, "cell (2, 5) should hold the rendered digit");
            } else {
                assert_eq!(digit, 0, "cell index {} should be empty", index);
            }
        }
    }

    #[test]
    fn featureless_images_report_grid_not_found() {
        let extractor = template_extractor();
        for value in [0u8, 255u8] {
            let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(
                300,
                300,
                Rgb([value, value, value]),
            ));
            assert!(
                matches!(extractor.recognize(&flat), Err(SudokuError::GridNotFound)),
                "uniform {} image should not locate a grid",
                value
            );
        }
    }

    #[test]
    fn report_carries_stage_timings() {
        let image = render_puzzle(&CANONICAL_PUZZLE);
        let report = template_extractor().recognize(&image).unwrap();

        let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["normalize", "enhance", "locate", "extract", "classify"]
        );
    }

    #[test]
    fn undecodable_bytes_fail_with_decode_error() {
        let extractor = template_extractor();
        assert!(matches!(
            extractor.recognize_bytes(b"definitely not an image"),
            Err(SudokuError::Decode(_))
        ));
    }

    #[test]
    fn recognize_path_decodes_from_disk() {
        let image = render_puzzle(&CANONICAL_PUZZLE);
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .unwrap();
        image.save(file.path()).unwrap();

        let report = template_extractor().recognize_path(file.path()).unwrap();
        assert_eq!(report.grid.flatten(), CANONICAL_PUZZLE.to_vec());
    }
}
