//! Sudoku grid extraction
//!
//! Turns a photograph of a paper puzzle into a 9x9 grid of digits through a
//! fixed sequence of image-processing stages plus a digit classifier.

pub mod grid;
pub mod pipeline;
pub mod steps;

pub use grid::PuzzleGrid;
pub use pipeline::{ExtractionReport, StageTiming, SudokuExtractor};
