use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SudokuError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("No Sudoku grid found in image")]
    GridNotFound,

    #[error("Failed to initialize digit classifier: {0}")]
    ClassifierInit(String),

    #[error("Digit model inference failed: {0}")]
    ModelInference(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for SudokuError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SudokuError::Decode(_) => (StatusCode::BAD_REQUEST, "DECODE_FAILURE"),
            SudokuError::GridNotFound => (StatusCode::UNPROCESSABLE_ENTITY, "GRID_NOT_FOUND"),
            SudokuError::ClassifierInit(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CLASSIFIER_INIT_ERROR")
            }
            SudokuError::ModelInference(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_INFERENCE_ERROR")
            }
            SudokuError::ImageTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE"),
            SudokuError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            SudokuError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
