use crate::classifiers::rten::RtenClassifier;
use crate::config::Config;
use crate::error::SudokuError;
use crate::extraction::{PuzzleGrid, SudokuExtractor};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Canonical puzzle served by `/test` for client integration testing
const TEST_PUZZLE: [u8; 81] = [
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

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<SudokuExtractor>,
    pub config: Arc<Config>,
}

/// Recognition response
#[derive(Serialize)]
pub struct RecognizeResponse {
    /// Row-major 81-element digit sequence, 0 for empty cells
    pub digits: Vec<u8>,
    /// The same digits as 9 rows of 9
    pub grid: PuzzleGrid,
    pub processing_time_ms: u64,
}

/// Test puzzle response
#[derive(Serialize)]
pub struct TestResponse {
    pub puzzle: Vec<u8>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub classifier: String,
    pub max_file_size_bytes: usize,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let classifier = RtenClassifier::global(&config)?;
    let extractor = SudokuExtractor::new(classifier);
    let addr = format!("{}:{}", config.host, config.port);
    let max_file_size = config.max_file_size;

    let state = AppState {
        extractor: Arc::new(extractor),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/recognize", post(handle_recognize))
        .route("/test", get(handle_test))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle puzzle recognition requests
async fn handle_recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, SudokuError> {
    let mut file_data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SudokuError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    SudokuError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(SudokuError::MissingFile)?;

    if data.len() > state.config.max_file_size {
        return Err(SudokuError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let report = state.extractor.recognize_bytes(&data)?;

    tracing::info!(
        "Recognition completed in {}ms, puzzle: {}",
        report.total_time_ms,
        report.grid.to_csv()
    );

    Ok(Json(RecognizeResponse {
        digits: report.grid.flatten(),
        grid: report.grid,
        processing_time_ms: report.total_time_ms,
    }))
}

/// Handle test puzzle requests
async fn handle_test() -> impl IntoResponse {
    Json(TestResponse {
        puzzle: TEST_PUZZLE.to_vec(),
    })
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        classifier: state.extractor.classifier_name().to_string(),
        max_file_size_bytes: state.config.max_file_size,
    })
}
