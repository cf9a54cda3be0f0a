//! File download endpoint.

use axum::extract::{Path, State};

use crate::{error::AppError, services::file_gateway::FileResponse, state::AppState};

/// Stream the file a token points to.
///
/// # Endpoint
///
/// `GET /getfilesrc/{token}`
///
/// # Response
///
/// - **Success (200 OK)**: File body with `Content-Type`, `Content-Disposition`,
///   `Content-Length`, `Cache-Control` and `Accept-Ranges` headers
/// - **Error (404)**: `Token not found`, `Token expired` or `File not found`
/// - **Error (500)**: Generic message, details are only logged
pub async fn get_file_src(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<FileResponse, AppError> {
    state.gateway.resolve_and_stream(&token).await
}
