//! Metadata endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use mediagate_core::models::{Locator, MediaMetadata};
use serde::Deserialize;
use tracing::info;

use crate::http::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    #[serde(default)]
    pub url: String,
}

/// Describe a media item
///
/// GET /api/info?url=:url
pub async fn get_info(
    State(state): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> AppResult<Json<MediaMetadata>> {
    let locator = Locator::parse(&query.url)?;
    info!(locator = %locator, "Metadata request");

    let metadata = state.metadata.describe(&locator).await?;
    Ok(Json(metadata))
}
