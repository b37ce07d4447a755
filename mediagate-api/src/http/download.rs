//! Streaming download endpoint

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use mediagate_core::models::{ChannelId, DownloadRequest, Locator};
use mediagate_core::service::TransferObserver;
use mediagate_session::TransferProgress;
use serde::Deserialize;
use tracing::{debug, info};

use crate::http::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: String,
    /// Engine format selector
    pub format: Option<String>,
    /// Progress channel to report transfer progress to
    pub client_id: Option<String>,
}

/// Stream a media variant to the client
///
/// GET /api/download?url=:url&format=:format&client_id=:client_id
///
/// Errors before the first byte are reported as 400 with a JSON body. A
/// failure after that aborts the connection instead of ending the body.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let locator = Locator::parse(&query.url)?;
    let request = DownloadRequest::new(locator, query.format);

    let observer = query
        .client_id
        .as_deref()
        .and_then(|raw| ChannelId::parse(raw).ok())
        .and_then(|id| {
            let observer = TransferProgress::attach(&state.registry, id.clone());
            if observer.is_none() {
                debug!(client_id = %id, "Progress channel not connected, downloading untracked");
            }
            observer
        })
        .map(|o| Box::new(o) as Box<dyn TransferObserver>);

    let download = state.delivery.deliver(request, observer).await?;
    let framing = &download.framing;

    let header_value = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|_| AppError::internal_server_error("Failed to build response"))
    };
    let content_disposition = header_value(&framing.content_disposition)?;
    let title = header_value(&framing.title_header)?;

    info!(
        delivery_id = %download.delivery_id,
        filename = %framing.filename,
        content_type = framing.content_type,
        "Download streaming started"
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, framing.content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header("X-Video-Title", title)
        .header(header::CACHE_CONTROL, "no-cache, no-store")
        .body(Body::from_stream(download.body))
        .map_err(|_| AppError::internal_server_error("Failed to build response"))?
        .into_response())
}
