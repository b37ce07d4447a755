use serde::{Deserialize, Serialize};

use super::id::Locator;

/// One deliverable encoding of a media item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Engine format identifier, unique within one `MediaMetadata`
    pub format_id: String,
    /// Container extension (mp4, webm, m4a, ...)
    pub ext: String,
    pub resolution: String,
    /// Size in bytes when the engine reports it
    pub filesize: Option<u64>,
    /// Human-readable size, "N/A" when unknown
    pub filesize_fmt: String,
    pub note: String,
}

/// Canonical description of a media item
///
/// Produced fresh per request, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub uploader: Option<String>,
    pub formats: Vec<VariantDescriptor>,
    pub webpage_url: Option<String>,
    pub description: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
}

impl MediaMetadata {
    #[must_use]
    pub fn variant(&self, format_id: &str) -> Option<&VariantDescriptor> {
        self.formats.iter().find(|v| v.format_id == format_id)
    }
}

/// Short description of a finished retrieval, carried by the completion event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub title: String,
    pub duration: Option<String>,
    /// Number of variants the engine offered
    pub formats: usize,
}

impl From<&MediaMetadata> for RetrievalSummary {
    fn from(metadata: &MediaMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            duration: metadata.duration_string.clone(),
            formats: metadata.formats.len(),
        }
    }
}

/// Request to stream one variant of a media item
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub locator: Locator,
    /// Engine format selector; `None` lets the engine pick the best variant
    pub variant: Option<String>,
}

impl DownloadRequest {
    #[must_use]
    pub const fn new(locator: Locator, variant: Option<String>) -> Self {
        Self { locator, variant }
    }

    /// Blank selectors are treated as absent
    #[must_use]
    pub fn variant(&self) -> Option<&str> {
        self.variant
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaMetadata {
        MediaMetadata {
            id: "abc".to_string(),
            title: "Sample".to_string(),
            thumbnail: None,
            duration: Some(62.0),
            duration_string: Some("1:02".to_string()),
            uploader: None,
            formats: vec![
                VariantDescriptor {
                    format_id: "18".to_string(),
                    ext: "mp4".to_string(),
                    resolution: "640x360".to_string(),
                    filesize: Some(1024),
                    filesize_fmt: "1.00 KB".to_string(),
                    note: "360p".to_string(),
                },
                VariantDescriptor {
                    format_id: "251".to_string(),
                    ext: "webm".to_string(),
                    resolution: "audio only".to_string(),
                    filesize: None,
                    filesize_fmt: "N/A".to_string(),
                    note: "medium".to_string(),
                },
            ],
            webpage_url: None,
            description: None,
            view_count: Some(10),
            like_count: None,
        }
    }

    #[test]
    fn test_summary_counts_formats() {
        let summary = RetrievalSummary::from(&sample());
        assert_eq!(summary.title, "Sample");
        assert_eq!(summary.duration.as_deref(), Some("1:02"));
        assert_eq!(summary.formats, 2);
    }

    #[test]
    fn test_variant_lookup() {
        let metadata = sample();
        assert_eq!(metadata.variant("251").map(|v| v.ext.as_str()), Some("webm"));
        assert!(metadata.variant("999").is_none());
    }

    #[test]
    fn test_blank_variant_is_absent() {
        let locator = Locator::parse("x").unwrap();
        assert_eq!(DownloadRequest::new(locator.clone(), Some(" ".into())).variant(), None);
        assert_eq!(
            DownloadRequest::new(locator, Some("best".into())).variant(),
            Some("best")
        );
    }

    #[test]
    fn test_metadata_serializes_original_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["formats"][0]["filesize_fmt"], "1.00 KB");
        assert_eq!(json["duration_string"], "1:02");
        assert!(json["uploader"].is_null());
    }
}
