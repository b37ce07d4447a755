use mediagate_core::models::RetrievalSummary;
use serde::{Deserialize, Serialize};

/// Progress of one tracked retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    Progress { percent: u8 },
    Completed { summary: RetrievalSummary },
    Failed { reason: String },
}

impl ProgressEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// JSON text frame pushed to a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Progress { message: String, progress: u8 },
    Complete { message: String, data: RetrievalSummary },
    Error { message: String },
}

impl ChannelMessage {
    /// Error frame that is not tied to a retrieval, e.g. unreadable input
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        // Plain strings and integers only; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

impl From<ProgressEvent> for ChannelMessage {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Started => Self::Progress {
                message: "Starting download...".to_string(),
                progress: 0,
            },
            ProgressEvent::Progress { percent } => Self::Progress {
                message: format!("Downloading... {percent}%"),
                progress: percent,
            },
            ProgressEvent::Completed { summary } => Self::Complete {
                message: "Download complete!".to_string(),
                data: summary,
            },
            ProgressEvent::Failed { reason } => Self::Error { message: reason },
        }
    }
}

/// Inbound frame from a channel's client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Download { url: String, format: Option<String> },
    /// Any other message type; ignored
    Other(String),
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
    format: Option<String>,
}

impl ClientRequest {
    /// Parse a text frame; fails only when it is not a JSON object
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawRequest = serde_json::from_str(text)?;
        Ok(match raw.kind.as_deref() {
            Some("download") => Self::Download {
                url: raw.url.unwrap_or_default(),
                format: raw.format,
            },
            other => Self::Other(other.unwrap_or_default().to_string()),
        })
    }
}
