pub mod id;
pub mod media;

pub use id::{ChannelId, Locator};
pub use media::{DownloadRequest, MediaMetadata, RetrievalSummary, VariantDescriptor};
