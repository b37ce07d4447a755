// Extraction Adapter
//
// Facade over the external extraction engine. Nothing outside this module
// talks to the engine directly.

pub mod error;
pub mod traits;
pub mod ytdlp;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use error::{ExtractionError, Result};
pub use traits::{ByteStream, MediaExtractor, OpenedStream, SelectedVariant};
pub use ytdlp::YtDlpExtractor;

#[cfg(any(test, feature = "test-util"))]
pub use fixture::{StaticExtractor, StaticMedia};
