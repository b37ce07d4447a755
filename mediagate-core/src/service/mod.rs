pub mod delivery;
pub mod format;
pub mod metadata;

pub use delivery::{
    DeliveryError, DeliveryService, DeliveryState, ResponseFraming, StreamedDownload,
    TransferObserver,
};
pub use format::format_size;
pub use metadata::MetadataService;
