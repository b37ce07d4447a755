//! Persistent progress channels
//!
//! The `ChannelRegistry` owns every connected channel, the Progress Protocol
//! turns retrieval milestones into ordered events, and the `RetrievalRunner`
//! drives retrievals requested over a channel.

pub mod error;
pub mod events;
pub mod progress;
pub mod registry;
pub mod retrieval;

pub use error::{ProgressError, SessionError};
pub use events::{ChannelMessage, ClientRequest, ProgressEvent};
pub use progress::{ProgressSource, ProgressTracker, TrackerState, TransferProgress};
pub use registry::{ChannelHandle, ChannelRegistry, RegistryMetrics, SendOutcome, Subscription};
pub use retrieval::{RetrievalOutcome, RetrievalRunner};
