// mediagate HTTP API
//
// REST endpoints for metadata and downloads plus the WebSocket progress
// channel.

pub mod http;

pub use http::{create_router, AppState};
