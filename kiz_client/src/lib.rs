//! Client side of the KIZ-SPACE session service.
//!
//! This library provides the HTTP API client and the local session cache
//! used by the kiz_client binary.

pub mod api_client;
pub mod session_cache;
pub mod session_file;

pub use api_client::ApiClient;
pub use session_cache::{SessionCache, SessionEvent, SessionState};
