//! # LabTrack Common Library
//!
//! Shared code for the LabTrack client crates including:
//! - Persisted key/value store (auth artifacts, last analysis)
//! - Bearer token decoding and validity checks
//! - Credential artifacts and the auth-changed broadcast
//! - Event types (LabEvent enum) and EventBus
//! - Configuration loading
//! - SSE helpers

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod sse;
pub mod storage;
pub mod token;

pub use credentials::{Credentials, TokenPair, UserProfile};
pub use error::{Error, Result};
pub use events::{EventBus, LabEvent};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use token::{validate_token, validate_token_at, TokenInfo};
