//! # Host Bridge Traits
//!
//! Abstraction traits between the photo pipeline and its environment.
//!
//! ## Overview
//!
//! This crate defines the contracts the core relies on but does not implement
//! itself. Each trait is a capability with a desktop implementation elsewhere
//! in the workspace and mock implementations in tests.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and multipart uploads
//!
//! ### Remote records
//! - [`RecordStore`](records::RecordStore) - Query, update, attachment upload and merge-append
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations should:
//!
//! - Convert provider-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., record ids, file names)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod records;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartFile};
pub use records::{
    AttachmentHandle, FilterValue, RecordFilter, RecordMatch, RecordStore, RemoteRecord,
};
pub use time::{Clock, ManualClock, SystemClock};
