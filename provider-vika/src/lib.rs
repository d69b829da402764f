//! # Vika Provider
//!
//! Implements the `RecordStore` trait for the Vika Fusion datasheet API.
//!
//! ## Overview
//!
//! This module provides:
//! - Record queries rendered as `filterByFormula` expressions, with paging
//! - Direct record-id lookup that never goes through a formula
//! - Field writes and attachment merge-append
//! - `multipart/form-data` attachment upload
//! - Column-name translation and type coercion per datasheet
//! - A shared, jittered rate limiter plus backoff on 429/5xx

pub mod connector;
pub mod error;
pub mod formula;
pub mod rate_limiter;
pub mod schema;
pub mod types;

pub use connector::{VikaConfig, VikaConnector, VIKA_API_BASE};
pub use error::{Result, VikaError};
pub use rate_limiter::RateLimiter;
pub use schema::{FieldSchema, FieldType};
