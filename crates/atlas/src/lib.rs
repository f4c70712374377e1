//! # Atlas Shared Rust Library
//!
//! Infrastructure shared by the Atlas binaries:
//! - **error**: Process-level error type
//! - **tracing**: Logging setup that keeps stdout free for protocol output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atlas::error::{Error, Result};
//!
//! atlas::tracing::init_with_filter("info");
//! ```

pub mod error;
pub mod tracing;

pub use error::{Error, Result};
