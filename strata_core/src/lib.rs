//! # Strata Core
//!
//! Core types and primitives shared across the strata collector crates.
//!
//! This crate provides the foundational building blocks the remembered-set
//! subsystem is written against:
//!
//! - **Addresses & Ranges**: half-open memory ranges and alignment helpers
//! - **Error Handling**: result types and error definitions

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;

pub use address::{align_down, align_up, MemRange, WORD_SIZE};
pub use error::{GcError, GcResult};

/// Strata runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
