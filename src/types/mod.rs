//! Shared types for Biotop

pub mod error;

pub use error::{BiotopError, Result};
