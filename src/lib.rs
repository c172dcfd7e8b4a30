//! Biotop - habitat record verification and visibility
//!
//! Field observers submit habitat records, an external classifier proposes a
//! habitat type, and experts verify or correct the result. Verified records
//! are published on an anonymous map.
//!
//! ## Layers
//!
//! - **auth**: roles, bearer tokens and the visibility policy
//! - **db**: MongoDB schemas, typed queries and the record store
//! - **services**: reads, state transitions, protection status, collaborators
//! - **routes** / **server**: JSON API over hyper

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{BiotopError, Result};
