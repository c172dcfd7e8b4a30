//! HTTP routes
//!
//! - `/health`, `/ready`, `/version` - probes
//! - `/api/records/*` - authenticated record API
//! - `/api/public/*` - anonymous map API

pub mod caller;
pub mod health;
pub mod public;
pub mod records;
pub mod response;

pub use health::{health_check, readiness_check, version_info};
pub use public::handle_public_request;
pub use records::handle_records_request;
pub use response::{not_found_response, preflight_response, FullBody};
