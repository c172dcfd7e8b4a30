//! Authentication and authorization
//!
//! - `role`: caller roles and the privileged check
//! - `caller`: the identity attached to a request
//! - `jwt`: bearer token validation
//! - `visibility`: which records and names a caller may see

pub mod caller;
pub mod jwt;
pub mod role;
pub mod visibility;

pub use caller::Caller;
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput};
pub use role::Role;
