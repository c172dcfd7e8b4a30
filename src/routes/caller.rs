//! Resolve the caller of a request from its bearer token

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use crate::auth::{extract_token_from_header, Caller, JwtValidator};
use crate::routes::response::{error_response, FullBody};

fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Caller from a required bearer token
#[allow(clippy::result_large_err)]
pub fn require_caller(
    req: &Request<Incoming>,
    jwt: &JwtValidator,
) -> Result<Caller, Response<FullBody>> {
    match caller_from_header(get_auth_header(req), jwt) {
        Ok(Some(caller)) => Ok(caller),
        Ok(None) => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "No token provided",
            Some("NO_TOKEN"),
        )),
        Err(resp) => Err(resp),
    }
}

/// Caller from an optional bearer token; a present but invalid token is
/// still rejected
#[allow(clippy::result_large_err)]
pub fn optional_caller(
    req: &Request<Incoming>,
    jwt: &JwtValidator,
) -> Result<Option<Caller>, Response<FullBody>> {
    caller_from_header(get_auth_header(req), jwt)
}

#[allow(clippy::result_large_err)]
fn caller_from_header(
    header: Option<&str>,
    jwt: &JwtValidator,
) -> Result<Option<Caller>, Response<FullBody>> {
    let Some(token) = extract_token_from_header(header) else {
        return Ok(None);
    };

    let result = jwt.verify_token(token);
    match result.claims {
        Some(claims) if result.valid => Ok(Some(claims.into_caller())),
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            result.error.as_deref().unwrap_or("Invalid token"),
            Some("INVALID_TOKEN"),
        )),
    }
}
