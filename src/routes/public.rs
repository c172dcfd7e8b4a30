//! Anonymous map API
//!
//! - `GET /api/public/records` - Verified records without e-mail addresses
//! - `GET /api/public/facets/{field}` - Facets over verified records
//!
//! A bearer token is optional here. When present it widens name visibility
//! to members of the author's organization.

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::db::query::FacetField;
use crate::routes::caller::optional_caller;
use crate::routes::records::{FacetResponse, ListRecordsQuery};
use crate::routes::response::{
    error_response, json_response, not_found_response, service_error_response, FullBody,
};
use crate::server::AppState;

#[derive(Debug, PartialEq, Eq)]
enum PublicRoute {
    Records,
    Facets(String),
}

fn resolve(method: &Method, subpath: &str) -> Option<PublicRoute> {
    if *method != Method::GET {
        return None;
    }
    match subpath.trim_end_matches('/') {
        "/records" => Some(PublicRoute::Records),
        other => other
            .strip_prefix("/facets/")
            .filter(|field| !field.is_empty() && !field.contains('/'))
            .map(|field| PublicRoute::Facets(field.to_string())),
    }
}

/// Main handler for /api/public/* routes
pub async fn handle_public_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let subpath = path.strip_prefix("/api/public").unwrap_or("");
    let Some(route) = resolve(req.method(), subpath) else {
        return not_found_response(path);
    };

    let viewer = match optional_caller(&req, &state.jwt) {
        Ok(viewer) => viewer,
        Err(resp) => return resp,
    };

    match route {
        PublicRoute::Records => {
            let params = ListRecordsQuery::from_query_string(req.uri().query());
            let page = state.records.page(params.page, params.limit);
            match state
                .records
                .list_public_records(viewer.as_ref(), &params.filters, params.sort, page)
                .await
            {
                Ok(found) => json_response(StatusCode::OK, &found),
                Err(e) => service_error_response(e),
            }
        }
        PublicRoute::Facets(field) => {
            let Some(field) = FacetField::parse(&field) else {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Unknown facet field '{}'", field),
                    Some("INVALID_FACET"),
                );
            };
            match state
                .records
                .list_public_facet_values(viewer.as_ref(), field)
                .await
            {
                Ok(values) => json_response(
                    StatusCode::OK,
                    &FacetResponse {
                        field: field.as_str(),
                        values,
                    },
                ),
                Err(e) => service_error_response(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_routes() {
        assert_eq!(resolve(&Method::GET, "/records"), Some(PublicRoute::Records));
        assert_eq!(resolve(&Method::GET, "/records/"), Some(PublicRoute::Records));
        assert_eq!(
            resolve(&Method::GET, "/facets/habitat"),
            Some(PublicRoute::Facets("habitat".into()))
        );
        assert_eq!(resolve(&Method::GET, "/facets/"), None);
        assert_eq!(resolve(&Method::POST, "/records"), None);
        assert_eq!(resolve(&Method::GET, "/records/r-1"), None);
    }
}
