//! Authenticated record API
//!
//! ## Endpoints
//!
//! - `GET /api/records` - List visible records with filters, sort, paging
//! - `GET /api/records/export` - Every visible record matching the filters
//! - `GET /api/records/facets/{field}` - Distinct gemeinde / habitat / person values
//! - `GET /api/records/{id}` - Record details
//! - `POST /api/records/{id}/verify` - Verify (expert/admin)
//! - `POST /api/records/{id}/unverify` - Drop verification (expert/admin)
//! - `PUT /api/records/{id}/verified-result` - Correct verified result (expert/admin)
//! - `POST /api/records/{id}/reanalyze` - Start re-analysis (owner or expert/admin)
//! - `DELETE /api/records/{id}` - Soft delete (owner or expert/admin)

use bson::{Bson, Document};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Caller;
use crate::db::query::{
    FacetBucket, FacetField, RecordFilters, RecordSort, SortDirection, SortField,
    DEFAULT_PAGE_SIZE,
};
use crate::db::schemas::{
    AnalysisResult, AnalysisStatus, AuditUser, HabitatRecord, HistoryEntry, ProtectionStatus,
    RecordLocation, VerifiedBy,
};
use crate::routes::caller::require_caller;
use crate::routes::response::{
    error_response, json_response, not_found_response, read_json, service_error_response,
    FullBody,
};
use crate::server::AppState;
use crate::services::records::rfc3339;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters shared by listing, export and public listing
#[derive(Debug, Default, PartialEq)]
pub struct ListRecordsQuery {
    pub page: u64,
    pub limit: u64,
    pub filters: RecordFilters,
    pub sort: RecordSort,
}

impl ListRecordsQuery {
    pub fn from_query_string(query: Option<&str>) -> Self {
        let mut params = Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            filters: RecordFilters::default(),
            sort: RecordSort::default(),
        };

        if let Some(q) = query {
            for pair in q.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    let value = urlencoding::decode(&value.replace('+', " "))
                        .map(|v| v.into_owned())
                        .unwrap_or_default();
                    let filters = &mut params.filters;
                    match key {
                        "page" => params.page = value.parse().unwrap_or(1),
                        "limit" => params.limit = value.parse().unwrap_or(DEFAULT_PAGE_SIZE),
                        "gemeinde" => filters.gemeinde = Some(value),
                        "habitat" => filters.habitat = Some(value),
                        "person" => filters.person = Some(value),
                        "verified" => filters.verified = value.parse().ok(),
                        "protectionStatus" | "protection_status" => {
                            filters.protection_status = ProtectionStatus::parse(&value)
                        }
                        "search" => filters.search = Some(value),
                        "sortBy" | "sort_by" => {
                            params.sort.field = SortField::parse(&value).unwrap_or_default()
                        }
                        "sortDir" | "sort_dir" => {
                            params.sort.direction = SortDirection::parse(&value).unwrap_or_default()
                        }
                        _ => {}
                    }
                }
            }
        }

        params
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub effective_habitat: String,
    #[serde(default)]
    pub kommentar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectRequest {
    pub verified_result: AnalysisResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView<'a> {
    pub date: Option<String>,
    pub user: &'a AuditUser,
    pub module: &'a str,
    pub previous_result: serde_json::Value,
    pub changes: serde_json::Value,
}

/// Record as returned to authenticated callers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView<'a> {
    pub record_id: &'a str,
    pub author_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<&'a str>,
    pub location: &'a RecordLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_habitat: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection_status: Option<ProtectionStatus>,
    pub analysis_status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<&'a str>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<&'a VerifiedBy>,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<&'a str>,
    pub history: Vec<HistoryView<'a>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a HabitatRecord) -> Self {
        Self {
            record_id: &record.record_id,
            author_email: &record.author_email,
            author_name: record.author_name.as_deref(),
            organization_id: record.organization_id.as_deref(),
            organization_name: record.organization_name.as_deref(),
            location: &record.location,
            auto_result: record.auto_result.as_ref(),
            verified_result: record.verified_result.as_ref(),
            effective_habitat: record.effective_habitat(),
            protection_status: record.protection_status,
            analysis_status: record.analysis_status,
            analysis_error: record.analysis_error.as_deref(),
            verified: record.verified,
            verified_at: record.verified_at.and_then(rfc3339),
            verified_by: record.verified_by.as_ref(),
            deleted: record.deleted,
            deleted_at: record.deleted_at.and_then(rfc3339),
            deleted_by: record.deleted_by.as_deref(),
            history: record.history.iter().map(history_view).collect(),
            created_at: rfc3339(record.created_at),
            updated_at: rfc3339(record.updated_at),
        }
    }
}

fn history_view(entry: &HistoryEntry) -> HistoryView<'_> {
    HistoryView {
        date: rfc3339(entry.date),
        user: &entry.user,
        module: &entry.module,
        previous_result: document_json(&entry.previous_result),
        changes: document_json(&entry.changes),
    }
}

fn document_json(doc: &Document) -> serde_json::Value {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListResponse<'a> {
    pub records: Vec<RecordView<'a>>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse<'a> {
    pub records: Vec<RecordView<'a>>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct FacetResponse {
    pub field: &'static str,
    pub values: Vec<FacetBucket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReanalysisAccepted<'a> {
    pub record_id: &'a str,
    pub analysis_status: AnalysisStatus,
}

// =============================================================================
// Route Resolution
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum RecordRoute {
    List,
    Export,
    Facets(String),
    Get(String),
    Verify(String),
    Unverify(String),
    Correct(String),
    Reanalyze(String),
    Delete(String),
}

fn resolve(method: &Method, subpath: &str) -> Option<RecordRoute> {
    let subpath = subpath.trim_end_matches('/');
    if subpath.is_empty() {
        return (*method == Method::GET).then_some(RecordRoute::List);
    }

    let rest = subpath.strip_prefix('/')?;
    if *method == Method::GET && rest == "export" {
        return Some(RecordRoute::Export);
    }
    if let Some(field) = rest.strip_prefix("facets/") {
        return (*method == Method::GET && !field.contains('/'))
            .then(|| RecordRoute::Facets(field.to_string()));
    }

    let (raw_id, action) = match rest.split_once('/') {
        Some((id, action)) => (id, Some(action)),
        None => (rest, None),
    };
    let id = urlencoding::decode(raw_id).ok()?.into_owned();
    if id.is_empty() {
        return None;
    }

    match (method, action) {
        (&Method::GET, None) => Some(RecordRoute::Get(id)),
        (&Method::DELETE, None) => Some(RecordRoute::Delete(id)),
        (&Method::POST, Some("verify")) => Some(RecordRoute::Verify(id)),
        (&Method::POST, Some("unverify")) => Some(RecordRoute::Unverify(id)),
        (&Method::PUT, Some("verified-result")) => Some(RecordRoute::Correct(id)),
        (&Method::POST, Some("reanalyze")) => Some(RecordRoute::Reanalyze(id)),
        _ => None,
    }
}

// =============================================================================
// Route Handler
// =============================================================================

/// Main handler for /api/records/* routes
pub async fn handle_records_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let subpath = path.strip_prefix("/api/records").unwrap_or("");
    let Some(route) = resolve(req.method(), subpath) else {
        return not_found_response(path);
    };

    let caller = match require_caller(&req, &state.jwt) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match route {
        RecordRoute::List => handle_list(&req, &state, &caller).await,
        RecordRoute::Export => handle_export(&req, &state, &caller).await,
        RecordRoute::Facets(field) => handle_facets(&state, &caller, &field).await,
        RecordRoute::Get(id) => match state.records.get_record(&caller, &id).await {
            Ok(record) => json_response(StatusCode::OK, &RecordView::new(&record)),
            Err(e) => service_error_response(e),
        },
        RecordRoute::Verify(id) => handle_verify(req, &state, &caller, &id).await,
        RecordRoute::Unverify(id) => match state.records.unverify(&caller, &id).await {
            Ok(record) => json_response(StatusCode::OK, &RecordView::new(&record)),
            Err(e) => service_error_response(e),
        },
        RecordRoute::Correct(id) => handle_correct(req, &state, &caller, &id).await,
        RecordRoute::Reanalyze(id) => {
            match state.records.request_reanalysis(&caller, &id).await {
                Ok(_handle) => json_response(
                    StatusCode::ACCEPTED,
                    &ReanalysisAccepted {
                        record_id: &id,
                        analysis_status: AnalysisStatus::Analyzing,
                    },
                ),
                Err(e) => service_error_response(e),
            }
        }
        RecordRoute::Delete(id) => match state.records.delete_record(&caller, &id).await {
            Ok(record) => json_response(StatusCode::OK, &RecordView::new(&record)),
            Err(e) => service_error_response(e),
        },
    }
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

async fn handle_list(
    req: &Request<Incoming>,
    state: &AppState,
    caller: &Caller,
) -> Response<FullBody> {
    let params = ListRecordsQuery::from_query_string(req.uri().query());
    let page = state.records.page(params.page, params.limit);

    match state
        .records
        .list_records(caller, &params.filters, params.sort, page)
        .await
    {
        Ok(found) => {
            let total_pages = found.total.div_ceil(found.limit.max(1));
            json_response(
                StatusCode::OK,
                &RecordListResponse {
                    records: found.records.iter().map(RecordView::new).collect(),
                    total: found.total,
                    page: found.page,
                    limit: found.limit,
                    total_pages,
                },
            )
        }
        Err(e) => service_error_response(e),
    }
}

async fn handle_export(
    req: &Request<Incoming>,
    state: &AppState,
    caller: &Caller,
) -> Response<FullBody> {
    let params = ListRecordsQuery::from_query_string(req.uri().query());

    match state.records.export_records(caller, &params.filters).await {
        Ok(records) => json_response(
            StatusCode::OK,
            &ExportResponse {
                total: records.len(),
                records: records.iter().map(RecordView::new).collect(),
            },
        ),
        Err(e) => service_error_response(e),
    }
}

async fn handle_facets(state: &AppState, caller: &Caller, field: &str) -> Response<FullBody> {
    let Some(field) = FacetField::parse(field) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Unknown facet field '{}'", field),
            Some("INVALID_FACET"),
        );
    };

    match state.records.list_facet_values(caller, field).await {
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

async fn handle_verify(
    req: Request<Incoming>,
    state: &AppState,
    caller: &Caller,
    record_id: &str,
) -> Response<FullBody> {
    let body: VerifyRequest = match read_json(req).await {
        Ok(b) => b,
        Err(e) => return service_error_response(e),
    };

    match state
        .records
        .verify(
            caller,
            record_id,
            &body.effective_habitat,
            body.kommentar.as_deref(),
        )
        .await
    {
        Ok(record) => json_response(StatusCode::OK, &RecordView::new(&record)),
        Err(e) => service_error_response(e),
    }
}

async fn handle_correct(
    req: Request<Incoming>,
    state: &AppState,
    caller: &Caller,
    record_id: &str,
) -> Response<FullBody> {
    let body: CorrectRequest = match read_json(req).await {
        Ok(b) => b,
        Err(e) => return service_error_response(e),
    };

    match state
        .records
        .correct(caller, record_id, body.verified_result)
        .await
    {
        Ok(record) => json_response(StatusCode::OK, &RecordView::new(&record)),
        Err(e) => service_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use bson::DateTime;

    #[test]
    fn test_query_string_parsing() {
        let params = ListRecordsQuery::from_query_string(Some(
            "page=2&limit=50&gemeinde=St.%20Ulrich&verified=true&protectionStatus=red\
             &search=Mager+wiese&sortBy=gemeinde&sortDir=asc&person=anna%40example.org",
        ));

        assert_eq!(params.page, 2);
        assert_eq!(params.limit, 50);
        assert_eq!(params.filters.gemeinde.as_deref(), Some("St. Ulrich"));
        assert_eq!(params.filters.verified, Some(true));
        assert_eq!(params.filters.protection_status, Some(ProtectionStatus::Red));
        assert_eq!(params.filters.search.as_deref(), Some("Mager wiese"));
        assert_eq!(params.filters.person.as_deref(), Some("anna@example.org"));
        assert_eq!(
            params.sort,
            RecordSort::new(SortField::Gemeinde, SortDirection::Asc)
        );
    }

    #[test]
    fn test_query_string_defaults() {
        let params = ListRecordsQuery::from_query_string(Some("sortBy=nonsense&page=x"));
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(params.sort, RecordSort::default());
        assert_eq!(ListRecordsQuery::from_query_string(None).filters, RecordFilters::default());
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(resolve(&Method::GET, ""), Some(RecordRoute::List));
        assert_eq!(resolve(&Method::GET, "/"), Some(RecordRoute::List));
        assert_eq!(resolve(&Method::GET, "/export"), Some(RecordRoute::Export));
        assert_eq!(
            resolve(&Method::GET, "/facets/gemeinde"),
            Some(RecordRoute::Facets("gemeinde".into()))
        );
        assert_eq!(resolve(&Method::GET, "/r-1"), Some(RecordRoute::Get("r-1".into())));
        assert_eq!(
            resolve(&Method::POST, "/r-1/verify"),
            Some(RecordRoute::Verify("r-1".into()))
        );
        assert_eq!(
            resolve(&Method::POST, "/r-1/unverify"),
            Some(RecordRoute::Unverify("r-1".into()))
        );
        assert_eq!(
            resolve(&Method::PUT, "/r-1/verified-result"),
            Some(RecordRoute::Correct("r-1".into()))
        );
        assert_eq!(
            resolve(&Method::POST, "/r-1/reanalyze"),
            Some(RecordRoute::Reanalyze("r-1".into()))
        );
        assert_eq!(resolve(&Method::DELETE, "/r-1"), Some(RecordRoute::Delete("r-1".into())));
        assert_eq!(resolve(&Method::GET, "/r-1/verify"), None);
        assert_eq!(resolve(&Method::POST, ""), None);
    }

    #[test]
    fn test_record_view_uses_rfc3339_and_plain_json() {
        let mut record = HabitatRecord::new("r-1", "anna@example.org");
        record.created_at = DateTime::from_millis(0);
        record.updated_at = DateTime::from_millis(0);
        record.history.append(HistoryEntry::new(
            DateTime::from_millis(0),
            Caller::new("eva@example.org", Role::Expert).audit_user(),
            "verification",
            Document::new(),
            bson::doc! { "habitattyp": "Moor", "protectionStatus": "red" },
        ));

        let json = serde_json::to_value(RecordView::new(&record)).unwrap();
        assert!(json["createdAt"]
            .as_str()
            .unwrap()
            .starts_with("1970-01-01T00:00:00"));
        assert_eq!(json["analysisStatus"], "pending");
        assert_eq!(json["history"][0]["changes"]["habitattyp"], "Moor");
        assert_eq!(json["history"][0]["user"]["role"], "experte");
        assert!(json.get("verifiedAt").is_none());
    }

    #[test]
    fn test_correct_request_shape() {
        let body: CorrectRequest = serde_json::from_str(
            r#"{"verifiedResult": {"habitattyp": "Hecke", "schutzstatus": "ökologisch hochwertig"}}"#,
        )
        .unwrap();
        assert_eq!(body.verified_result.habitattyp.as_deref(), Some("Hecke"));
    }
}
