use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{ApplicantDetails, ApplicationStatusView, RecordKey, YearKey};
use super::repository::{ApplicationRepository, ListingFilter, RepositoryError, StudentTransfer};
use super::service::{AcceptanceDecision, AdmissionsService, AdmissionsServiceError};

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimRequest {
    pub(crate) reviewer: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectRequest {
    pub(crate) reviewer: String,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NoteRequest {
    pub(crate) author: String,
    pub(crate) note: String,
}

/// Router builder exposing applicant and reviewer endpoints.
pub fn admissions_router<R, T>(service: Arc<AdmissionsService<R, T>>) -> Router
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    Router::new()
        .route("/api/v1/admissions/drafts", post(create_draft_handler::<R, T>))
        .route(
            "/api/v1/admissions/drafts/:key",
            get(draft_handler::<R, T>).put(update_draft_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/drafts/:key/submit",
            post(submit_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications",
            get(listing_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference",
            get(status_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference/review",
            post(claim_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference/accept",
            post(accept_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference/reject",
            post(reject_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference/notes",
            post(note_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/applications/:reference/transfer",
            post(transfer_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/academic-year",
            get(academic_year_handler::<R, T>),
        )
        .route(
            "/api/v1/admissions/counters/:year_key",
            get(counter_handler::<R, T>),
        )
        .with_state(service)
}

fn error_response(error: AdmissionsServiceError) -> Response {
    let status = match &error {
        AdmissionsServiceError::NotFound(_)
        | AdmissionsServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        AdmissionsServiceError::Lifecycle(_)
        | AdmissionsServiceError::Locked { .. }
        | AdmissionsServiceError::TransferNotPending { .. }
        | AdmissionsServiceError::AdmissionsClosed
        | AdmissionsServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        AdmissionsServiceError::Incomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdmissionsServiceError::YearKey(_)
        | AdmissionsServiceError::Repository(RepositoryError::Unavailable(_))
        | AdmissionsServiceError::Counter(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        AdmissionsServiceError::Incomplete(incomplete) => json!({
            "error": error.to_string(),
            "missing_sections": incomplete.missing,
        }),
        _ => json!({ "error": error.to_string() }),
    };

    (status, Json(payload)).into_response()
}

fn view_response(status: StatusCode, view: ApplicationStatusView) -> Response {
    (status, Json(view)).into_response()
}

pub(crate) async fn create_draft_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Json(details): Json<ApplicantDetails>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.create_draft(details) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn draft_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(key): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.get_draft(&RecordKey(key)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_draft_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(key): Path<String>,
    Json(details): Json<ApplicantDetails>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.update_draft(&RecordKey(key), details) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(key): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    // Allocation may back off between counter retries.
    let submitted = tokio::task::spawn_blocking(move || service.submit(&RecordKey(key))).await;

    match submitted {
        Ok(Ok(record)) => view_response(StatusCode::ACCEPTED, record.status_view()),
        Ok(Err(error)) => error_response(error),
        Err(join_error) => {
            error!(%join_error, "submission task panicked");
            let payload = json!({ "error": "submission could not be completed" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn listing_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Query(filter): Query<ListingFilter>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.staff_listing(&filter) {
        Ok(records) => {
            let views: Vec<ApplicationStatusView> =
                records.iter().map(|record| record.status_view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.find(&reference) {
        Ok(record) => view_response(StatusCode::OK, record.status_view()),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn claim_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
    Json(request): Json<ClaimRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.claim_for_review(&reference, &request.reviewer) {
        Ok(record) => view_response(StatusCode::OK, record.status_view()),
        Err(error) => error_response(error),
    }
}

/// The student transfer may block on the portal, so it runs off the async workers.
pub(crate) async fn accept_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
    Json(decision): Json<AcceptanceDecision>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    let outcome =
        tokio::task::spawn_blocking(move || service.accept(&reference, decision)).await;

    match outcome {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(error)) => error_response(error),
        Err(join_error) => {
            error!(%join_error, "acceptance task panicked");
            let payload = json!({ "error": "acceptance could not be completed" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn reject_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.reject(&reference, &request.reviewer, &request.reason) {
        Ok(record) => view_response(StatusCode::OK, record.status_view()),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn note_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
    Json(request): Json<NoteRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.annotate(&reference, &request.author, &request.note) {
        Ok(record) => view_response(StatusCode::OK, record.status_view()),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transfer_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(reference): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    let outcome = tokio::task::spawn_blocking(move || service.retry_transfer(&reference)).await;

    match outcome {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(error)) => error_response(error),
        Err(join_error) => {
            error!(%join_error, "transfer task panicked");
            let payload = json!({ "error": "transfer could not be completed" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn academic_year_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    match service.current_year_key() {
        Ok((resolved, year_key)) => {
            let payload = json!({
                "admission_year": resolved.year,
                "source": resolved.source,
                "year_key": year_key,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn counter_handler<R, T>(
    State(service): State<Arc<AdmissionsService<R, T>>>,
    Path(year_key): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    let year_key = match YearKey::new(year_key) {
        Ok(year_key) => year_key,
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match service.counter(&year_key) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => {
            let payload = json!({
                "year_key": year_key,
                "last_number": 0,
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
