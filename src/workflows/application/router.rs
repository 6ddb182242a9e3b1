use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::analysis::AnalysisSuite;
use super::service::{
    ApplicationWizardService, AssetPlacement, DocumentAttachment, StatePatch, WizardServiceError,
};
use super::state::{ApplicationId, FileHandle, SessionId};
use super::steps::WizardStep;
use super::submission::{
    ApplicationRecord, ApplicationRepository, DocumentStore, RepositoryError, SubmissionError,
};

/// Router builder exposing the wizard and staff review endpoints.
pub fn application_router<A, S, R>(service: Arc<ApplicationWizardService<A, S, R>>) -> Router
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/sessions",
            post(start_session_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id",
            get(session_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/fields",
            patch(patch_fields_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/documents",
            post(attach_document_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/assets",
            post(attach_assets_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/assets/:asset_id/proof",
            post(attach_proof_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/advance",
            post(advance_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/back",
            post(back_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/jump",
            post(jump_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/score",
            get(score_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/submit",
            post(submit_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/sessions/:session_id/draft",
            post(save_draft_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/drafts/resume",
            post(resume_draft_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/pending",
            get(pending_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/by-phone/:phone",
            get(by_phone_handler::<A, S, R>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<A, S, R>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct JumpRequest {
    step: WizardStep,
}

#[derive(Debug, Deserialize)]
struct AssetBatchRequest {
    placement: AssetPlacement,
    files: Vec<FileHandle>,
}

#[derive(Debug, Deserialize)]
struct ProofRequest {
    file: FileHandle,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    limit: Option<usize>,
}

fn error_response(error: WizardServiceError) -> Response {
    match error {
        WizardServiceError::UnknownSession
        | WizardServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        WizardServiceError::UnknownAsset(asset_id) => {
            let payload = json!({
                "error": "unknown asset",
                "asset_id": asset_id,
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        WizardServiceError::Gate(rejection) => {
            let payload = json!({
                "error": rejection.to_string(),
                "step": rejection.step.label(),
                "missing": rejection.missing,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        WizardServiceError::AnalysisInFlight => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        WizardServiceError::Submission(
            submission @ (SubmissionError::NotAtReview(_) | SubmissionError::MissingPhone),
        ) => {
            let payload = json!({ "error": submission.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        WizardServiceError::Submission(SubmissionError::Upload { slot, source }) => {
            let payload = json!({
                "error": format!("upload failed for '{slot}': {source}"),
                "slot": slot,
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Record summary without the raw document bytes.
fn record_summary(record: &ApplicationRecord) -> serde_json::Value {
    json!({
        "application_id": record.application_id.0,
        "phone_number": record.phone_number,
        "status": record.status.label(),
        "composite_score": record.composite_score,
        "documents": record.documents,
        "submitted_at": record.submitted_at,
    })
}

pub(crate) async fn start_session_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    let view = service.start_session();
    (StatusCode::CREATED, axum::Json(view)).into_response()
}

pub(crate) async fn session_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.session(&SessionId(session_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn patch_fields_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
    axum::Json(patch): axum::Json<StatePatch>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.patch_fields(&SessionId(session_id), patch) {
        Ok(score) => {
            let payload = json!({ "score": score });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attach_document_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
    axum::Json(attachment): axum::Json<DocumentAttachment>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service
        .attach_document(&SessionId(session_id), attachment)
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attach_assets_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<AssetBatchRequest>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service
        .attach_asset_images(&SessionId(session_id), request.placement, request.files)
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attach_proof_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path((session_id, asset_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ProofRequest>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service
        .attach_ownership_proof(&SessionId(session_id), &asset_id, request.file)
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn advance_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.advance(&SessionId(session_id)) {
        Ok(step) => step_response(step),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn back_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.back(&SessionId(session_id)) {
        Ok(step) => step_response(step),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn jump_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<JumpRequest>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.jump_to(&SessionId(session_id), request.step) {
        Ok(step) => step_response(step),
        Err(error) => error_response(error),
    }
}

fn step_response(step: WizardStep) -> Response {
    let payload = json!({
        "step": step.label(),
        "step_index": step.index(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn score_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.breakdown(&SessionId(session_id)) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.submit(&SessionId(session_id)).await {
        Ok(record) => (StatusCode::ACCEPTED, axum::Json(record_summary(&record))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn save_draft_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.save_draft(&SessionId(session_id)) {
        Ok(application_id) => {
            let payload = json!({ "application_id": application_id.0 });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resume_draft_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    axum::Json(request): axum::Json<ResumeRequest>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.resume_draft(&request.phone_number) {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pending_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Query(query): Query<PendingQuery>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.pending(query.limit.unwrap_or(50)) {
        Ok(records) => {
            let payload: Vec<_> = records.iter().map(record_summary).collect();
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn by_phone_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(phone): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.applications_by_phone(&phone) {
        Ok(records) => {
            let payload: Vec<_> = records.iter().map(record_summary).collect();
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn application_handler<A, S, R>(
    State(service): State<Arc<ApplicationWizardService<A, S, R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    match service.application(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record_summary(&record))).into_response(),
        Err(error) => error_response(error),
    }
}
