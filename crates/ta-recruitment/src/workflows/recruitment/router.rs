use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::allocation::ApplyRequest;
use super::catalog::CatalogImportError;
use super::domain::{
    ApplicationId, ModuleId, NewModule, NewRound, RequirementChange, RoundId, RoundSchedule,
    TaCategory, UserId,
};
use super::repository::{Notifier, RecruitmentStore};
use super::service::{authorize_coordinator, ErrorKind, RecruitmentError, RecruitmentService};

pub const USER_HEADER: &str = "x-user-id";
pub const CATEGORY_HEADER: &str = "x-user-category";

type SharedService<S, N> = State<Arc<RecruitmentService<S, N>>>;

/// Router builder exposing the student, lecturer, and administrator endpoints.
pub fn recruitment_router<S, N>(service: Arc<RecruitmentService<S, N>>) -> Router
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/modules/:module_id",
            get(module_handler::<S, N>),
        )
        .route(
            "/api/v1/modules/:module_id/applications",
            post(apply_handler::<S, N>).get(module_applications_handler::<S, N>),
        )
        .route(
            "/api/v1/modules/:module_id/requirements",
            put(requirements_handler::<S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/accept",
            post(accept_handler::<S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            post(reject_handler::<S, N>),
        )
        .route(
            "/api/v1/students/me/modules",
            get(available_modules_handler::<S, N>),
        )
        .route("/api/v1/admin/rounds", post(create_round_handler::<S, N>))
        .route(
            "/api/v1/admin/rounds/:round_id/activate",
            post(activate_round_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/rounds/:round_id/archive",
            post(archive_round_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/rounds/:round_id/schedule",
            put(schedule_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/rounds/:round_id/modules",
            get(round_modules_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/rounds/:round_id/catalog",
            post(import_catalog_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/rounds/:round_id/advance",
            post(advance_round_handler::<S, N>),
        )
        .route("/api/v1/admin/modules", post(create_module_handler::<S, N>))
        .route(
            "/api/v1/admin/modules/:module_id/:phase",
            post(module_phase_handler::<S, N>),
        )
        .with_state(service)
}

impl IntoResponse for RecruitmentError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = match &self {
            RecruitmentError::Internal(err) => {
                error!(error = %err, "recruitment request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let payload = json!({
            "code": kind.code(),
            "error": message,
        });
        (status, axum::Json(payload)).into_response()
    }
}

impl IntoResponse for CatalogImportError {
    fn into_response(self) -> Response {
        match self {
            CatalogImportError::Recruitment(err) => err.into_response(),
            other => {
                let payload = json!({
                    "code": "INVALID_CATALOG",
                    "error": other.to_string(),
                });
                (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
            }
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AlreadyApplied => StatusCode::CONFLICT,
        ErrorKind::InsufficientHours => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::PositionsFilled => StatusCode::CONFLICT,
        ErrorKind::InvalidRole => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotEditable => StatusCode::CONFLICT,
        ErrorKind::GuardViolation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::AlreadyProcessed => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn caller(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
        .ok_or_else(|| {
            let payload = json!({
                "code": "UNAUTHENTICATED",
                "error": format!("missing {USER_HEADER} header"),
            });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })
}

fn caller_category(headers: &HeaderMap) -> String {
    headers
        .get(CATEGORY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, RecruitmentError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyPayload {
    pub round_id: RoundId,
    #[serde(default)]
    pub ta_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AdvancePayload {
    pub today: NaiveDate,
}

pub(crate) async fn apply_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(module_id): Path<String>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<ApplyPayload>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let student = match caller(&headers) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let request = ApplyRequest {
        student,
        category: caller_category(&headers),
        module_id: ModuleId(module_id),
        round_id: payload.round_id,
        ta_hours: payload.ta_hours,
    };
    respond(StatusCode::CREATED, service.apply_for_ta(request))
}

pub(crate) async fn available_modules_handler<S, N>(
    State(service): SharedService<S, N>,
    headers: HeaderMap,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let student = match caller(&headers) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let raw = caller_category(&headers);
    let Some(category) = TaCategory::parse(&raw) else {
        return RecruitmentError::InvalidRole(raw).into_response();
    };
    respond(
        StatusCode::OK,
        service.list_available_modules(&student, category),
    )
}

pub(crate) async fn requirements_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(module_id): Path<String>,
    headers: HeaderMap,
    axum::Json(change): axum::Json<RequirementChange>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let lecturer = match caller(&headers) {
        Ok(lecturer) => lecturer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.edit_requirements(&lecturer, &ModuleId(module_id), change),
    )
}

pub(crate) async fn accept_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let lecturer = match caller(&headers) {
        Ok(lecturer) => lecturer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.accept_application(&lecturer, &ApplicationId(application_id)),
    )
}

pub(crate) async fn reject_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let lecturer = match caller(&headers) {
        Ok(lecturer) => lecturer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.reject_application(&lecturer, &ApplicationId(application_id)),
    )
}

pub(crate) async fn module_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(module_id): Path<String>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.get_module(&ModuleId(module_id)))
}

/// Applicant list for the module's coordinators.
pub(crate) async fn module_applications_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(module_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let lecturer = match caller(&headers) {
        Ok(lecturer) => lecturer,
        Err(response) => return response,
    };
    let module_id = ModuleId(module_id);
    let result = service.get_module(&module_id).and_then(|module| {
        authorize_coordinator(&module, &lecturer)?;
        service.list_module_applications(&module_id)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_round_handler<S, N>(
    State(service): SharedService<S, N>,
    axum::Json(round): axum::Json<NewRound>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::CREATED, service.create_round(round))
}

pub(crate) async fn activate_round_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.activate_round(&RoundId(round_id)))
}

pub(crate) async fn archive_round_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::OK, service.archive_round(&RoundId(round_id)))
}

pub(crate) async fn schedule_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
    axum::Json(schedule): axum::Json<RoundSchedule>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.update_round_schedule(&RoundId(round_id), schedule),
    )
}

pub(crate) async fn round_modules_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.list_round_modules(&RoundId(round_id)),
    )
}

/// Accepts the raw CSV export as the request body.
pub(crate) async fn import_catalog_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
    body: String,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    match service.import_modules(&RoundId(round_id), body.as_bytes()) {
        Ok(modules) => (StatusCode::CREATED, axum::Json(modules)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn advance_round_handler<S, N>(
    State(service): SharedService<S, N>,
    Path(round_id): Path<String>,
    axum::Json(payload): axum::Json<AdvancePayload>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        service.advance_round_phases(&RoundId(round_id), payload.today),
    )
}

pub(crate) async fn create_module_handler<S, N>(
    State(service): SharedService<S, N>,
    axum::Json(module): axum::Json<NewModule>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    respond(StatusCode::CREATED, service.create_module(module))
}

pub(crate) async fn module_phase_handler<S, N>(
    State(service): SharedService<S, N>,
    Path((module_id, phase)): Path<(String, String)>,
) -> Response
where
    S: RecruitmentStore + 'static,
    N: Notifier + 'static,
{
    let id = ModuleId(module_id);
    match phase.as_str() {
        "request-changes" => respond(StatusCode::OK, service.request_changes(&id)),
        "advertise" => respond(StatusCode::OK, service.advertise(&id)),
        "open-documents" => respond(StatusCode::OK, service.open_document_collection(&id)),
        "refresh-documents" => respond(StatusCode::OK, service.refresh_documents(&id)),
        "close" => respond(StatusCode::OK, service.close_module(&id)),
        other => {
            let payload = json!({
                "code": ErrorKind::NotFound.code(),
                "error": format!("unknown module phase '{other}'"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
    }
}
