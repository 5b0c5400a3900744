//! JSON binding of the approval workflow.
//!
//! Directory:
//! - `POST   /api/v1/roles`                         — define a role
//! - `GET    /api/v1/roles`                         — list roles by rank
//! - `GET    /api/v1/roles/{code}/holder?at=`       — resolve the effective holder
//! - `POST   /api/v1/assignments`                   — assign a role
//! - `DELETE /api/v1/assignments/{id}`              — revoke (idempotent)
//! - `POST   /api/v1/delegations`                   — delegate a role
//! - `GET    /api/v1/employees/{id}/assignments`    — assignment trail of an employee
//!
//! Registry:
//! - `POST   /api/v1/workflows`                     — create a definition
//! - `GET    /api/v1/workflows?department_id=&is_active=`
//! - `GET    /api/v1/workflows/applicable?department_id=&amount=&at=`
//! - `GET | PATCH | DELETE /api/v1/workflows/{id}`
//!
//! Engine:
//! - `POST   /api/v1/awards/{award_id}/workflow`    — start
//! - `GET    /api/v1/awards/{award_id}/workflow`
//! - `GET    /api/v1/instances/{id}`
//! - `POST   /api/v1/instances/{id}/approve | reject | cancel`
//! - `GET    /api/v1/approvers/{id}/pending`
//! - `GET    /api/v1/instances/overdue?at=`
//!
//! Inbox:
//! - `GET    /api/v1/employees/{id}/notifications`
//! - `POST   /api/v1/notifications/{id}/read`
//!
//! Callers identify themselves with `x-actor-id` and may pass `x-correlation-id`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use merit_core::domain::assignment::{ApproverAssignment, AssignmentId};
use merit_core::domain::award::AwardId;
use merit_core::domain::employee::{DepartmentId, EmployeeId};
use merit_core::domain::instance::{InstanceId, InstanceView, OverdueLevel, PendingApproval};
use merit_core::domain::role::{Role, RoleCode};
use merit_core::domain::workflow::{
    DefinitionFilter, DefinitionPatch, NewWorkflowDefinition, WorkflowDefinition,
    WorkflowDefinitionId,
};
use merit_core::errors::{ApplicationError, ErrorKind, InterfaceError};
use merit_db::repositories::{SqlNotifier, StoredNotification};
use merit_workflow::{
    AssignmentRequest, DelegationRequest, RequestContext, RoleSpec, WorkflowServices,
};

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    services: WorkflowServices,
    inbox: Option<SqlNotifier>,
}

impl ApiState {
    pub fn new(services: WorkflowServices, inbox: Option<SqlNotifier>) -> Self {
        Self { services, inbox }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, ApiFailure>;

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct HolderResponse {
    pub role: RoleCode,
    pub employee_id: EmployeeId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DefinitionSummary {
    #[serde(flatten)]
    pub definition: WorkflowDefinition,
    pub level_count: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct AtQuery {
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicableQuery {
    pub department_id: DepartmentId,
    pub amount: Decimal,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    pub approver_id: EmployeeId,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub evidence_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub approver_id: EmployeeId,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub actor_id: EmployeeId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadBody {
    pub recipient_id: EmployeeId,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/roles", post(define_role).get(list_roles))
        .route("/api/v1/roles/{code}/holder", get(resolve_holder))
        .route("/api/v1/assignments", post(assign))
        .route("/api/v1/assignments/{id}", delete(revoke))
        .route("/api/v1/delegations", post(delegate))
        .route("/api/v1/employees/{id}/assignments", get(list_assignments))
        .route("/api/v1/workflows", post(create_workflow).get(list_workflows))
        .route("/api/v1/workflows/applicable", get(find_applicable))
        .route(
            "/api/v1/workflows/{id}",
            get(get_workflow).patch(update_workflow).delete(delete_workflow),
        )
        .route("/api/v1/awards/{award_id}/workflow", post(start).get(instance_for_award))
        .route("/api/v1/instances/overdue", get(list_overdue))
        .route("/api/v1/instances/{id}", get(get_instance))
        .route("/api/v1/instances/{id}/approve", post(approve))
        .route("/api/v1/instances/{id}/reject", post(reject))
        .route("/api/v1/instances/{id}/cancel", post(cancel))
        .route("/api/v1/approvers/{id}/pending", get(list_pending))
        .route("/api/v1/employees/{id}/notifications", get(list_notifications))
        .route("/api/v1/notifications/{id}/read", post(mark_notification_read))
        .with_state(state)
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim).unwrap_or("")
    };
    let actor = match header(ACTOR_HEADER) {
        "" => "anonymous",
        actor => actor,
    };
    RequestContext::new(actor).with_correlation_id(header(CORRELATION_HEADER))
}

pub fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::Rejected { code: "not_found", .. } => StatusCode::NOT_FOUND,
        InterfaceError::Rejected { code: "not_current_level", .. } => StatusCode::CONFLICT,
        InterfaceError::Rejected { kind, .. } => match kind {
            ErrorKind::Validation | ErrorKind::Resolution => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::State => StatusCode::CONFLICT,
        },
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: ApplicationError, context: &RequestContext) -> ApiFailure {
    let interface = error.into_interface(context.correlation_id.clone());
    let status = status_for(&interface);
    warn!(
        event_name = "api.request.failed",
        correlation_id = %context.correlation_id,
        actor = %context.actor,
        code = interface.code(),
        status = status.as_u16(),
        "request failed"
    );
    (
        status,
        Json(ApiError {
            code: interface.code(),
            message: interface.user_message(),
            detail: interface.to_string(),
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}

fn ack(context: &RequestContext) -> Json<Ack> {
    Json(Ack { success: true, correlation_id: context.correlation_id.clone() })
}

fn summarize(definition: WorkflowDefinition) -> DefinitionSummary {
    let level_count = definition.level_count();
    DefinitionSummary { definition, level_count }
}

// Directory

async fn define_role(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<RoleSpec>,
) -> ApiResult<Role> {
    let context = request_context(&headers);
    state.services.directory.define_role(body, &context).await.map(Json).map_err(|e| failure(e, &context))
}

async fn list_roles(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<Vec<Role>> {
    let context = request_context(&headers);
    state.services.directory.list_roles().await.map(Json).map_err(|e| failure(e, &context))
}

async fn resolve_holder(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Query(query): Query<AtQuery>,
) -> ApiResult<HolderResponse> {
    let context = request_context(&headers);
    let role = RoleCode::new(&code);
    let at = query.at.unwrap_or_else(Utc::now);
    let employee_id =
        state.services.directory.resolve(&role, at).await.map_err(|e| failure(e, &context))?;
    Ok(Json(HolderResponse { role, employee_id, at }))
}

async fn assign(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AssignmentRequest>,
) -> Result<(StatusCode, Json<ApproverAssignment>), ApiFailure> {
    let context = request_context(&headers);
    let assignment =
        state.services.directory.assign(body, &context).await.map_err(|e| failure(e, &context))?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn revoke(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Ack> {
    let context = request_context(&headers);
    state
        .services
        .directory
        .revoke(&AssignmentId(id), &context)
        .await
        .map_err(|e| failure(e, &context))?;
    Ok(ack(&context))
}

async fn delegate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DelegationRequest>,
) -> Result<(StatusCode, Json<ApproverAssignment>), ApiFailure> {
    let context = request_context(&headers);
    let assignment =
        state.services.directory.delegate(body, &context).await.map_err(|e| failure(e, &context))?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn list_assignments(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<ApproverAssignment>> {
    let context = request_context(&headers);
    state
        .services
        .directory
        .list_assignments(&EmployeeId(id))
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

// Registry

async fn create_workflow(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<NewWorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), ApiFailure> {
    let context = request_context(&headers);
    let definition =
        state.services.registry.create(body, &context).await.map_err(|e| failure(e, &context))?;
    Ok((StatusCode::CREATED, Json(definition)))
}

async fn list_workflows(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(filter): Query<DefinitionFilter>,
) -> ApiResult<Vec<DefinitionSummary>> {
    let context = request_context(&headers);
    let definitions =
        state.services.registry.list(&filter).await.map_err(|e| failure(e, &context))?;
    Ok(Json(definitions.into_iter().map(summarize).collect()))
}

async fn find_applicable(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ApplicableQuery>,
) -> ApiResult<WorkflowDefinition> {
    let context = request_context(&headers);
    let at = query.at.unwrap_or_else(Utc::now);
    state
        .services
        .registry
        .find_applicable(&query.department_id, query.amount, at)
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn get_workflow(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<WorkflowDefinition> {
    let context = request_context(&headers);
    state
        .services
        .registry
        .get(&WorkflowDefinitionId(id))
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn update_workflow(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<DefinitionPatch>,
) -> ApiResult<WorkflowDefinition> {
    let context = request_context(&headers);
    state
        .services
        .registry
        .update(&WorkflowDefinitionId(id), patch, &context)
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn delete_workflow(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Ack> {
    let context = request_context(&headers);
    state
        .services
        .registry
        .delete(&WorkflowDefinitionId(id), &context)
        .await
        .map_err(|e| failure(e, &context))?;
    Ok(ack(&context))
}

// Engine

async fn start(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(award_id): Path<String>,
) -> Result<(StatusCode, Json<InstanceView>), ApiFailure> {
    let context = request_context(&headers);
    let view = state
        .services
        .engine
        .start(&AwardId(award_id), &context)
        .await
        .map_err(|e| failure(e, &context))?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn instance_for_award(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(award_id): Path<String>,
) -> ApiResult<InstanceView> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .find_by_award(&AwardId(award_id))
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn get_instance(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<InstanceView> {
    let context = request_context(&headers);
    state.services.engine.get(&InstanceId(id)).await.map(Json).map_err(|e| failure(e, &context))
}

async fn approve(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ApproveBody>,
) -> ApiResult<InstanceView> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .approve(&InstanceId(id), &body.approver_id, body.comments, body.evidence_reference, &context)
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn reject(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RejectBody>,
) -> ApiResult<InstanceView> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .reject(&InstanceId(id), &body.approver_id, body.comments, &context)
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn cancel(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> ApiResult<InstanceView> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .cancel(&InstanceId(id), &body.actor_id, body.reason, &context)
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn list_pending(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<PendingApproval>> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .list_pending_for(&EmployeeId(id))
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

async fn list_overdue(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<AtQuery>,
) -> ApiResult<Vec<OverdueLevel>> {
    let context = request_context(&headers);
    state
        .services
        .engine
        .list_overdue(query.at.unwrap_or_else(Utc::now))
        .await
        .map(Json)
        .map_err(|e| failure(e, &context))
}

// Inbox

fn inbox<'a>(state: &'a ApiState, context: &RequestContext) -> Result<&'a SqlNotifier, ApiFailure> {
    state.inbox.as_ref().ok_or_else(|| {
        failure(ApplicationError::Integration("notification inbox is not configured".to_owned()), context)
    })
}

async fn list_notifications(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<StoredNotification>> {
    let context = request_context(&headers);
    inbox(&state, &context)?
        .list_for_recipient(&EmployeeId(id))
        .await
        .map(Json)
        .map_err(|e| failure(e.into(), &context))
}

async fn mark_notification_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MarkReadBody>,
) -> ApiResult<Ack> {
    let context = request_context(&headers);
    let changed = inbox(&state, &context)?
        .mark_read(&id, &body.recipient_id, Utc::now())
        .await
        .map_err(|e| failure(e.into(), &context))?;
    Ok(Json(Ack { success: changed, correlation_id: context.correlation_id }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::{Path, State},
        http::{Request, StatusCode},
        Json,
    };
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use merit_core::audit::InMemoryAuditSink;
    use merit_core::config::AppConfig;
    use merit_core::domain::award::{Award, AwardId};
    use merit_core::domain::employee::{DepartmentId, Employee, EmployeeId};
    use merit_core::domain::role::{RoleCode, RoleResolution};
    use merit_core::domain::workflow::{NewApprovalLevel, NewWorkflowDefinition};
    use merit_core::notify::InMemoryNotifier;
    use merit_core::org::InMemoryOrgDirectory;
    use merit_workflow::{AssignmentRequest, RequestContext, RoleSpec, Stores, WorkflowServices};

    use super::{approve, router, start, ApiState, ApproveBody, ACTOR_HEADER, CORRELATION_HEADER};

    fn employee(id: &str, manager: Option<&str>) -> Employee {
        Employee {
            id: EmployeeId(id.to_owned()),
            name: id.to_owned(),
            department_id: Some(DepartmentId("sales".to_owned())),
            manager_id: manager.map(|raw| EmployeeId(raw.to_owned())),
            active: true,
        }
    }

    async fn seeded_state() -> ApiState {
        let org = InMemoryOrgDirectory::with_employees([
            employee("emp-ana", Some("emp-mgr")),
            employee("emp-mgr", None),
            employee("emp-fin", None),
        ]);
        let stores = Stores::in_memory(
            Arc::new(org),
            Arc::new(InMemoryNotifier::default()),
            Arc::new(InMemoryAuditSink::default()),
        );
        let services = WorkflowServices::new(stores.clone(), &AppConfig::default().workflow);
        let context = RequestContext::new("emp-admin");

        for (code, resolution) in
            [("direct_manager", RoleResolution::SubjectManager), ("finance_officer", RoleResolution::Assignment)]
        {
            services
                .directory
                .define_role(
                    RoleSpec { code: code.to_owned(), display_name: code.to_owned(), rank: 1, resolution },
                    &context,
                )
                .await
                .expect("role");
        }
        services
            .directory
            .assign(
                AssignmentRequest {
                    role: RoleCode::new("finance_officer"),
                    employee_id: EmployeeId("emp-fin".to_owned()),
                    starts_at: Utc::now() - Duration::days(1),
                    ends_at: None,
                },
                &context,
            )
            .await
            .expect("assignment");
        services
            .registry
            .create(
                NewWorkflowDefinition {
                    name: "Standard bonus".to_owned(),
                    description: None,
                    min_value: Decimal::ZERO,
                    max_value: None,
                    department_id: None,
                    levels: ["direct_manager", "finance_officer"]
                        .iter()
                        .zip(1..)
                        .map(|(role, level_order)| NewApprovalLevel {
                            level_order,
                            approver_role: RoleCode::new(role),
                            requires_comment: false,
                            requires_evidence: false,
                            timeout_days: None,
                        })
                        .collect(),
                },
                &context,
            )
            .await
            .expect("definition");
        stores
            .awards
            .save(Award {
                id: AwardId("awd-1".to_owned()),
                subject_id: EmployeeId("emp-ana".to_owned()),
                department_id: DepartmentId("sales".to_owned()),
                amount: Decimal::new(5000, 0),
                currency: "BRL".to_owned(),
                reference: None,
            })
            .await
            .expect("award");

        ApiState::new(services, None)
    }

    async fn call(state: ApiState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(ACTOR_HEADER, "emp-tester")
            .header(CORRELATION_HEADER, "corr-test")
            .body(body.map_or_else(Body::empty, |value| Body::from(value.to_string())))
            .expect("request");
        let response = router(state).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
        (status, payload)
    }

    #[tokio::test]
    async fn start_then_approve_through_handlers() {
        let state = seeded_state().await;

        let (status, Json(view)) = start(State(state.clone()), Default::default(), Path("awd-1".to_owned()))
            .await
            .expect("start should succeed");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view.instance.current_level, 1);

        let Json(advanced) = approve(
            State(state),
            Default::default(),
            Path(view.instance.id.0.clone()),
            Json(ApproveBody {
                approver_id: EmployeeId("emp-mgr".to_owned()),
                comments: None,
                evidence_reference: None,
            }),
        )
        .await
        .expect("approve should succeed");
        assert_eq!(advanced.instance.current_level, 2);
    }

    #[tokio::test]
    async fn failures_map_to_stable_codes_and_statuses() {
        let state = seeded_state().await;

        let (status, payload) = call(state.clone(), "POST", "/api/v1/awards/awd-1/workflow", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let instance_id = payload["instance"]["id"].as_str().expect("instance id").to_owned();

        let (status, payload) = call(state.clone(), "POST", "/api/v1/awards/awd-1/workflow", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(payload["code"], "already_submitted");
        assert_eq!(payload["correlation_id"], "corr-test");

        let approve_uri = format!("/api/v1/instances/{instance_id}/approve");
        let (status, payload) =
            call(state.clone(), "POST", &approve_uri, Some(json!({ "approver_id": "emp-fin" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(payload["code"], "not_current_level");

        let (status, payload) =
            call(state.clone(), "POST", &approve_uri, Some(json!({ "approver_id": "emp-x" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(payload["code"], "not_authorized");

        let reject_uri = format!("/api/v1/instances/{instance_id}/reject");
        let (status, payload) = call(
            state.clone(),
            "POST",
            &reject_uri,
            Some(json!({ "approver_id": "emp-mgr", "comments": "no" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(payload["code"], "missing_comment");

        let (status, payload) = call(state.clone(), "GET", "/api/v1/instances/wfi-missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["code"], "not_found");

        let (status, payload) =
            call(state, "GET", "/api/v1/workflows/applicable?department_id=sales&amount=-5", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(payload["code"], "no_applicable_workflow");
    }

    #[tokio::test]
    async fn pending_and_listing_routes_return_json() {
        let state = seeded_state().await;
        call(state.clone(), "POST", "/api/v1/awards/awd-1/workflow", None).await;

        let (status, payload) = call(state.clone(), "GET", "/api/v1/approvers/emp-mgr/pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.as_array().map(Vec::len), Some(1));
        assert_eq!(payload[0]["level_order"], 1);

        let (status, payload) = call(state.clone(), "GET", "/api/v1/workflows?is_active=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload[0]["level_count"], 2);

        let (status, payload) = call(state.clone(), "GET", "/api/v1/roles/finance_officer/holder", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["employee_id"], "emp-fin");

        let (status, payload) = call(state, "GET", "/api/v1/employees/emp-mgr/notifications", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "no inbox without a database");
        assert_eq!(payload["code"], "service_unavailable");
    }
}
