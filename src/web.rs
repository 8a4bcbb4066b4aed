//! HTTP API router and handlers.
//!
//! The acting moderator is taken from the `X-Actor-Id` header and passed to
//! the services as an explicit [`ActorContext`].

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::{Layer, Service};

use crate::assignment::AssignmentManager;
use crate::audit::{AuditEntry, AuditTrail};
use crate::database::{self, ReportQuery};
use crate::enforcement::RestrictionEnforcer;
use crate::error::{ErrorContext, TribunalError};
use crate::events::EventBus;
use crate::models::{
    ActorContext, CapabilityRestriction, ContentModeration, ContentRef, RelatedContentType,
    Report, ReportStatus, Restriction, RestrictionType,
};
use crate::reports::ReportService;
use crate::restoration::RestorationManager;
use crate::state_machine::{NewReport, ProcessCommand};

pub const ACTOR_HEADER: &str = "x-actor-id";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Request logging middleware layer
#[derive(Clone)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Service that logs all requests with method, path, status, and response time
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S> Service<Request> for RequestLoggingService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let actor = req
            .headers()
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let start = std::time::Instant::now();

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(req).await?;

            tracing::info!(
                method = %method,
                path = %uri.path(),
                actor_id = ?actor,
                status = %response.status().as_u16(),
                duration_ms = %start.elapsed().as_millis(),
                "HTTP request"
            );

            Ok(response)
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub assignments: Arc<AssignmentManager>,
    pub restoration: Arc<RestorationManager>,
    pub enforcer: Arc<RestrictionEnforcer>,
    pub audit: Arc<AuditTrail>,
    pub events: EventBus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with just a message
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: None,
        }
    }

    /// Create an error response with a request ID for tracking
    pub fn with_request_id(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: Some(request_id.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// HTTP status for an error.
pub fn status_for(error: &TribunalError) -> StatusCode {
    match error {
        TribunalError::Validation(_)
        | TribunalError::IllegalStatusForAction { .. }
        | TribunalError::MissingRequiredField { .. }
        | TribunalError::Json(_) => StatusCode::BAD_REQUEST,
        TribunalError::NotFound(_) => StatusCode::NOT_FOUND,
        TribunalError::NotAssignedToActor { .. } => StatusCode::FORBIDDEN,
        TribunalError::AlreadyAssigned { .. }
        | TribunalError::AlreadyAdjudicated { .. }
        | TribunalError::IneligibleForRestore { .. }
        | TribunalError::AlreadyRestored { .. } => StatusCode::CONFLICT,
        TribunalError::Database(_) | TribunalError::InternalState(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TribunalError::Config(_) | TribunalError::RegexPattern(_) | TribunalError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert TribunalError to an API error, logging it with context.
fn handle_error(error: TribunalError, context: ErrorContext) -> ApiError {
    error.log_with_context(&context);

    (
        status_for(&error),
        Json(ErrorResponse::with_request_id(
            error.user_message(),
            context.request_id,
        )),
    )
}

fn get_actor(headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ActorContext::new)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Missing X-Actor-Id header"))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/reports", post(create_report).get(list_reports))
        .route(
            "/api/reports/{report_id}",
            get(get_report).delete(delete_report),
        )
        .route("/api/reports/{report_id}/assign", post(assign_report))
        .route("/api/reports/{report_id}/process", post(process_report))
        .route("/api/reports/{report_id}/restore-user", post(restore_user))
        .route(
            "/api/reports/{report_id}/restore-content",
            post(restore_content),
        )
        .route("/api/reports/{report_id}/audit", get(get_audit_trail))
        .route("/api/users/{user_id}/restrictions", get(get_user_restrictions))
        .route(
            "/api/content/{content_type}/{content_id}/moderation",
            get(get_content_moderation),
        )
        .route("/ws", get(websocket_handler))
        .layer(RequestLoggingLayer)
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

async fn create_report(
    State(state): State<AppState>,
    Json(input): Json<NewReport>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let context = ErrorContext::new("create_report").with_actor_id(input.reporter_id.clone());
    let id = state
        .reports
        .create_report(input)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<ReportStatus>,
    pub moderator_id: Option<String>,
    pub content_type: Option<RelatedContentType>,
    pub content_id: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl ListParams {
    fn to_query(&self) -> Result<ReportQuery, ApiError> {
        let related_content = match (self.content_type, &self.content_id) {
            (Some(content_type), Some(content_id)) => Some(ContentRef {
                content_type,
                content_id: content_id.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "content_type and content_id must be given together",
                ))
            }
        };

        Ok(ReportQuery {
            status: self.status,
            assigned_moderator_id: self.moderator_id.clone(),
            related_content,
        })
    }
}

async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let query = params.to_query()?;
    let reports = state
        .reports
        .list_reports(&query, params.limit, params.offset)
        .await
        .map_err(|e| handle_error(e, ErrorContext::new("list_reports")))?;

    Ok(Json(reports))
}

async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    let report = state.reports.get_report(&report_id).await.map_err(|e| {
        handle_error(e, ErrorContext::new("get_report").with_report_id(report_id.clone()))
    })?;

    Ok(Json(report))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let actor = get_actor(&headers)?;
    let context = ErrorContext::new("delete_report")
        .with_actor_id(actor.actor_id.clone())
        .with_report_id(report_id.clone());

    state
        .reports
        .soft_delete_report(&report_id, &actor)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    /// Defaults to the acting moderator.
    pub moderator_id: Option<String>,
}

async fn assign_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Report>, ApiError> {
    let actor = get_actor(&headers)?;
    let request: AssignRequest = if body.is_empty() {
        AssignRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid assign request"))?
    };
    let moderator_id = request
        .moderator_id
        .unwrap_or_else(|| actor.actor_id.clone());
    let context = ErrorContext::new("assign_report")
        .with_actor_id(actor.actor_id.clone())
        .with_report_id(report_id.clone());

    let report = state
        .assignments
        .assign(&report_id, &moderator_id, &actor)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(report))
}

async fn process_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    Json(command): Json<ProcessCommand>,
) -> Result<Json<Report>, ApiError> {
    let actor = get_actor(&headers)?;
    let context = ErrorContext::new("process_report")
        .with_actor_id(actor.actor_id.clone())
        .with_report_id(report_id.clone());

    let report = state
        .reports
        .process_report(&report_id, &actor, &command)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(report))
}

async fn restore_user(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Report>, ApiError> {
    let actor = get_actor(&headers)?;
    let context = ErrorContext::new("restore_user")
        .with_actor_id(actor.actor_id.clone())
        .with_report_id(report_id.clone());

    let report = state
        .restoration
        .restore_user(&report_id, &actor)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(report))
}

async fn restore_content(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Report>, ApiError> {
    let actor = get_actor(&headers)?;
    let context = ErrorContext::new("restore_content")
        .with_actor_id(actor.actor_id.clone())
        .with_report_id(report_id.clone());

    let report = state
        .restoration
        .restore_content(&report_id, &actor)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(report))
}

async fn get_audit_trail(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let context = ErrorContext::new("get_audit_trail").with_report_id(report_id.clone());

    // Audit rows outlive soft deletion; unknown ids still 404.
    let entries = state
        .audit
        .entries_for_report(&report_id)
        .await
        .map_err(|e| handle_error(e, context.clone()))?;
    if entries.is_empty() {
        return Err(handle_error(TribunalError::NotFound(report_id), context));
    }

    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct UserRestrictionsResponse {
    pub user_id: String,
    pub effective_type: RestrictionType,
    pub restriction: Restriction,
    pub capabilities: Vec<CapabilityRestriction>,
}

async fn get_user_restrictions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserRestrictionsResponse>, ApiError> {
    let context = ErrorContext::new("get_user_restrictions");

    let restriction = state
        .enforcer
        .get_restriction(&user_id)
        .await
        .map_err(|e| handle_error(e, context.clone()))?;
    let capabilities = state
        .enforcer
        .active_capability_restrictions(&user_id)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(UserRestrictionsResponse {
        effective_type: restriction.effective_type(database::now()),
        user_id,
        restriction,
        capabilities,
    }))
}

async fn get_content_moderation(
    State(state): State<AppState>,
    Path((content_type, content_id)): Path<(String, String)>,
) -> Result<Json<ContentModeration>, ApiError> {
    let content_type = RelatedContentType::parse(&content_type)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Unknown content type"))?;
    let content = ContentRef {
        content_type,
        content_id,
    };

    let moderation = state
        .enforcer
        .content_moderation(&content)
        .await
        .map_err(|e| handle_error(e, ErrorContext::new("get_content_moderation")))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "No moderation record"))?;

    Ok(Json(moderation))
}

async fn websocket_handler(
    ws: axum::extract::WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let actor = get_actor(&headers)?;

    Ok(ws
        .on_upgrade(move |socket| async move {
            state.events.handle_connection(socket, actor).await;
        })
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::assignment::AssignmentManager;
    use crate::audit::AuditTrail;
    use crate::database::Database;
    use crate::enforcement::RestrictionEnforcer;
    use crate::error::TribunalError;
    use crate::events::EventBus;
    use crate::reports::ReportService;
    use crate::restoration::RestorationManager;
    use crate::state_machine::RestorePolicy;
    use crate::web::{build_router, status_for, AppState};

    async fn app() -> Router {
        let db = Arc::new(Database::in_memory().await.expect("should create db"));
        let events = EventBus::new(64);
        build_router(AppState {
            reports: Arc::new(ReportService::new(db.clone(), events.clone())),
            assignments: Arc::new(AssignmentManager::new(db.clone(), events.clone())),
            restoration: Arc::new(RestorationManager::new(
                db.clone(),
                events.clone(),
                RestorePolicy::default(),
            )),
            enforcer: Arc::new(RestrictionEnforcer::new(db.clone())),
            audit: Arc::new(AuditTrail::new(db)),
            events,
        })
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header("X-Actor-Id", actor);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn new_report_body() -> Value {
        json!({
            "reporter_id": "reporter-1",
            "reported_user_id": "user-1",
            "report_type": "spam",
            "related_content_type": "track",
            "related_content_id": "track-9",
            "description": "reuploaded spam track",
            "evidences": ["https://example.com/evidence"]
        })
    }

    async fn create(app: &Router) -> String {
        let (status, body) =
            send(app, Method::POST, "/api/reports", None, Some(new_report_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&TribunalError::Validation("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TribunalError::NotAssignedToActor {
                report_id: "r".to_string(),
                actor_id: "a".to_string()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&TribunalError::AlreadyRestored {
                report_id: "r".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&TribunalError::Database("x".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let app = app().await;
        let id = create(&app).await;

        let (status, body) = send(&app, Method::GET, &format!("/api/reports/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/assign", id),
            Some("m1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assigned_moderator_id"], "m1");
        assert_eq!(body["status"], "under_review");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/process", id),
            Some("m1"),
            Some(json!({"action": "content_removal", "status": "approved", "note": "spam"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action_taken"], "content_removal");

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/content/track/track-9/moderation",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hidden"], true);

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/restore-content", id),
            Some("m1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "restored");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/restore-content", id),
            Some("m1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/reports/{}/audit", id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let transitions: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["transition"].as_str().unwrap())
            .collect();
        assert_eq!(
            transitions,
            vec!["created", "assigned", "processed", "restored_content"]
        );
    }

    #[tokio::test]
    async fn rejections_map_to_status_codes() {
        let app = app().await;
        let id = create(&app).await;
        let assign = format!("/api/reports/{}/assign", id);
        let process = format!("/api/reports/{}/process", id);

        let (status, _) = send(&app, Method::POST, &assign, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::POST, &assign, Some("m1"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::POST, &assign, Some("m2"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["request_id"].is_string());

        let (status, _) = send(
            &app,
            Method::POST,
            &process,
            Some("m2"),
            Some(json!({"action": "warning", "status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            Method::POST,
            &process,
            Some("m1"),
            Some(json!({"action": "no_action", "status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not legal"));

        let (status, _) = send(&app, Method::GET, "/api/reports/missing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn restrictions_endpoint_reports_ban() {
        let app = app().await;
        let id = create(&app).await;
        send(&app, Method::POST, &format!("/api/reports/{}/assign", id), Some("m1"), None).await;
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/reports/{}/process", id),
            Some("m1"),
            Some(json!({"action": "permanent_ban", "status": "approved"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&app, Method::GET, "/api/users/user-1/restrictions", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["effective_type"], "banned");
        assert_eq!(body["restriction"]["source_report_id"], id.as_str());
        assert!(body["capabilities"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_and_delete() {
        let app = app().await;
        let first = create(&app).await;
        create(&app).await;

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/reports?status=pending&content_type=track&content_id=track-9&limit=10",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) = send(&app, Method::GET, "/api/reports?content_type=track", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/reports/{}", first),
            Some("m1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, Method::GET, "/api/reports", None, None).await;
        let reports = body.as_array().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["total_reports_count"], 1);
    }
}
