//! Detection endpoints: submit, status query, mass query, detector list.
//!
//! The front door owns all request-shape validation: malformed bodies,
//! caller-supplied request ids, and unknown detectors become 400 before
//! anything reaches the engine. Accepted requests travel as envelopes and
//! wait a bounded time for the engine's reply; an expired wait surfaces
//! 408 to the caller and leaves engine state untouched.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use verity_core::{OwnerId, RequestId, StatusRecord};

use super::AppState;
use crate::engine::{ClientRequest, EngineReply, SubmitDetection};

/// Submission body for `PUT /api/v1/detection`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitDetectionBody {
    /// Must be absent: request ids are minted by the server.
    #[serde(default)]
    pub request_id: Option<Uuid>,
    /// Content to be analyzed.
    pub content: String,
    /// Which detector variant to run.
    pub detector_name: String,
    /// Optional owner key used for mass status queries.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// A status record as returned by the detection endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct DetectionStatusResponse {
    pub request_id: Uuid,
    /// One of PENDING, IN_PROGRESS, FINISHED, FAILED, REJECTED,
    /// PARSING_FAILED, TRANSPORT_FAILED, UNKNOWN.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictResponse>,
}

/// Classification result attached to a finished record.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerdictResponse {
    pub labels: Vec<LabelResponse>,
}

/// One label with its probability.
#[derive(Debug, Serialize, ToSchema)]
pub struct LabelResponse {
    pub label: String,
    pub probability: f64,
}

/// Body of `GET /api/v1/detectors`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DetectorsResponse {
    pub detectors: Vec<String>,
}

/// Uniform error body for all 4xx/5xx responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<StatusRecord> for DetectionStatusResponse {
    fn from(record: StatusRecord) -> Self {
        Self {
            request_id: record.request_id.as_uuid(),
            status: record.status.as_str().to_string(),
            verdict: record.verdict.map(|verdict| VerdictResponse {
                labels: verdict
                    .labels
                    .into_iter()
                    .map(|label| LabelResponse {
                        label: label.label,
                        probability: label.probability,
                    })
                    .collect(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectionQueryParams {
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MassQueryParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Submit a detection request for asynchronous processing.
///
/// Replies immediately with the freshly minted PENDING record (or a
/// synthetic terminal failure); the verdict arrives later via polling.
#[utoipa::path(
    put,
    path = "/api/v1/detection",
    request_body = SubmitDetectionBody,
    responses(
        (status = 200, description = "Accepted; current status record", body = DetectionStatusResponse),
        (status = 400, description = "Malformed body, supplied request id, or unknown detector", body = ErrorResponse),
        (status = 408, description = "Engine reply wait expired", body = ErrorResponse),
    )
)]
pub async fn put_detection(
    State(state): State<AppState>,
    body: Result<Json<SubmitDetectionBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return bad_request("invalid request body");
    };

    if body.request_id.is_some_and(|id| !id.is_nil()) {
        return bad_request("request id is assigned by the server");
    }
    if body.content.is_empty() {
        return bad_request("content must not be empty");
    }
    match state.detectors.exists(&body.detector_name).await {
        Ok(true) => {}
        Ok(false) => return bad_request("unknown detector"),
        Err(err) => {
            // Degrade: an unreadable catalog means the name cannot be
            // validated, which is a caller-visible rejection, not a crash.
            warn!(error = %err, "detector catalog read failed");
            return bad_request("unknown detector");
        }
    }

    let request = ClientRequest::Submit(SubmitDetection {
        content: body.content,
        detector_name: body.detector_name,
        owner: body.user_id.map(OwnerId::from),
    });
    match wait_for_engine(&state, request).await {
        Ok(EngineReply::Record(record)) => {
            (StatusCode::OK, Json(DetectionStatusResponse::from(record))).into_response()
        }
        Ok(EngineReply::Records(_)) => engine_protocol_error(),
        Err(response) => response,
    }
}

/// Fetch the status record for one request id.
#[utoipa::path(
    get,
    path = "/api/v1/detection",
    params(("requestId" = String, Query, description = "Request id to look up")),
    responses(
        (status = 200, description = "Status record; UNKNOWN for unseen ids", body = DetectionStatusResponse),
        (status = 400, description = "Missing or malformed request id", body = ErrorResponse),
        (status = 408, description = "Engine reply wait expired", body = ErrorResponse),
    )
)]
pub async fn get_detection(
    State(state): State<AppState>,
    Query(params): Query<DetectionQueryParams>,
) -> Response {
    let Some(raw) = params.request_id else {
        return bad_request("missing requestId parameter");
    };
    let Ok(id) = raw.parse::<RequestId>() else {
        return bad_request("requestId is not a valid UUID");
    };

    match wait_for_engine(&state, ClientRequest::Query(id)).await {
        Ok(EngineReply::Record(record)) => {
            (StatusCode::OK, Json(DetectionStatusResponse::from(record))).into_response()
        }
        Ok(EngineReply::Records(_)) => engine_protocol_error(),
        Err(response) => response,
    }
}

/// Fetch all status records, optionally filtered by owner.
#[utoipa::path(
    get,
    path = "/api/v1/detection/mass",
    params(("userId" = Option<String>, Query, description = "Owner key to filter by")),
    responses(
        (status = 200, description = "Status records", body = [DetectionStatusResponse]),
        (status = 400, description = "Malformed owner id", body = ErrorResponse),
        (status = 408, description = "Engine reply wait expired", body = ErrorResponse),
    )
)]
pub async fn get_mass_detection(
    State(state): State<AppState>,
    Query(params): Query<MassQueryParams>,
) -> Response {
    let owner = match params.user_id {
        None => None,
        Some(raw) => match raw.parse::<OwnerId>() {
            Ok(owner) => Some(owner),
            Err(_) => return bad_request("userId is not a valid UUID"),
        },
    };

    match wait_for_engine(&state, ClientRequest::MassQuery(owner)).await {
        Ok(EngineReply::Records(records)) => {
            let body: Vec<DetectionStatusResponse> = records
                .into_iter()
                .map(DetectionStatusResponse::from)
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(EngineReply::Record(_)) => engine_protocol_error(),
        Err(response) => response,
    }
}

/// List the detectors available to submissions.
#[utoipa::path(
    get,
    path = "/api/v1/detectors",
    responses((status = 200, description = "Available detector names", body = DetectorsResponse))
)]
pub async fn get_detectors(State(state): State<AppState>) -> Response {
    let detectors = match state.detectors.list().await {
        Ok(detectors) => detectors,
        Err(err) => {
            warn!(error = %err, "detector catalog read failed");
            Vec::new()
        }
    };
    (StatusCode::OK, Json(DetectorsResponse { detectors })).into_response()
}

/// Sends an envelope to the engine and waits, bounded, for its reply.
///
/// The wait is the front door's own: expiry yields 408 to the caller and
/// the engine remains free to finish (and discard) the abandoned reply.
async fn wait_for_engine(state: &AppState, request: ClientRequest) -> Result<EngineReply, Response> {
    let _guard = state.shutdown.in_flight_guard();

    let rx = match state.engine.send(request).await {
        Ok(rx) => rx,
        Err(err) => {
            error!(error = %err, "engine feed closed");
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "engine unavailable",
            ));
        }
    };

    match tokio::time::timeout(state.config.reply_timeout, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "engine dropped the request",
        )),
        Err(_) => Err(error_response(
            StatusCode::REQUEST_TIMEOUT,
            "request timeout",
        )),
    }
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// A reply variant the route can never produce means wiring is broken.
fn engine_protocol_error() -> Response {
    error!("engine replied with a mismatched variant");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}
