//! HTTP request handlers
//!
//! Linking API used by the desktop page (start + status polling) and the phone
//! (pairing parameters + finish).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nearlink_auth::{
    FinishRequest, FinishResponse, LinkError, LinkStartResponse, LinkStatus, PairParams,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Start a linking attempt
        .route("/", get(link_start_handler))
        .route("/link", get(link_start_handler))
        .route("/api/link/start", post(link_start_handler))
        // Phone side
        .route("/pair", get(pair_handler))
        .route("/webauthn/finish", post(finish_handler))
        // Desktop polling
        .route("/status", get(status_handler))
        // Server info
        .route("/api/info", get(server_info_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Linking failure mapped onto an HTTP status
#[derive(Debug)]
pub struct ApiError(pub LinkError);

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            LinkError::UnknownSession => StatusCode::NOT_FOUND,
            LinkError::ProximityNotVerified => StatusCode::FORBIDDEN,
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SidQuery {
    sid: String,
}

// ============================================================================
// Linking API Handlers
// ============================================================================

/// Create a new linking session
///
/// Returns the sid, the passkey challenge and the QR payload for the linking UI.
async fn link_start_handler(State(state): State<Arc<AppState>>) -> Json<LinkStartResponse> {
    Json(state.linking.start_linking().await)
}

/// Pairing parameters for a sid scanned from the QR code
async fn pair_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SidQuery>,
) -> Result<Json<PairParams>, Response> {
    state
        .linking
        .pair_params(&query.sid)
        .await
        .map(Json)
        .map_err(|_| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: "unknown sid".to_string(),
                }),
            )
                .into_response()
        })
}

/// Complete linking once the passkey ceremony is done
///
/// 404 for an unknown session, 403 while proximity is unverified.
async fn finish_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FinishRequest>,
) -> Result<Json<FinishResponse>, ApiError> {
    Ok(Json(state.linking.finish(request).await?))
}

/// Poll a session's progress. Unknown sids get the all-false default.
async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SidQuery>,
) -> Json<LinkStatus> {
    debug!("Status requested for sid={}", query.sid);
    Json(state.linking.status(&query.sid).await)
}

// ============================================================================
// Server Info
// ============================================================================

/// Server information response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server version
    pub version: String,
    /// Relying party id
    pub rp_id: String,
    /// Sessions currently held in memory
    pub active_sessions: usize,
    /// RSSI threshold in dBm
    pub rssi_threshold: i16,
    /// Strong samples required for confirmation
    pub consecutive_hits: u32,
}

/// Get server information
async fn server_info_handler(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        rp_id: state.linking.rp_id().to_string(),
        active_sessions: state.registry().len().await,
        rssi_threshold: state.config.proximity.rssi_threshold,
        consecutive_hits: state.config.proximity.consecutive_hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use nearlink_auth::{MatchOutcome, ProximityMatcher, SessionRegistry};
    use nearlink_core::{AdvertisementSample, Config};
    use nearlink_discovery::AdvertisementFilter;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::from_config(
            Config::new(),
            Arc::new(SessionRegistry::new()),
        ));
        (create_router(state.clone()), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn start(app: &Router) -> (String, String) {
        let (status, body) = send(app, post_json("/api/link/start", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let sid = body["sid"].as_str().unwrap().to_string();

        let (status, params) = send(app, get_req(&format!("/pair?sid={}", sid))).await;
        assert_eq!(status, StatusCode::OK);
        let session_id = params["sessionId"].as_str().unwrap().to_string();
        (sid, session_id)
    }

    #[tokio::test]
    async fn test_start_returns_linking_payload() {
        let (app, _) = test_app();
        let (status, body) = send(&app, get_req("/link")).await;
        assert_eq!(status, StatusCode::OK);

        let sid = body["sid"].as_str().unwrap();
        assert_eq!(body["qr"]["sid"], sid);
        assert_eq!(body["qr"]["rpId"], "localhost");
        assert_eq!(body["qr"]["url"], "http://localhost:8889");
        assert!(body["challenge"].as_str().unwrap().len() >= 43);
        assert!(body["qrImageUrl"].as_str().unwrap().contains("data="));
    }

    #[tokio::test]
    async fn test_pair_unknown_sid_is_not_found() {
        let (app, _) = test_app();
        let (status, body) = send(&app, get_req("/pair?sid=doesnotexist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown sid");
    }

    #[tokio::test]
    async fn test_status_unknown_sid_defaults() {
        let (app, _) = test_app();
        let (status, body) = send(&app, get_req("/status?sid=doesnotexist")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"proximityConfirmed": false, "linked": false}));
    }

    #[tokio::test]
    async fn test_finish_status_codes() {
        let (app, _) = test_app();
        let (sid, session_id) = start(&app).await;

        let (status, _) = send(
            &app,
            post_json(
                "/webauthn/finish",
                json!({"sessionId": "00000000000000000000000000000000", "userId": "alice"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            post_json(
                "/webauthn/finish",
                json!({"sessionId": session_id, "userId": "alice"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("proximity"));

        let (_, body) = send(&app, get_req(&format!("/status?sid={}", sid))).await;
        assert_eq!(body["linked"], false);
    }

    #[tokio::test]
    async fn test_server_info() {
        let (app, _) = test_app();
        start(&app).await;
        let (status, body) = send(&app, get_req("/api/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeSessions"], 1);
        assert_eq!(body["rssiThreshold"], -58);
        assert_eq!(body["consecutiveHits"], 3);
    }

    #[tokio::test]
    async fn test_end_to_end_proximity_then_link() {
        let (app, state) = test_app();
        let (sid, session_id) = start(&app).await;

        let mut filter = AdvertisementFilter::from_config(&state.config.proximity);
        let mut matcher = ProximityMatcher::new(
            state.registry().clone(),
            state.config.proximity.dedupe_window(),
        );

        // The phone advertises the sid it scanned, padded and upper-cased
        let advertised = format!("{}  ", sid.to_uppercase());
        let mut events = Vec::new();
        for _ in 0..3 {
            let sample = AdvertisementSample::new("AA:BB:CC:DD:EE:FF", advertised.trim(), Some(-55));
            events.extend(filter.observe(&sample));
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(
            matcher.handle(&events[0]).await,
            MatchOutcome::Confirmed(_)
        ));

        let (_, body) = send(&app, get_req(&format!("/status?sid={}", sid))).await;
        assert_eq!(body["proximityConfirmed"], true);
        assert_eq!(body["linked"], false);

        let (status, body) = send(
            &app,
            post_json(
                "/webauthn/finish",
                json!({"sessionId": session_id, "userId": "alice"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (_, body) = send(&app, get_req(&format!("/status?sid={}", sid))).await;
        assert_eq!(
            body,
            json!({"proximityConfirmed": true, "linked": true, "userId": "alice"})
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_finish_before_confirmation() {
        let (app, state) = test_app();
        let (sid, session_id) = start(&app).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let app = app.clone();
            let session_id = session_id.clone();
            handles.push(tokio::spawn(async move {
                let request = post_json(
                    "/webauthn/finish",
                    json!({"sessionId": session_id, "userId": format!("user-{}", i)}),
                );
                app.oneshot(request).await.unwrap().status()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::FORBIDDEN);
        }

        let session = state.registry().by_sid(&sid).await.unwrap();
        assert!(!session.linked());
        assert!(session.user_id.is_none());
    }
}
