#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reportr_kernel_contracts::report::ReportSubmission;
use reportr_kernel_contracts::UnixTimeSec;
use reportr_os::export::CSV_CONTENT_TYPE;
use reportr_os::{GateError, IdentityVerifier, ReportDesk, SessionContext, SessionRegistry};
use reportr_storage::{ReportStore, StorageError};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cookie::SessionCookie;
use crate::provider::IdentityProvider;

pub const UNAUTHORIZED_DETAIL: &str = "Unauthorized call. Are you authenticated?";
pub const REPORT_FORM_PATH: &str = "/report.html";

#[derive(Clone)]
pub struct AppState {
    desk: ReportDesk<ReportStore>,
    sessions: Arc<Mutex<SessionRegistry>>,
    verifier: IdentityVerifier,
    provider: Arc<dyn IdentityProvider>,
    cookie: SessionCookie,
    redirect_uri: String,
    static_dir: PathBuf,
}

impl AppState {
    pub fn new(
        desk: ReportDesk<ReportStore>,
        sessions: SessionRegistry,
        verifier: IdentityVerifier,
        provider: Arc<dyn IdentityProvider>,
        cookie_secure: bool,
        redirect_uri: impl Into<String>,
        static_dir: impl Into<PathBuf>,
    ) -> Self {
        let cookie = SessionCookie::new(cookie_secure, sessions.ttl_secs());
        Self {
            desk,
            sessions: Arc::new(Mutex::new(sessions)),
            verifier,
            provider,
            cookie,
            redirect_uri: redirect_uri.into(),
            static_dir: static_dir.into(),
        }
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, SessionRegistry>, ApiError> {
        self.sessions.lock().map_err(|_| {
            error!("session registry lock poisoned");
            ApiError::Internal
        })
    }

    fn session_context(&self, headers: &HeaderMap) -> Result<SessionContext, ApiError> {
        let token = SessionCookie::read(headers);
        Ok(self
            .lock_sessions()?
            .context(token.as_ref(), now_unix_sec()))
    }
}

#[derive(Debug, Serialize)]
struct DetailBody {
    detail: String,
}

#[derive(Debug)]
enum ApiError {
    Gate(GateError),
    MalformedBody(String),
    Internal,
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        ApiError::Gate(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Gate(GateError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, UNAUTHORIZED_DETAIL.to_string())
            }
            ApiError::Gate(GateError::Validation(v)) => {
                (StatusCode::BAD_REQUEST, format!("invalid report: {v}"))
            }
            ApiError::MalformedBody(reason) => {
                (StatusCode::BAD_REQUEST, format!("invalid report: {reason}"))
            }
            ApiError::Gate(GateError::Storage(err)) => {
                error!(error = %err, "report storage unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "report storage unavailable".to_string(),
                )
            }
            ApiError::Gate(GateError::Export(err)) => {
                error!(error = %err, "export rendering failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(DetailBody { detail })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    #[serde(rename = "Success")]
    pub success: bool,
}

/// Liveness only; report volume stays behind the admin export.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct AuthCallbackParams {
    code: Option<String>,
    state: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/backend/login", get(login))
        .route("/backend/auth", get(auth_callback))
        .route("/backend/logout", get(logout))
        .route("/backend/report", post(submit_report))
        .route("/backend/reports", get(export_json))
        .route("/backend/reports.csv", get(export_csv))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn login(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let existing = SessionCookie::read(&headers);
    let (token, oauth_state) = state
        .lock_sessions()?
        .begin_login(existing.as_ref(), now_unix_sec());
    let location = state
        .provider
        .authorize_url(&oauth_state, &state.redirect_uri)
        .map_err(|err| {
            error!(error = %err, "failed to build authorization url");
            ApiError::Internal
        })?;
    info!("login started");
    Ok((
        [(SET_COOKIE, state.cookie.issue(&token))],
        Redirect::to(&location),
    )
        .into_response())
}

async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthCallbackParams>,
) -> Result<Response, ApiError> {
    let Some(token) = SessionCookie::read(&headers) else {
        warn!("auth callback without session cookie");
        return Err(GateError::Unauthorized.into());
    };
    let expected_state = state
        .lock_sessions()?
        .take_oauth_state(&token, now_unix_sec());
    let (Some(code), Some(got_state)) = (params.code, params.state) else {
        warn!("auth callback missing code or state");
        return Err(GateError::Unauthorized.into());
    };
    if expected_state.as_deref() != Some(got_state.as_str()) {
        warn!("auth callback state mismatch");
        return Err(GateError::Unauthorized.into());
    }

    let provider = state.provider.clone();
    let redirect_uri = state.redirect_uri.clone();
    let claim = tokio::task::spawn_blocking(move || provider.exchange(&code, &redirect_uri))
        .await
        .map_err(|err| {
            error!(error = %err, "identity exchange task failed");
            ApiError::Internal
        })?
        .map_err(|err| {
            warn!(error = %err, "identity exchange failed");
            ApiError::Gate(GateError::Unauthorized)
        })?;
    let identity = state.verifier.verify(&claim)?;

    let Some(rotated) = state
        .lock_sessions()?
        .set_identity(&token, identity.clone(), now_unix_sec())
    else {
        warn!("auth callback for expired session");
        return Err(GateError::Unauthorized.into());
    };
    info!(identity = %identity, "login succeeded");
    Ok((
        [(SET_COOKIE, state.cookie.issue(&rotated))],
        Redirect::to(REPORT_FORM_PATH),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = SessionCookie::read(&headers) {
        state.lock_sessions()?.clear(&token);
    }
    Ok(([(SET_COOKIE, state.cookie.expire())], Redirect::to("/")).into_response())
}

async fn submit_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let session = state.session_context(&headers)?;
    if session.get().is_none() {
        warn!(op = "submit", "unauthenticated call refused");
        return Err(GateError::Unauthorized.into());
    }
    let submission: ReportSubmission =
        serde_json::from_slice(&body).map_err(|err| ApiError::MalformedBody(err.to_string()))?;
    state.desk.submit(&session, submission, now_unix_sec())?;
    Ok(Json(SubmitResponse { success: true }))
}

async fn export_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.session_context(&headers)?;
    Ok(Json(state.desk.export_json(&session)?))
}

async fn export_csv(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let session = state.session_context(&headers)?;
    let csv = state.desk.export_csv(&session)?;
    Ok((
        [
            (CONTENT_TYPE, CSV_CONTENT_TYPE),
            (CONTENT_DISPOSITION, "attachment; filename=\"reports.csv\""),
        ],
        csv,
    )
        .into_response())
}

fn now_unix_sec() -> UnixTimeSec {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(1);
    UnixTimeSec(i64::try_from(secs).unwrap_or(i64::MAX))
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Gate(GateError::Storage(err))
    }
}
