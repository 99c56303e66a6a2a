// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP interface.
//!
//! Routes:
//! - `GET  /api/attendance/{date}/{period}` - Marks of one slot
//! - `POST /api/attendance`                 - Save marks of one slot
//! - `POST /api/matrix`                     - Weekly attendance matrix
//! - `GET  /healthz`                        - Health check
//!
//! Everything else is served from the static frontend directory, if one is
//! configured.

use crate::{
    model::{AttendanceMatrixRow, Period, SlotKey, StudentMark},
    service::{AttendanceService, ServiceError},
    store::{DocumentStore, StoreError},
};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Build router over target attendance service.
pub fn router<S>(service: Arc<AttendanceService<S>>, static_dir: Option<&Path>) -> Router
where
    S: DocumentStore,
{
    let router = Router::new()
        .route("/api/attendance/{date}/{period}", get(read_slot::<S>))
        .route("/api/attendance", post(write_slot::<S>))
        .route("/api/matrix", post(build_matrix::<S>))
        .route("/healthz", get(|| async { "ok" }));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve target router until Ctrl+C or SIGTERM arrives.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the listener fails.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!("listening on http://{address}");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!("cannot listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

/// `GET /api/attendance/{date}/{period}`
///
/// Malformed periods match nothing and answer an empty list.
async fn read_slot<S>(
    State(service): State<Arc<AttendanceService<S>>>,
    UrlPath((date, period)): UrlPath<(String, String)>,
) -> Json<Vec<StudentMark>>
where
    S: DocumentStore,
{
    match period.parse::<Period>() {
        Ok(period) => Json(service.get_slot(&date, period).await),
        Err(_) => Json(Vec::new()),
    }
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    date: String,
    period: PeriodField,
    #[serde(default)]
    list: Vec<StudentMark>,
}

/// Period as sent by browsers, either a number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PeriodField {
    Number(u64),
    Text(String),
}

impl PeriodField {
    fn parse(&self) -> Result<Period, ServiceError> {
        let period = match self {
            Self::Number(number) => u8::try_from(*number)
                .map_err(|_| crate::model::SlotError::Period(number.to_string()))
                .and_then(Period::new)?,
            Self::Text(text) => text.parse()?,
        };

        Ok(period)
    }
}

/// `POST /api/attendance`
async fn write_slot<S>(
    State(service): State<Arc<AttendanceService<S>>>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
    S: DocumentStore,
{
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let key = SlotKey::new(request.date, request.period.parse()?)?;

    service.save_slot(&key, request.list).await?;

    Ok(Json(json!({ "success": true })))
}

/// `POST /api/matrix`
///
/// Anything but a JSON object with a `weekDates` array yields an empty
/// matrix.
async fn build_matrix<S>(
    State(service): State<Arc<AttendanceService<S>>>,
    body: Bytes,
) -> Json<Vec<AttendanceMatrixRow>>
where
    S: DocumentStore,
{
    let week_dates = week_dates(&body);
    Json(service.build_matrix(week_dates.as_slice()).await)
}

fn week_dates(body: &[u8]) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };

    match value.get("weekDates") {
        Some(Value::Array(dates)) => dates
            .iter()
            .map(|date| match date {
                Value::String(date) => date.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Error answered to API callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request body cannot be understood.
    #[error("malformed request: {0}")]
    BadRequest(String),

    /// Attendance operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<crate::model::SlotError> for ApiError {
    fn from(error: crate::model::SlotError) -> Self {
        Self::Service(error.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Service(ServiceError::Slot(_)) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::Store(error)) => match error {
                StoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
                StoreError::Forbidden { .. } => StatusCode::FORBIDDEN,
                StoreError::Conflict => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(%status, "request failed: {self}");

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(r#"{"weekDates": ["2024-01-01", "2024-01-02"]}"#, &["2024-01-01", "2024-01-02"]; "dates")]
    #[test_case(r#"{"weekDates": ["2024-01-01", 7]}"#, &["2024-01-01", "7"]; "mixed")]
    #[test_case(r#"{"weekDates": [null, {"a": 1}]}"#, &["null", r#"{"a":1}"#]; "json text")]
    #[test_case(r#"{"weekDates": "2024-01-01"}"#, &[]; "not an array")]
    #[test_case(r#"{}"#, &[]; "absent")]
    #[test_case(r#"not json"#, &[]; "garbage")]
    #[test]
    fn parse_week_dates(body: &str, expect: &[&str]) {
        pretty_assertions::assert_eq!(week_dates(body.as_bytes()), expect);
    }

    #[test]
    fn status_reflects_error_kind() {
        let status = |error: StoreError| ApiError::from(ServiceError::from(error)).status();

        assert_eq!(status(StoreError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(StoreError::Forbidden {
                repository: "school/records".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(StoreError::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status(StoreError::ConfigurationMissing { what: "token" }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(StoreError::Transport("502".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(crate::model::SlotError::Date("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn period_field_accepts_numbers_and_strings() -> anyhow::Result<()> {
        let request: SaveRequest =
            serde_json::from_str(r#"{"date": "2024-01-01", "period": 3, "list": []}"#)?;
        assert_eq!(request.period.parse()?.get(), 3);

        let request: SaveRequest =
            serde_json::from_str(r#"{"date": "2024-01-01", "period": "8"}"#)?;
        assert_eq!(request.period.parse()?.get(), 8);
        assert!(request.list.is_empty());

        let request: SaveRequest =
            serde_json::from_str(r#"{"date": "2024-01-01", "period": 300}"#)?;
        assert!(request.period.parse().is_err());

        Ok(())
    }
}
