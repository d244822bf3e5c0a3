// HTTP handlers. Every one of them counts the request before answering,
// except the operational `/metrics` and `/health` endpoints. None of them
// waits on the broker: the temperature comes straight from the store.
use axum::{
    extract::{Extension, Path, rejection::PathRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

const NOT_FOUND_BODY: &str = "Nothing to see here. But the request still counts!";
const RETRY_AFTER_SECS: &str = "5";

pub async fn count(Extension(state): Extension<AppState>, headers: HeaderMap) -> String {
    let n = state.record_request("count");
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown");
    format!(
        "You are talking to instance {host}. This is the {n}{} request to this instance.",
        ordinal_suffix(n)
    )
}

/// Latest temperature for the configured office. Answers `503` with a
/// `Retry-After` header until the first reading has arrived. Segments that
/// do not decode are answered like any other unknown path.
pub async fn temperature(
    Extension(state): Extension<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Response {
    let Ok(Path((app_id, dev_id))) = path else {
        return unmatched(state);
    };
    if app_id != state.target.app_id || dev_id != state.target.dev_id {
        return unmatched(state);
    }
    state.record_request("temperature");

    match state.store.get() {
        Some(reading) => format!(
            "It's currently {:.2} degrees in office {app_id}/{dev_id}",
            reading.temperature
        )
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS))],
            format!("No temperature reading has arrived yet for office {app_id}/{dev_id}"),
        )
            .into_response(),
    }
}

pub async fn fallback(Extension(state): Extension<AppState>) -> Response {
    unmatched(state)
}

fn unmatched(state: AppState) -> Response {
    state.record_request("unmatched");
    NOT_FOUND_BODY.into_response()
}

pub async fn metrics_handler(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))],
        state.metrics.encode(),
    )
}

fn ordinal_suffix(n: u64) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceTarget;
    use crate::metrics::Metrics;
    use crate::reading::Reading;
    use crate::server::router;
    use crate::store::LatestValueStore;
    use axum::{Router, body::Body, http::Request};
    use chrono::Utc;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(
            Arc::new(LatestValueStore::new()),
            Metrics::new().unwrap(),
            DeviceTarget { app_id: "office-sensors".into(), dev_id: "room-42".into() },
        )
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let req = Request::builder()
            .uri(uri)
            .header(header::HOST, "relay.local:8080")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_ordinal_suffix() {
        let cases = [(1, "st"), (2, "nd"), (3, "rd"), (4, "th"), (11, "th"), (12, "th"), (13, "th"), (21, "st"), (112, "th"), (102, "nd")];
        for (n, suffix) in cases {
            assert_eq!(ordinal_suffix(n), suffix, "n = {n}");
        }
    }

    #[tokio::test]
    async fn test_count_reports_increasing_values() {
        let app = router(state());
        for n in 1..=5u64 {
            let (status, _, body) = get(&app, "/count").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("instance relay.local:8080"), "body: {body}");
            assert!(
                body.contains(&format!("This is the {n}{} request", ordinal_suffix(n))),
                "body: {body}"
            );
        }
    }

    #[tokio::test]
    async fn test_temperature_before_first_reading() {
        let state = state();
        let app = router(state.clone());

        let uri = "/temperature/office-sensors/room-42";
        let ((s1, h1, b1), (s2, _, b2)) = tokio::join!(get(&app, uri), get(&app, uri));

        assert_eq!(s1, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(s2, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(h1.get(header::RETRY_AFTER).unwrap(), "5");
        assert!(b1.contains("No temperature reading has arrived yet"));
        assert_eq!(b1, b2);
        assert_eq!(state.counter.get(), 2);
    }

    #[tokio::test]
    async fn test_temperature_with_reading() {
        let state = state();
        let app = router(state.clone());
        state.store.set(Reading::new(21.5, Utc::now()));
        state.store.set(Reading::new(22.0, Utc::now()));

        let (status, _, body) = get(&app, "/temperature/office-sensors/room-42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "It's currently 22.00 degrees in office office-sensors/room-42");

        // Reading is not consumed by the first request.
        let (_, _, again) = get(&app, "/temperature/office-sensors/room-42").await;
        assert_eq!(body, again);
    }

    #[tokio::test]
    async fn test_other_office_is_unmatched() {
        let state = state();
        let app = router(state.clone());
        state.store.set(Reading::new(21.5, Utc::now()));

        let (status, _, body) = get(&app, "/temperature/other-app/room-42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, NOT_FOUND_BODY);
        assert_eq!(state.metrics.http_requests.with_label_values(&["unmatched"]).get(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_requests_still_count() {
        let state = state();
        let app = router(state.clone());

        let (status, _, body) = get(&app, "/nope").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, NOT_FOUND_BODY);

        let req = Request::builder().method("POST").uri("/count").body(Body::empty()).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let (_, _, body) = get(&app, "/count").await;
        assert!(body.contains("This is the 3rd request"), "body: {body}");
    }

    #[tokio::test]
    async fn test_undecodable_temperature_path_still_counts() {
        let state = state();
        let app = router(state.clone());

        let (status, _, body) = get(&app, "/temperature/%FF/room-42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, NOT_FOUND_BODY);
        assert_eq!(state.counter.get(), 1);
        assert_eq!(state.metrics.http_requests.with_label_values(&["unmatched"]).get(), 1);
    }

    #[tokio::test]
    async fn test_operational_endpoints_do_not_count() {
        let state = state();
        let app = router(state.clone());

        let (status, _, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        get(&app, "/count").await;
        let (status, headers, body) = get(&app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::CONTENT_TYPE).is_some());
        assert!(body.contains("http_requests_total{route=\"count\"} 1"));
        assert_eq!(state.counter.get(), 1);
    }
}
