//! Callback the OAuth2 provider redirects the user to

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use ha_runtime::HomeAssistant;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::jwt::{decode_jwt, FlowState};

pub const AUTH_CALLBACK_PATH: &str = "/auth/external/callback";

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// Router serving [`AUTH_CALLBACK_PATH`]
pub fn callback_router() -> Router<Arc<HomeAssistant>> {
    Router::new().route(AUTH_CALLBACK_PATH, get(authorize_callback))
}

/// Absolute URL of the request, rebuilt from the `Host` header
fn request_url(uri: &Uri, headers: &HeaderMap) -> String {
    if uri.authority().is_some() {
        return uri.to_string();
    }
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("{}://{}{}", uri.scheme_str().unwrap_or("http"), host, path),
        None => path.to_string(),
    }
}

/// GET /auth/external/callback - Resume the flow named in `state` with `code`
async fn authorize_callback(
    State(hass): State<Arc<HomeAssistant>>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(code), Some(state)) = (query.code, query.state) else {
        return format!(
            "Missing code or state parameter in {}",
            request_url(&uri, &headers)
        )
        .into_response();
    };

    let Some(state) = decode_jwt::<FlowState>(&hass, &state) else {
        return "Invalid state".into_response();
    };

    debug!("Authorization callback for flow {}", state.flow_id);
    if let Err(err) = hass
        .flow
        .async_configure(&state.flow_id, Some(serde_json::Value::String(code)))
        .await
    {
        warn!("Unable to resume flow {}: {}", state.flow_id, err);
    }

    Html("<script>window.close()</script>").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::encode_jwt;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ha_config::CoreConfig;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        let app = callback_router().with_state(hass);

        let (status, _, body) = get_text(app, "/auth/external/callback?code=abcd").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "Missing code or state parameter in /auth/external/callback?code=abcd"
        );
    }

    #[tokio::test]
    async fn test_missing_parameters_reports_full_url() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        let app = callback_router().with_state(hass);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/external/callback?state=xyz")
                    .header(header::HOST, "example.com:8123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "Missing code or state parameter in http://example.com:8123/auth/external/callback?state=xyz"
        );
    }

    #[tokio::test]
    async fn test_invalid_state() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        let app = callback_router().with_state(hass);

        let (status, _, body) =
            get_text(app, "/auth/external/callback?code=abcd&state=bogus").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Invalid state");
    }

    #[tokio::test]
    async fn test_unknown_flow_still_closes_window() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        let state = encode_jwt(
            &hass,
            &FlowState {
                flow_id: "gone".into(),
            },
        )
        .unwrap();
        let app = callback_router().with_state(hass);

        let (status, content_type, body) = get_text(
            app,
            &format!("/auth/external/callback?code=abcd&state={}", state),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert_eq!(body, "<script>window.close()</script>");
    }
}
