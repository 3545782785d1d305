use axum::{
    body::Bytes,
    http::{header, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Cache policy attached to GET echoes so clients can count cache hits
pub const ECHO_CACHE_CONTROL: &str = "max-age=60";

/// HTTP service used as a stand-in target for local runs and tests
pub fn router() -> Router {
    Router::new()
        .route("/", get(index).post(echo))
        .route("/health", get(health_check))
        .route("/api/fail", any(fail))
        .route("/api/*path", get(echo).post(echo))
        .fallback(echo)
        .layer(TraceLayer::new_for_http())
}

/// Serve the origin on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(listen_addr = %local_addr, "Test origin listening");
    axum::serve(listener, router()).await
}

/// Bind `addr` and serve in the background; returns the bound address
pub async fn spawn(addr: SocketAddr) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener).await {
            error!(error = %e, "Test origin failed");
        }
    });
    Ok((local_addr, handle))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "test-origin",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn fail(uri: Uri) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "forced failure", "path": uri.path() })),
    )
        .into_response()
}

async fn echo(method: Method, uri: Uri, body: Bytes) -> Response {
    let payload = Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "receivedBytes": body.len(),
    }));

    if method == Method::GET {
        ([(header::CACHE_CONTROL, ECHO_CACHE_CONTROL)], payload).into_response()
    } else {
        payload.into_response()
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Surge Test Origin</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; background: #f5f5f5; }
        .container { max-width: 800px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; }
        .status { background: #27ae60; color: white; padding: 10px; border-radius: 4px; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Surge Test Origin</h1>
        <div class="status">Status: Online and Ready</div>
        <p>GET or POST anything under <code>/api/</code> for a JSON echo. <code>/api/fail</code> always answers 500.</p>
    </div>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    async fn start() -> String {
        let (addr, _handle) = spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_index_is_html() {
        let base = start().await;
        let response = reqwest::get(&base).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Surge Test Origin"));
    }

    #[tokio::test]
    async fn test_get_echo_is_cacheable() {
        let base = start().await;
        let response = reqwest::get(format!("{}/api/polls/active", base)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get(reqwest::header::CACHE_CONTROL).unwrap(),
            ECHO_CACHE_CONTROL
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["path"], "/api/polls/active");
    }

    #[tokio::test]
    async fn test_post_echo_counts_body() {
        let base = start().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/votes", base))
            .body("0123456789")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().get(reqwest::header::CACHE_CONTROL).is_none());
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["method"], "POST");
        assert_eq!(body["receivedBytes"], 10);
    }

    #[tokio::test]
    async fn test_post_to_root_is_accepted() {
        let base = start().await;
        let response = reqwest::Client::new().post(&base).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_fail_route() {
        let base = start().await;
        let response = reqwest::get(format!("{}/api/fail", base)).await.unwrap();
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_unknown_path_still_answers() {
        let base = start().await;
        let response = reqwest::get(format!("{}/test", base)).await.unwrap();
        assert_eq!(response.status(), 200);
    }
}
