//! In-process stand-ins for the remote oracles

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Serve `app` on an ephemeral local port and return its base URL
pub(crate) async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Answers every request with `status` and a JSON `body`
pub(crate) fn respond_with(status: StatusCode, body: Value) -> Router {
    Router::new().fallback(move || {
        let body = body.clone();
        async move { (status, Json(body)).into_response() }
    })
}

/// A generateContent endpoint whose first candidate says `text`
pub(crate) fn gemini_answer(text: &str) -> Router {
    respond_with(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }),
    )
}

/// A generateContent endpoint failing with `status`
pub(crate) fn gemini_failure(status: StatusCode, message: &str) -> Router {
    respond_with(
        status,
        json!({ "error": { "code": status.as_u16(), "message": message } }),
    )
}
