use axum::{
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::debug;

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub uri: String,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub body: String,
}

/// JSON-RPC request envelope accepted by `/jsonrpc`.
#[derive(Debug, Deserialize)]
pub struct RpcCall {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub id: Value,
}

pub fn app() -> Router {
    Router::new()
        .route("/done", get(done))
        .route("/redirect", get(redirect))
        .route("/redirect/{hops}", get(redirect_chain))
        .route("/loop", get(redirect_loop))
        .route("/echo", any(echo))
        .route("/jsonrpc", post(jsonrpc))
        .fallback(not_found)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn done() -> &'static str {
    "done"
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn redirect() -> Response {
    found("/done")
}

async fn redirect_chain(Path(hops): Path<u32>) -> Response {
    match hops {
        0 => found("/done"),
        n => found(&format!("/redirect/{}", n - 1)),
    }
}

async fn redirect_loop() -> Response {
    found("/loop")
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Json<Echo> {
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    Json(Echo {
        method: method.to_string(),
        uri: uri.to_string(),
        content_type: header_text(header::CONTENT_TYPE),
        content_length: header_text(header::CONTENT_LENGTH),
        body,
    })
}

async fn jsonrpc(body: String) -> Result<Json<Value>, StatusCode> {
    let call: RpcCall = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    debug!(method = %call.method, id = %call.id, "rpc call");
    let reply = match call.method.as_str() {
        "echo" => json!({ "result": call.params, "error": null, "id": call.id }),
        "add" => {
            let sum: f64 = call.params.iter().filter_map(Value::as_f64).sum();
            json!({ "result": sum, "error": null, "id": call.id })
        }
        "fail" => json!({
            "result": null,
            "error": { "code": -32000, "message": "failed" },
            "id": call.id
        }),
        "fail_legacy" => json!({ "result": null, "error": "some error", "id": call.id }),
        other => json!({
            "result": null,
            "error": { "code": -32601, "message": format!("method not found: {other}") },
            "id": call.id
        }),
    };
    Ok(Json(reply))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found.")
}
