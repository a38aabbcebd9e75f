//! HTTP server for the data assistant
//! Minimal HTTP/1.1 handling on tokio: one request per connection, JSON in and out.

use schoolbase_assistant::config::AssistantConfig;
use schoolbase_assistant::data_assistant::DataAssistant;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REQUEST_BYTES: usize = 64 * 1024;
const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Debug, PartialEq)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AssistantConfig::from_env()?;
    let assistant = Arc::new(DataAssistant::connect(&config).await?);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Data assistant API listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        info!(peer = %addr, "New connection");
        tokio::spawn(handle_connection(stream, assistant.clone()));
    }
}

async fn handle_connection(mut stream: TcpStream, assistant: Arc<DataAssistant>) {
    let response = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(Some(request))) => handle_request(request, &assistant).await,
        Ok(Ok(None)) => create_response(400, "Bad Request", r#"{"error":"malformed request"}"#),
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to read request");
            return;
        }
        Err(_) => {
            warn!("Timed out reading request");
            create_response(408, "Request Timeout", r#"{"error":"request timed out"}"#)
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!(error = %e, "Failed to write response");
    }
}

/// Read headers, then as much body as `Content-Length` announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<HttpRequest>> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Ok(None);
        }
        if let Some(header_end) = find_header_end(&buffer) {
            let expected = header_end + content_length(&buffer[..header_end]);
            if buffer.len() >= expected {
                break;
            }
        }
    }

    Ok(parse_request(&String::from_utf8_lossy(&buffer)))
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn parse_request(raw: &str) -> Option<HttpRequest> {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;

    let (path, query_string) = target.split_once('?').unwrap_or((target, ""));
    let mut path = path.trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    let query = query_string
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Some(HttpRequest {
        method,
        path,
        query,
        body: body.to_string(),
    })
}

async fn handle_request(request: HttpRequest, assistant: &DataAssistant) -> String {
    info!(method = %request.method, path = %request.path, "Request");

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => create_response(
            200,
            "OK",
            r#"{"status":"ok","service":"schoolbase-assistant"}"#,
        ),
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("POST", "/api/assistant/query") => {
            let parsed: QueryRequest = match serde_json::from_str(&request.body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "Invalid query body");
                    return create_response(
                        400,
                        "Bad Request",
                        r#"{"error":"expected a JSON body with a \"query\" field"}"#,
                    );
                }
            };
            let outcome = assistant.answer(&parsed.query).await;
            match serde_json::to_string(&outcome.to_response()) {
                Ok(json) => create_response(200, "OK", &json),
                Err(e) => {
                    error!(error = %e, "Failed to serialize response");
                    create_response(500, "Internal Server Error", r#"{"error":"internal error"}"#)
                }
            }
        }
        ("GET", "/api/assistant/history") => {
            let limit = request
                .query
                .get("limit")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HISTORY_LIMIT);
            let body = serde_json::json!({ "entries": assistant.query_log().recent(limit) });
            create_response(200, "OK", &body.to_string())
        }
        _ => create_response(404, "Not Found", r#"{"error":"not found"}"#),
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
