//! HTTP server for the COVID-19 dashboard
//! Plain tokio TcpListener with hand-rolled request parsing; every response is JSON.

use covid_insights::config::Settings;
use covid_insights::data_assistant::DataAssistant;
use covid_insights::llm::{CompletionService, LlmClient};
use covid_insights::loader::{DatasetCache, Datasets};
use covid_insights::logging;
use covid_insights::reports::{run_section, ReportOptions, Section};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

const MAX_REQUEST_BYTES: usize = 1 << 20;

struct AppState {
    cache: DatasetCache,
    options: ReportOptions,
    service: Arc<dyn CompletionService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let settings = Settings::from_env()?;

    if settings.has_api_key() {
        info!("GITHUB_TOKEN found - AI assistant enabled ({})", settings.llm_model);
    } else {
        warn!("GITHUB_TOKEN not set - /api/ask will answer with an error");
    }

    let client = LlmClient::new(
        settings.api_key.clone(),
        settings.llm_model.clone(),
        settings.llm_endpoint.clone(),
    );
    let state = Arc::new(AppState {
        cache: DatasetCache::new(settings.data_dir.clone(), settings.pipeline_options()),
        options: ReportOptions::default(),
        service: Arc::new(client),
    });

    let listener = TcpListener::bind(settings.addr).await?;
    info!("Dashboard server listening on http://{}", settings.addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let raw = match read_request(&mut stream).await {
        Ok(raw) => raw,
        Err(e) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
    };

    let response = match Request::parse(&raw) {
        Some(request) => handle_request(&request, &state).await,
        None => create_response(400, "Bad Request", r#"{"error":"malformed request"}"#),
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// Read the head, then as much body as `Content-Length` announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut data = Vec::new();
    let mut buffer = [0; 4096];
    loop {
        let size = stream.read(&mut buffer).await?;
        if size == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..size]);

        if let Some(head_end) = find_head_end(&data) {
            let wanted = content_length(&String::from_utf8_lossy(&data[..head_end]));
            if data.len() >= head_end + 4 + wanted {
                break;
            }
        }
        if data.len() > MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Byte offset of the blank line ending the request head.
fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, PartialEq)]
struct Request {
    method: String,
    path: String,
    body: String,
}

impl Request {
    fn parse(raw: &str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let mut parts = head.lines().next()?.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?;

        // Drop the query string and any trailing slash except for root
        let path = target.split('?').next().unwrap_or(target).trim_end_matches('/');
        let path = if path.is_empty() { "/" } else { path }.to_string();

        Some(Self {
            method,
            path,
            body: body.to_string(),
        })
    }
}

/// Fetch the shared datasets on the blocking pool; the first call reads and prepares the CSVs.
async fn load_data(state: &Arc<AppState>) -> Result<Arc<Datasets>, String> {
    let state = Arc::clone(state);
    match tokio::task::spawn_blocking(move || state.cache.get()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("dataset load task failed: {}", e)),
    }
}

async fn handle_request(request: &Request, state: &Arc<AppState>) -> String {
    info!("Request: {} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/api/health") => create_response(
            200,
            "OK",
            &serde_json::json!({
                "status": "ok",
                "service": "covid-dashboard",
                "data_loaded": state.cache.is_loaded(),
            })
            .to_string(),
        ),
        ("GET", "/api/sections") => {
            let sections: Vec<serde_json::Value> = Section::all()
                .iter()
                .map(|s| serde_json::json!({"name": s.name(), "title": s.title()}))
                .collect();
            create_response(200, "OK", &serde_json::json!({ "sections": sections }).to_string())
        }
        ("GET", path) if path.starts_with("/api/sections/") => {
            let name = &path["/api/sections/".len()..];
            let section = match name.parse::<Section>() {
                Ok(section) => section,
                Err(e) => return error_response(404, "Not Found", &e.to_string()),
            };
            let data = match load_data(state).await {
                Ok(data) => data,
                Err(e) => return error_response(503, "Service Unavailable", &e),
            };
            let options = state.options.clone();
            let result = tokio::task::spawn_blocking(move || run_section(section, &data, &options))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            match result {
                Ok(value) => create_response(200, "OK", &value.to_string()),
                Err(e) => {
                    error!("Section {} failed: {}", section, e);
                    error_response(500, "Internal Server Error", &e)
                }
            }
        }
        ("GET", "/api/diagnostics") => match load_data(state).await {
            Ok(data) => match serde_json::to_string(&data.diagnostics()) {
                Ok(json) => create_response(200, "OK", &json),
                Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
            },
            Err(e) => error_response(503, "Service Unavailable", &e),
        },
        ("POST", "/api/ask") => handle_ask(request, state).await,
        _ => error_response(404, "Not Found", "no such route"),
    }
}

async fn handle_ask(request: &Request, state: &Arc<AppState>) -> String {
    let question = serde_json::from_str::<serde_json::Value>(request.body.trim())
        .ok()
        .and_then(|json| json.get("question").and_then(|q| q.as_str()).map(str::to_string))
        .unwrap_or_default();
    if question.trim().is_empty() {
        return error_response(400, "Bad Request", "question is required");
    }

    let data = match load_data(state).await {
        Ok(data) => data,
        Err(e) => return error_response(503, "Service Unavailable", &e),
    };

    // Each request gets its own history; clients never see each other's questions
    let mut assistant = DataAssistant::new(Arc::clone(&state.service));
    match assistant.ask(&question, &data).await {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(json) => create_response(200, "OK", &json),
            Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
        },
        Err(e) => {
            error!("Assistant failed: {}", e);
            error_response(502, "Bad Gateway", &e.to_string())
        }
    }
}

fn error_response(status: u16, status_text: &str, message: &str) -> String {
    create_response(status, status_text, &serde_json::json!({ "error": message }).to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use covid_insights::config::DUMMY_API_KEY;
    use covid_insights::loader::PipelineOptions;

    fn offline_state(data_dir: &str) -> Arc<AppState> {
        Arc::new(AppState {
            cache: DatasetCache::new(data_dir, PipelineOptions::default()),
            options: ReportOptions::default(),
            service: Arc::new(LlmClient::new(
                DUMMY_API_KEY.into(),
                "m".into(),
                "http://127.0.0.1:9".into(),
            )),
        })
    }

    #[test]
    fn test_parse_request() {
        let raw = concat!(
            "POST /api/ask/?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 21\r\n\r\n",
            "{\"question\":\"deaths\"}"
        );
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/ask");
        assert_eq!(request.body, "{\"question\":\"deaths\"}");
        assert_eq!(content_length("POST / HTTP/1.1\r\ncontent-length: 22"), 22);
    }

    #[test]
    fn test_head_end_is_a_byte_offset() {
        // Invalid UTF-8 in the head would shift a lossy-string offset
        let mut raw = b"GET /\xff\xfe HTTP/1.1\r\n\r\nbody".to_vec();
        assert_eq!(find_head_end(&raw), Some(16));
        assert_eq!(&raw[16 + 4..], b"body");

        raw.truncate(10);
        assert_eq!(find_head_end(&raw), None);
    }

    #[test]
    fn test_root_path_and_garbage() {
        assert_eq!(Request::parse("GET / HTTP/1.1\r\n\r\n").unwrap().path, "/");
        assert!(Request::parse("").is_none());
    }

    #[test]
    fn test_response_has_cors_and_length() {
        let response = create_response(200, "OK", "{}");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Access-Control-Allow-Origin: *"));
        assert!(response.contains("Content-Length: 2"));
        assert!(response.ends_with("\r\n\r\n{}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_without_data_are_unavailable() {
        let state = offline_state("/definitely/not/here");
        let section = Request::parse("GET /api/sections/summary HTTP/1.1\r\n\r\n").unwrap();
        let diagnostics = Request::parse("GET /api/diagnostics HTTP/1.1\r\n\r\n").unwrap();

        let (first, second) = tokio::join!(
            handle_request(&section, &state),
            handle_request(&diagnostics, &state)
        );
        assert!(first.starts_with("HTTP/1.1 503"));
        assert!(second.starts_with("HTTP/1.1 503"));
        // Failed loads are not cached; each request made its own attempt
        assert_eq!(state.cache.load_count(), 2);
        assert!(!state.cache.is_loaded());
    }

    #[tokio::test]
    async fn test_ask_validates_before_loading() {
        let state = offline_state("/definitely/not/here");

        let empty = Request::parse("POST /api/ask HTTP/1.1\r\n\r\n{\"question\":\"  \"}").unwrap();
        assert!(handle_request(&empty, &state).await.starts_with("HTTP/1.1 400"));
        assert_eq!(state.cache.load_count(), 0);

        let asked =
            Request::parse("POST /api/ask HTTP/1.1\r\n\r\n{\"question\":\"Italy?\"}").unwrap();
        assert!(handle_request(&asked, &state).await.starts_with("HTTP/1.1 503"));
        assert_eq!(state.cache.load_count(), 1);
    }
}
