use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_BACKEND_PORT: u16 = 19_002;
const COMPLETION_PATH: &str = "/api/v3/completion/text";
const DONE_LINE: &str = "data: [DONE]\n";

type MockBody = UnsyncBoxBody<Bytes, Infallible>;

/// What the fake backend sends back for every completion request.
#[derive(Copy, Clone)]
enum MockScenario {
    /// Three text frames then `[DONE]`.
    Text,
    /// Text frames and end-of-stream without `[DONE]`.
    Eof,
    /// A malformed line and a heartbeat between valid frames.
    Noisy,
    /// `401` with a Sider-style error body.
    Unauthorized,
}

struct MockState {
    scenario: MockScenario,
    /// Bytes per write; small values split lines across reads.
    write_size: usize,
    delay: Duration,
    requests: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("BACKEND_PORT", DEFAULT_BACKEND_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        write_size: usize::from(env_u16("MOCK_WRITE_SIZE", 17)).max(1),
        delay: Duration::from_millis(u64::from(env_u16("MOCK_DELAY_MS", 20))),
        requests: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock backend on 127.0.0.1:{port}: {err}"));
    eprintln!("mock sider backend on http://127.0.0.1:{port}{COMPLETION_PATH}");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock backend connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("eof") => MockScenario::Eof,
        Ok("noisy") => MockScenario::Noisy,
        Ok("unauthorized") => MockScenario::Unauthorized,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<MockBody> {
    let (parts, body) = request.into_parts();
    let request_body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    if parts.method != Method::POST || parts.uri.path() != COMPLETION_PATH {
        return full_response(StatusCode::NOT_FOUND, "text/plain", Bytes::from_static(b"not found"));
    }

    let seq = state.requests.fetch_add(1, Ordering::Relaxed) + 1;
    eprintln!(
        "request #{seq}: {}",
        String::from_utf8_lossy(&request_body)
    );

    if !parts.headers.contains_key(header::AUTHORIZATION) {
        return unauthorized();
    }

    let lines: Vec<String> = match state.scenario {
        MockScenario::Unauthorized => return unauthorized(),
        MockScenario::Text => vec![
            frame_line("Hel"),
            frame_line("lo, "),
            frame_line("世界"),
            DONE_LINE.to_string(),
        ],
        MockScenario::Eof => vec![frame_line("no "), frame_line("terminator")],
        MockScenario::Noisy => vec![
            frame_line("before"),
            "data: {broken\n".to_string(),
            ": keep-alive\n".to_string(),
            "\n".to_string(),
            frame_line(" after"),
            DONE_LINE.to_string(),
        ],
    };

    streaming_response(lines.concat(), state.write_size, state.delay)
}

fn frame_line(text: &str) -> String {
    format!(
        "data: {{\"code\":0,\"msg\":\"\",\"data\":{{\"type\":\"text\",\"text\":\"{text}\",\"chat_model\":\"gpt-4o\"}}}}\n"
    )
}

fn unauthorized() -> Response<MockBody> {
    full_response(
        StatusCode::UNAUTHORIZED,
        "application/json",
        Bytes::from_static(br#"{"code":401,"msg":"invalid token","data":null}"#),
    )
}

fn streaming_response(payload: String, write_size: usize, delay: Duration) -> Response<MockBody> {
    let payload = Bytes::from(payload);
    let chunks = futures_util::stream::unfold(0usize, move |offset| {
        let payload = payload.clone();
        async move {
            if offset >= payload.len() {
                return None;
            }
            if offset > 0 {
                tokio::time::sleep(delay).await;
            }
            let end = (offset + write_size).min(payload.len());
            let frame = Frame::data(payload.slice(offset..end));
            Some((Ok::<_, Infallible>(frame), end))
        }
    })
    .boxed();

    let mut response = Response::new(BodyExt::boxed_unsync(StreamBody::new(chunks)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
}

fn full_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<MockBody> {
    let mut response = Response::new(BodyExt::boxed_unsync(Full::new(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
