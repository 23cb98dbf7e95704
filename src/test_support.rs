//! In-process HTTP file server used by the unit tests.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) fn sample_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

struct MockState {
    body: Bytes,
    accept_ranges: Option<&'static str>,
    send_length: bool,
    honor_ranges: bool,
    head_status: StatusCode,
    delay: Duration,
    stream_body: bool,
    failures: Mutex<HashMap<String, usize>>,
    slow: Mutex<HashMap<String, (usize, Duration)>>,
    requests: Mutex<Vec<Option<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
}

pub(crate) struct MockServerBuilder {
    body: Vec<u8>,
    accept_ranges: Option<&'static str>,
    send_length: bool,
    honor_ranges: bool,
    head_status: StatusCode,
    delay: Duration,
    stream_body: bool,
    failures: HashMap<String, usize>,
    slow: HashMap<String, (usize, Duration)>,
}

impl MockServerBuilder {
    pub(crate) fn accept_ranges(mut self, value: Option<&'static str>) -> Self {
        self.accept_ranges = value;
        self
    }

    pub(crate) fn without_length(mut self) -> Self {
        self.send_length = false;
        self
    }

    /// Answer ranged GETs with a 200 and the full body.
    pub(crate) fn ignore_ranges(mut self) -> Self {
        self.honor_ranges = false;
        self
    }

    pub(crate) fn head_status(mut self, status: StatusCode) -> Self {
        self.head_status = status;
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold the first `times` responses for the given `Range` value for `delay`.
    pub(crate) fn delay_range(mut self, range: &str, times: usize, delay: Duration) -> Self {
        self.slow.insert(range.to_string(), (times, delay));
        self
    }

    /// Send 200 bodies as a stream of pieces so `served()` shows how much the
    /// client actually pulled.
    pub(crate) fn stream_body(mut self) -> Self {
        self.stream_body = true;
        self
    }

    /// Answer the given `Range` value with a 503 the first `times` times.
    pub(crate) fn fail_range(mut self, range: &str, times: usize) -> Self {
        self.failures.insert(range.to_string(), times);
        self
    }

    pub(crate) async fn start(self) -> MockServer {
        let state = Arc::new(MockState {
            body: Bytes::from(self.body),
            accept_ranges: self.accept_ranges,
            send_length: self.send_length,
            honor_ranges: self.honor_ranges,
            head_status: self.head_status,
            delay: self.delay,
            stream_body: self.stream_body,
            failures: Mutex::new(self.failures),
            slow: Mutex::new(self.slow),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            served: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/file", get(get_file).head(head_file))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockServer {
            url: format!("http://{}/file", addr),
            state,
            handle,
        }
    }
}

pub(crate) struct MockServer {
    pub(crate) url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) fn builder(body: Vec<u8>) -> MockServerBuilder {
        MockServerBuilder {
            body,
            accept_ranges: Some("bytes"),
            send_length: true,
            honor_ranges: true,
            head_status: StatusCode::OK,
            delay: Duration::ZERO,
            stream_body: false,
            failures: HashMap::new(),
            slow: HashMap::new(),
        }
    }

    /// `Range` header of every GET received, in arrival order.
    pub(crate) fn requests(&self) -> Vec<Option<String>> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Highest number of GETs observed in flight at once.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    /// Bytes of streamed 200 bodies handed to the connection so far.
    pub(crate) fn served(&self) -> usize {
        self.state.served.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn head_file(State(state): State<Arc<MockState>>) -> Response {
    let mut builder = Response::builder().status(state.head_status);
    if let Some(value) = state.accept_ranges {
        builder = builder.header(header::ACCEPT_RANGES, value);
    }
    if state.send_length {
        builder = builder.header(header::CONTENT_LENGTH, state.body.len());
        builder.body(Body::empty()).unwrap()
    } else {
        // An empty body has an exact size hint, which axum would turn into
        // `Content-Length: 0`. A stream body leaves the header out.
        let body = futures::stream::empty::<Result<Bytes, std::io::Error>>();
        builder.body(Body::from_stream(body)).unwrap()
    }
}

async fn get_file(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.requests.lock().unwrap().push(range.clone());

    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(current, Ordering::SeqCst);
    let mut delay = state.delay;
    if let Some(range) = range.as_deref() {
        let mut slow = state.slow.lock().unwrap();
        if let Some((remaining, extra)) = slow.get_mut(range) {
            if *remaining > 0 {
                *remaining -= 1;
                delay += *extra;
            }
        }
    }
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let response = respond(&state, range.as_deref());
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

fn full_body(state: &Arc<MockState>) -> Response {
    if !state.stream_body {
        return (StatusCode::OK, state.body.clone()).into_response();
    }

    const PIECE: usize = 64 * 1024;
    let body = state.body.clone();
    let len = body.len();
    let counter = Arc::clone(state);
    let pieces = (0..len).step_by(PIECE).map(move |start| {
        let end = (start + PIECE).min(len);
        counter.served.fetch_add(end - start, Ordering::SeqCst);
        Ok::<_, std::io::Error>(body.slice(start..end))
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(futures::stream::iter(pieces)))
        .unwrap()
}

fn respond(state: &Arc<MockState>, range: Option<&str>) -> Response {
    let Some(range) = range else {
        return full_body(state);
    };

    {
        let mut failures = state.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(range) {
            if *remaining > 0 {
                *remaining -= 1;
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }

    if !state.honor_ranges {
        return full_body(state);
    }

    match parse_range(range, state.body.len() as u64) {
        Some((start, end)) => {
            let slice = state.body.slice(start as usize..=end as usize);
            (
                StatusCode::PARTIAL_CONTENT,
                [(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, state.body.len()),
                )],
                slice,
            )
                .into_response()
        }
        None => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
    }
}

fn parse_range(value: &str, len: u64) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = end.parse().ok()?;
    let end = end.min(len.checked_sub(1)?);
    (start <= end).then_some((start, end))
}
