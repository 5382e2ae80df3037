//! In-memory registry used by the integration suites.
//!
//! Behaves like the service as far as the client can observe: assigns a
//! fresh etag on every write, honors `If-Match`, reports bulk outcomes per
//! item and pages query results behind an opaque continuation token.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use enrollment_registry::{
    BulkOperationMode, CONTINUATION, ETag, Enrollment, ITEM_TYPE, MAX_ITEM_COUNT,
    RegistryTransport, TransportError, TransportRequest, TransportResponse,
};
use http::header::{IF_MATCH, RETRY_AFTER};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const COLLECTION: &str = "enrollments";
const DEFAULT_PAGE_SIZE: usize = 100;

/// Route client logs to the test harness; `RUST_LOG` overrides the filter.
#[allow(clippy::let_underscore_must_use)]
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enrollment_registry=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A failure to inject in place of the next response.
#[derive(Debug, Clone)]
pub enum Fault {
    Status(StatusCode),
    Throttle { retry_after_secs: u64 },
    Timeout,
    EmptyBody,
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, Enrollment>,
    version: u64,
}

impl State {
    fn next_etag(&mut self) -> ETag {
        self.version += 1;
        ETag::new(format!("\"{}\"", self.version))
    }

    fn store(&mut self, mut enrollment: Enrollment) -> Enrollment {
        let now = Utc::now();
        let created = self
            .records
            .get(&enrollment.registration_id)
            .and_then(|existing| existing.created_time)
            .unwrap_or(now);
        enrollment.created_time = Some(created);
        enrollment.last_updated_time = Some(now);
        enrollment.etag = Some(self.next_etag());
        self.records
            .insert(enrollment.registration_id.clone(), enrollment.clone());
        enrollment
    }
}

#[derive(Default)]
pub struct RegistryEmulator {
    state: Mutex<State>,
    faults: Mutex<VecDeque<Fault>>,
    requests: AtomicUsize,
    log: Mutex<Vec<TransportRequest>>,
}

#[derive(Deserialize)]
struct BulkBody {
    mode: BulkOperationMode,
    enrollments: Vec<Enrollment>,
}

impl RegistryEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the request path.
    pub fn seed(&self, enrollment: Enrollment) -> Enrollment {
        self.state.lock().unwrap().store(enrollment)
    }

    pub fn stored(&self, registration_id: &str) -> Option<Enrollment> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(registration_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    /// Number of requests that reached the transport, faults included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().unwrap().clone()
    }

    fn handle(&self, request: &TransportRequest) -> TransportResponse {
        let if_match = request
            .headers
            .get(IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(ETag::new);

        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        match (&request.method, segments.as_slice()) {
            (&Method::POST, [COLLECTION]) => self.bulk(&request.body),
            (&Method::POST, [COLLECTION, "query"]) => self.query(&request.headers),
            (method, [COLLECTION, id]) => match *method {
                Method::PUT => self.put(id, &request.body, if_match),
                Method::GET => self.get(id),
                Method::DELETE => self.delete(id, if_match),
                _ => error(StatusCode::METHOD_NOT_ALLOWED, 405_000, "method not allowed"),
            },
            _ => error(StatusCode::NOT_FOUND, 404_000, "no such route"),
        }
    }

    fn put(&self, id: &str, body: &[u8], if_match: Option<ETag>) -> TransportResponse {
        let Ok(mut enrollment) = serde_json::from_slice::<Enrollment>(body) else {
            return error(StatusCode::BAD_REQUEST, 400_004, "malformed enrollment");
        };
        if enrollment.registration_id != id {
            return error(StatusCode::BAD_REQUEST, 400_013, "registration id mismatch");
        }
        enrollment.etag = None;

        let mut state = self.state.lock().unwrap();
        if let Some(expected) = if_match {
            match state.records.get(id) {
                Some(current) if current.etag.as_ref() == Some(&expected) => {}
                _ => return error(StatusCode::PRECONDITION_FAILED, 412_002, "etag mismatch"),
            }
        }
        let stored = state.store(enrollment);
        ok_json(&serde_json::to_value(&stored).unwrap())
    }

    fn get(&self, id: &str) -> TransportResponse {
        match self.stored(id) {
            Some(enrollment) => ok_json(&serde_json::to_value(&enrollment).unwrap()),
            None => error(StatusCode::NOT_FOUND, 404_201, "enrollment not found"),
        }
    }

    fn delete(&self, id: &str, if_match: Option<ETag>) -> TransportResponse {
        let mut state = self.state.lock().unwrap();
        let Some(current) = state.records.get(id) else {
            return error(StatusCode::NOT_FOUND, 404_201, "enrollment not found");
        };
        if let Some(expected) = if_match {
            if current.etag.as_ref() != Some(&expected) {
                return error(StatusCode::PRECONDITION_FAILED, 412_002, "etag mismatch");
            }
        }
        state.records.remove(id);
        TransportResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn bulk(&self, body: &[u8]) -> TransportResponse {
        let Ok(request) = serde_json::from_slice::<BulkBody>(body) else {
            return error(StatusCode::BAD_REQUEST, 400_004, "malformed bulk request");
        };

        let mut state = self.state.lock().unwrap();
        let mut errors = Vec::new();
        for mut enrollment in request.enrollments {
            let id = enrollment.registration_id.clone();
            let current_etag = state.records.get(&id).and_then(|e| e.etag.clone());
            let exists = state.records.contains_key(&id);

            let failure = match request.mode {
                BulkOperationMode::Create if exists => Some((409_201, "Conflict", "already exists")),
                BulkOperationMode::UpdateIfMatchETag
                    if enrollment.conditional_etag().is_some()
                        && enrollment.etag != current_etag =>
                {
                    Some((412_002, "PreconditionFailed", "etag mismatch"))
                }
                BulkOperationMode::Delete if !exists => Some((404_201, "NotFound", "not found")),
                _ => None,
            };
            if let Some((code, status, message)) = failure {
                errors.push(json!({
                    "registrationId": id,
                    "errorCode": code,
                    "errorStatus": status,
                    "errorMessage": message,
                }));
                continue;
            }

            if request.mode == BulkOperationMode::Delete {
                state.records.remove(&id);
            } else {
                enrollment.etag = None;
                state.store(enrollment);
            }
        }

        ok_json(&json!({
            "isSuccessful": errors.is_empty(),
            "errors": errors,
        }))
    }

    fn query(&self, headers: &HeaderMap) -> TransportResponse {
        let page_size = headers
            .get(&MAX_ITEM_COUNT)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = match headers.get(&CONTINUATION) {
            None => 0,
            Some(token) => match decode_token(token) {
                Some(offset) => offset,
                None => return error(StatusCode::BAD_REQUEST, 400_020, "bad continuation token"),
            },
        };

        let state = self.state.lock().unwrap();
        let page: Vec<&Enrollment> = state.records.values().skip(offset).take(page_size).collect();
        let end = offset + page.len();

        let mut response = ok_json(&serde_json::to_value(&page).unwrap());
        response
            .headers
            .insert(ITEM_TYPE, HeaderValue::from_static("enrollment"));
        if end < state.records.len() {
            response.headers.insert(
                CONTINUATION,
                HeaderValue::from_str(&format!("cursor~{end}")).unwrap(),
            );
        }
        response
    }
}

fn decode_token(token: &HeaderValue) -> Option<usize> {
    token.to_str().ok()?.strip_prefix("cursor~")?.parse().ok()
}

fn ok_json(value: &Value) -> TransportResponse {
    TransportResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        body: Bytes::from(serde_json::to_vec(value).unwrap()),
    }
}

fn error(status: StatusCode, code: u32, message: &str) -> TransportResponse {
    TransportResponse {
        status,
        headers: HeaderMap::new(),
        body: Bytes::from(
            serde_json::to_vec(&json!({
                "errorCode": code,
                "trackingId": "emulator",
                "message": message,
            }))
            .unwrap(),
        ),
    }
}

#[async_trait]
impl RegistryTransport for RegistryEmulator {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());

        let fault = self.faults.lock().unwrap().pop_front();
        match fault {
            None => Ok(self.handle(&request)),
            Some(Fault::Timeout) => Err(TransportError::timeout("request timed out")),
            Some(Fault::Status(status)) => Ok(error(status, u32::from(status.as_u16()) * 1000, "injected")),
            Some(Fault::Throttle { retry_after_secs }) => {
                let mut response = error(StatusCode::TOO_MANY_REQUESTS, 429_001, "throttled");
                response
                    .headers
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                Ok(response)
            }
            Some(Fault::EmptyBody) => Ok(TransportResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            }),
        }
    }
}
