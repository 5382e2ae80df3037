//! Cursor-based pagination over a query specification.
//!
//! A [`Query`] starts `Ready` with no continuation token and moves to
//! `Exhausted` once a page arrives without one. Each call to
//! [`Query::next_page`] is one request; nothing is fetched at creation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use http::{HeaderName, HeaderValue, Method};

use crate::codec::decode_enrollment_page;
use crate::error::RegistryError;
use crate::models::{ContinuationToken, Enrollment, QuerySpecification};
use crate::transport::{RegistryTransport, TransportRequest};

/// Requested page size.
pub const MAX_ITEM_COUNT: HeaderName = HeaderName::from_static("x-ms-max-item-count");
/// Opaque continuation token, sent and received.
pub const CONTINUATION: HeaderName = HeaderName::from_static("x-ms-continuation");
/// Kind of the items in a result page.
pub const ITEM_TYPE: HeaderName = HeaderName::from_static("x-ms-item-type");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Ready,
    Exhausted,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Enrollment>,
    /// Token for the following page; `None` on the last page.
    pub continuation_token: Option<ContinuationToken>,
    /// Item kind reported by the service, e.g. `enrollment`.
    pub item_type: Option<String>,
}

/// Stateful cursor over the pages of one query.
///
/// Single-owner: `next_page` takes `&mut self`, so concurrent use of one
/// cursor is ruled out at compile time. Independent cursors over the same
/// specification do not interact.
pub struct Query {
    transport: Arc<dyn RegistryTransport>,
    segments: [String; 2],
    specification: QuerySpecification,
    body: Bytes,
    page_size: u32,
    continuation: Option<ContinuationToken>,
    state: CursorState,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("segments", &self.segments)
            .field("specification", &self.specification)
            .field("page_size", &self.page_size)
            .field("continuation", &self.continuation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Query {
    pub(crate) fn new(
        transport: Arc<dyn RegistryTransport>,
        collection: &str,
        specification: QuerySpecification,
        page_size: u32,
    ) -> Result<Self, RegistryError> {
        let body = serde_json::to_vec(&specification)
            .map(Bytes::from)
            .map_err(|e| RegistryError::validation(format!("query cannot be encoded: {e}")))?;
        Ok(Self {
            transport,
            segments: [collection.to_owned(), "query".to_owned()],
            specification,
            body,
            page_size,
            continuation: None,
            state: CursorState::Ready,
        })
    }

    /// `true` until a page without a continuation token has been returned.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.state == CursorState::Ready
    }

    /// Requested page size; 0 lets the service choose.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Token that the next request will carry, if any.
    #[must_use]
    pub fn continuation_token(&self) -> Option<&ContinuationToken> {
        self.continuation.as_ref()
    }

    #[must_use]
    pub fn specification(&self) -> &QuerySpecification {
        &self.specification
    }

    /// Fetch the next page.
    ///
    /// A page may be empty and still not be the last one. On any failure the
    /// cursor keeps its previous token and stays `Ready`, so the same page
    /// can be requested again.
    ///
    /// # Errors
    /// [`RegistryError::QueryExhausted`] once the last page was returned;
    /// otherwise transport, service or protocol failures of the request.
    pub async fn next_page(&mut self) -> Result<QueryPage, RegistryError> {
        if !self.has_next() {
            return Err(RegistryError::QueryExhausted);
        }

        let mut request =
            TransportRequest::new(Method::POST, self.segments.clone()).with_body(self.body.clone());
        if self.page_size > 0 {
            request
                .headers
                .insert(MAX_ITEM_COUNT, HeaderValue::from(self.page_size));
        }
        if let Some(token) = &self.continuation {
            let value = HeaderValue::from_str(token.as_str()).map_err(|_| {
                RegistryError::protocol("continuation token is not a valid header value")
            })?;
            request.headers.insert(CONTINUATION, value);
        }

        let response = crate::client::send(self.transport.as_ref(), "query", request).await?;
        let items = decode_enrollment_page(&response.body)?;

        let next = response
            .header_str(CONTINUATION.as_str())
            .filter(|t| !t.is_empty())
            .map(ContinuationToken::new);
        let item_type = response.header_str(ITEM_TYPE.as_str()).map(str::to_owned);

        tracing::debug!(
            items = items.len(),
            last_page = next.is_none(),
            "query page received"
        );

        self.continuation.clone_from(&next);
        if next.is_none() {
            self.state = CursorState::Exhausted;
        }

        Ok(QueryPage {
            items,
            continuation_token: next,
            item_type,
        })
    }

    /// Flatten the remaining pages into a stream of enrollments.
    ///
    /// Pages are fetched lazily as the stream is polled. The stream ends
    /// after the last page or right after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Enrollment, RegistryError>> + Send {
        futures::stream::unfold(Some((self, VecDeque::new())), |state| async move {
            let (mut query, mut buffer) = state?;
            loop {
                if let Some(item) = buffer.pop_front() {
                    return Some((Ok(item), Some((query, buffer))));
                }
                if !query.has_next() {
                    return None;
                }
                match query.next_page().await {
                    Ok(page) => buffer.extend(page.items),
                    Err(e) => return Some((Err(e), None)),
                }
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::transport::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use futures::StreamExt;
    use http::{HeaderMap, StatusCode};
    use std::sync::Mutex;

    /// Replays canned responses and records request headers.
    struct Scripted {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RegistryTransport for Scripted {
        async fn execute(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    fn page(ids: &[&str], token: Option<&str>) -> Result<TransportResponse, TransportError> {
        let items: Vec<Enrollment> = ids.iter().map(|id| Enrollment::new(*id)).collect();
        let mut headers = HeaderMap::new();
        headers.insert(ITEM_TYPE, HeaderValue::from_static("enrollment"));
        if let Some(token) = token {
            headers.insert(CONTINUATION, HeaderValue::from_str(token).unwrap());
        }
        Ok(TransportResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(serde_json::to_vec(&items).unwrap()),
        })
    }

    fn query(transport: Arc<Scripted>, page_size: u32) -> Query {
        Query::new(
            transport,
            "enrollments",
            QuerySpecification::new("SELECT * FROM enrollments"),
            page_size,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pages_until_token_absent() {
        let transport = Scripted::new(vec![
            page(&["a", "b"], Some("t1")),
            page(&[], Some("t2")),
            page(&["c"], None),
        ]);
        let mut q = query(transport.clone(), 2);

        assert!(q.has_next());
        let first = q.next_page().await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.item_type.as_deref(), Some("enrollment"));
        assert_eq!(q.continuation_token().map(ContinuationToken::as_str), Some("t1"));

        let second = q.next_page().await.unwrap();
        assert!(second.items.is_empty());
        assert!(q.has_next());

        let third = q.next_page().await.unwrap();
        assert_eq!(third.items[0].registration_id, "c");
        assert!(third.continuation_token.is_none());
        assert!(!q.has_next());
        assert!(matches!(
            q.next_page().await,
            Err(RegistryError::QueryExhausted)
        ));

        let seen = transport.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].segments, ["enrollments", "query"]);
        assert_eq!(seen[0].headers.get(&MAX_ITEM_COUNT).unwrap(), "2");
        assert!(seen[0].headers.get(&CONTINUATION).is_none());
        assert_eq!(seen[1].headers.get(&CONTINUATION).unwrap(), "t1");
        assert_eq!(seen[2].headers.get(&CONTINUATION).unwrap(), "t2");
        let body: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
        assert_eq!(body["query"], "SELECT * FROM enrollments");
    }

    #[tokio::test]
    async fn test_zero_page_size_omits_header() {
        let transport = Scripted::new(vec![page(&[], None)]);
        let mut q = query(transport.clone(), 0);
        q.next_page().await.unwrap();
        assert!(transport.seen()[0].headers.get(&MAX_ITEM_COUNT).is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor_ready() {
        let throttled = TransportResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let transport = Scripted::new(vec![
            page(&["a"], Some("t1")),
            Ok(throttled),
            Err(TransportError::timeout("deadline elapsed")),
            page(&["b"], None),
        ]);
        let mut q = query(transport.clone(), 1);

        q.next_page().await.unwrap();
        assert!(q.next_page().await.unwrap_err().is_throttled());
        assert!(q.has_next());
        assert!(matches!(
            q.next_page().await,
            Err(RegistryError::Transport(e)) if e.is_timeout()
        ));
        assert_eq!(q.continuation_token().map(ContinuationToken::as_str), Some("t1"));

        let last = q.next_page().await.unwrap();
        assert_eq!(last.items[0].registration_id, "b");
        assert!(transport
            .seen()
            .iter()
            .skip(1)
            .all(|r| r.headers.get(&CONTINUATION).unwrap() == "t1"));
    }

    #[tokio::test]
    async fn test_missing_page_body_is_protocol_violation() {
        let empty = TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let mut q = query(Scripted::new(vec![Ok(empty)]), 0);
        assert!(matches!(
            q.next_page().await,
            Err(RegistryError::ProtocolViolation { .. })
        ));
        assert!(q.has_next());
    }

    #[tokio::test]
    async fn test_into_stream_flattens_pages() {
        let transport = Scripted::new(vec![
            page(&["a", "b"], Some("t1")),
            page(&[], Some("t2")),
            page(&["c"], None),
        ]);
        let ids: Vec<String> = query(transport, 2)
            .into_stream()
            .map(|r| r.unwrap().registration_id)
            .collect()
            .await;
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_into_stream_stops_after_error() {
        let transport = Scripted::new(vec![
            page(&["a"], Some("t1")),
            Err(TransportError::new("connection reset")),
        ]);
        let results: Vec<Result<Enrollment, RegistryError>> =
            query(transport, 1).into_stream().collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RegistryError::Transport(_))));
    }
}
