//! Transport layer abstraction for sync passes.

use crate::error::{SyncError, SyncResult};
use gather_sync_protocol::{SyncRequest, SyncResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sends one batch of pending changes to the remote authority.
///
/// Pure request/response: implementations carry their own request timeout but
/// no retry logic — retries belong to the orchestrator.
pub trait SyncTransport: Send + Sync {
    /// Submits the request with the given bearer token and returns the
    /// server's response.
    fn send(&self, request: &SyncRequest, auth_token: &str) -> SyncResult<SyncResponse>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for std::sync::Arc<T> {
    fn send(&self, request: &SyncRequest, auth_token: &str) -> SyncResult<SyncResponse> {
        (**self).send(request, auth_token)
    }
}

/// A scriptable transport for tests.
///
/// Responses and failures are consumed in the order they were pushed; an
/// exhausted script yields a protocol error.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<SyncResult<SyncResponse>>>,
    calls: AtomicU64,
    last_request: Mutex<Option<SyncRequest>>,
    last_token: Mutex<Option<String>>,
}

impl MockTransport {
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_response(&self, response: SyncResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_failure(&self, error: SyncError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of `send` invocations so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<SyncRequest> {
        self.last_request.lock().clone()
    }

    /// The token presented with the most recent request.
    pub fn last_token(&self) -> Option<String> {
        self.last_token.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn send(&self, request: &SyncRequest, auth_token: &str) -> SyncResult<SyncResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        *self.last_token.lock() = Some(auth_token.to_string());

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no scripted response".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_sync_protocol::SyncRequest;

    #[test]
    fn script_consumed_in_order() {
        let transport = MockTransport::new();
        transport.push_response(SyncResponse::applied(1));
        transport.push_failure(SyncError::Timeout);

        let request = SyncRequest::new(Vec::new(), None);

        let first = transport.send(&request, "tok").unwrap();
        assert_eq!(first.applied_changes, 1);

        let second = transport.send(&request, "tok");
        assert!(matches!(second, Err(SyncError::Timeout)));

        let third = transport.send(&request, "tok");
        assert!(matches!(third, Err(SyncError::Protocol(_))));

        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn records_request_and_token() {
        let transport = MockTransport::new();
        transport.push_response(SyncResponse::applied(0));

        let request = SyncRequest::new(Vec::new(), None);
        transport.send(&request, "bearer-abc").unwrap();

        assert!(transport.last_request().unwrap().is_empty());
        assert_eq!(transport.last_token().as_deref(), Some("bearer-abc"));
    }
}
