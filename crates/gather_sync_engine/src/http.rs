//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different libraries
//! (reqwest, ureq, platform HTTP stacks) can be plugged in without this crate
//! carrying the dependency. The transport owns the JSON codec and the mapping
//! from status codes to typed sync errors.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use gather_sync_protocol::{SyncRequest, SyncResponse};
use std::time::Duration;

/// A minimal HTTP reply: status code plus raw body.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implementations must enforce `timeout` themselves and report failures
/// (timeouts, refused connections, DNS) through the error string.
pub trait HttpClient: Send + Sync {
    /// Sends a POST with a JSON body and bearer token.
    fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        bearer_token: &str,
        timeout: Duration,
    ) -> Result<HttpReply, String>;
}

/// HTTP-based sync transport using the JSON wire contract.
pub struct HttpTransport<C: HttpClient> {
    endpoint: String,
    client: C,
    timeout: Duration,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport posting to `<base_url>/sync`.
    pub fn new(base_url: impl Into<String>, client: C, timeout: Duration) -> Self {
        let base = base_url.into();
        Self {
            endpoint: format!("{}/sync", base.trim_end_matches('/')),
            client,
            timeout,
        }
    }

    /// Creates a transport from the engine configuration.
    pub fn from_config(config: &crate::config::SyncConfig, client: C) -> Self {
        Self::new(&config.server_url, client, config.request_timeout)
    }

    /// Returns the sync endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn send(&self, request: &SyncRequest, auth_token: &str) -> SyncResult<SyncResponse> {
        let body = request
            .encode()
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let reply = self
            .client
            .post(&self.endpoint, body, auth_token, self.timeout)
            .map_err(SyncError::transport_retryable)?;

        match reply.status {
            200..=299 => SyncResponse::decode(&reply.body)
                .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}"))),
            401 => Err(SyncError::Unauthorized(body_message(&reply.body))),
            403 => Err(SyncError::Forbidden(body_message(&reply.body))),
            408 => Err(SyncError::Timeout),
            status => Err(SyncError::transport_retryable(format!(
                "unexpected status {status}: {}",
                body_message(&reply.body)
            ))),
        }
    }
}

fn body_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "(empty body)".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<HttpReply, String>>>,
        last_url: Mutex<Option<String>>,
        last_token: Mutex<Option<String>>,
    }

    impl ScriptedClient {
        fn push(&self, reply: Result<HttpReply, String>) {
            self.replies.lock().push_back(reply);
        }
    }

    impl HttpClient for ScriptedClient {
        fn post(
            &self,
            url: &str,
            _body: Vec<u8>,
            bearer_token: &str,
            _timeout: Duration,
        ) -> Result<HttpReply, String> {
            *self.last_url.lock() = Some(url.to_string());
            *self.last_token.lock() = Some(bearer_token.to_string());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or(Err("no scripted reply".into()))
        }
    }

    fn transport_with(client: ScriptedClient) -> HttpTransport<ScriptedClient> {
        HttpTransport::new(
            "https://sync.gather.example/",
            client,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        let transport = transport_with(ScriptedClient::default());
        assert_eq!(transport.endpoint(), "https://sync.gather.example/sync");
    }

    #[test]
    fn success_decodes_response() {
        let client = ScriptedClient::default();
        client.push(Ok(HttpReply {
            status: 200,
            body: SyncResponse::applied(2).encode().unwrap(),
        }));
        let transport = transport_with(client);

        let response = transport
            .send(&SyncRequest::new(Vec::new(), None), "tok")
            .unwrap();
        assert!(response.success);
        assert_eq!(response.applied_changes, 2);
    }

    #[test]
    fn unauthorized_and_forbidden_are_typed() {
        let client = ScriptedClient::default();
        client.push(Ok(HttpReply {
            status: 401,
            body: b"token expired".to_vec(),
        }));
        client.push(Ok(HttpReply {
            status: 403,
            body: b"not a member".to_vec(),
        }));
        let transport = transport_with(client);
        let request = SyncRequest::new(Vec::new(), None);

        assert!(matches!(
            transport.send(&request, "tok"),
            Err(SyncError::Unauthorized(_))
        ));
        assert!(matches!(
            transport.send(&request, "tok"),
            Err(SyncError::Forbidden(_))
        ));
    }

    #[test]
    fn server_errors_are_retryable() {
        let client = ScriptedClient::default();
        client.push(Ok(HttpReply {
            status: 503,
            body: Vec::new(),
        }));
        let transport = transport_with(client);

        let err = transport
            .send(&SyncRequest::new(Vec::new(), None), "tok")
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_body_is_retryable_protocol_error() {
        let client = ScriptedClient::default();
        client.push(Ok(HttpReply {
            status: 200,
            body: b"<html>gateway</html>".to_vec(),
        }));
        let transport = transport_with(client);

        let err = transport
            .send(&SyncRequest::new(Vec::new(), None), "tok")
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn connection_failure_is_retryable() {
        let client = ScriptedClient::default();
        client.push(Err("connection refused".into()));
        let transport = transport_with(client);

        let err = transport
            .send(&SyncRequest::new(Vec::new(), None), "tok")
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: true, .. }));
    }
}
