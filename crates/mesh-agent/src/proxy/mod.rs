//! The RPC proxy (§4.A): turns a `ResolvedEntry` into a callable object.
//! `RpcProxy` is the concrete type injected into a tool's dependency slots
//! (§9 Design Note "typed slot binding") — there is exactly one transport
//! implementation in this system, so tool authors hold `Arc<RpcProxy>`
//! directly rather than a trio of marker traits; `call`/`call_stream`/
//! `call_with_session` are its three "interfaces" as inherent methods.

pub mod error;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use sse_stream::SseStream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use mesh_core::wire::{ProxyKwargs, ResolvedEntry};

pub use error::CallError;
use session::SessionStore;

/// Server-side session TTL (§9 Design Note "Sessions"): not caller
/// configurable in v1.
const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

fn env_auth_token() -> Option<String> {
    std::env::var("MCP_MESH_AUTH_TOKEN").ok().filter(|v| !v.is_empty())
}

/// A remote tool call, bound to one resolved provider and one set of
/// per-dependency kwargs (§3 "Resolved dependency", §4.A).
pub struct RpcProxy {
    client: Client,
    entry: ResolvedEntry,
    kwargs: ProxyKwargs,
    session: SessionStore,
    next_id: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl RpcProxy {
    pub fn new(entry: ResolvedEntry) -> Self {
        let kwargs = entry.kwargs.clone();
        Self {
            client: Client::new(),
            entry,
            kwargs,
            session: SessionStore::new(SESSION_TTL),
            next_id: AtomicU64::new(1),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.entry.endpoint
    }

    pub fn function_name(&self) -> &str {
        &self.entry.function_name
    }

    /// Consecutive transport/timeout/5xx failures since the last success
    /// (§9 Design Note "Circuit-breaking hint"): exposed so the heartbeat
    /// pipeline can read it without re-deriving it from call history.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// `<endpoint>/mcp`, or the endpoint as-is if it already carries a
    /// path (§4.A "Wire protocol").
    fn mcp_url(&self) -> String {
        let endpoint = self.entry.endpoint.trim_end_matches('/');
        match reqwest::Url::parse(endpoint) {
            Ok(url) if !url.path().is_empty() && url.path() != "/" => endpoint.to_string(),
            _ => format!("{endpoint}/mcp"),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Synchronous invocation (§4.A public contract: `call`).
    pub async fn call(&self, args: Value) -> Result<Value, CallError> {
        let session_header = if self.kwargs.auto_session_management
            && (self.kwargs.session_required || self.kwargs.stateful)
        {
            Some(self.managed_session_id())
        } else {
            None
        };
        self.call_retrying(args, session_header.as_deref()).await
    }

    /// Session-bound invocation (§4.A public contract:
    /// `call_with_session`): the caller supplies the session id explicitly,
    /// overriding whatever the proxy might otherwise manage internally.
    pub async fn call_with_session(&self, session_id: &str, args: Value) -> Result<Value, CallError> {
        self.call_retrying(args, Some(session_id)).await
    }

    fn managed_session_id(&self) -> String {
        if let Some(existing) = self.session.current() {
            return existing;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.session.set(id.clone());
        id
    }

    async fn call_retrying(&self, args: Value, session_id: Option<&str>) -> Result<Value, CallError> {
        let endpoint = self.mcp_url();
        let body = self.build_request(&self.entry.function_name, &args);

        let mut attempt: u32 = 0;
        loop {
            match self.try_once(&endpoint, &body, session_id).await {
                Ok(value) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt + 1 < self.kwargs.retry_count => {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    let delay =
                        self.kwargs.retry_delay * self.kwargs.retry_backoff.powi(attempt as i32);
                    warn!(
                        target: "mesh_agent_proxy",
                        endpoint = %endpoint,
                        attempt,
                        delay_seconds = delay,
                        "retrying rpc call after failure: {err}"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }
    }

    fn build_request(&self, function_name: &str, args: &Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": self.next_request_id(),
            "method": "tools/call",
            "params": {
                "name": function_name,
                "arguments": args,
            }
        })
    }

    async fn try_once(
        &self,
        endpoint: &str,
        body: &Value,
        session_id: Option<&str>,
    ) -> Result<Value, CallError> {
        let mut req = self
            .client
            .post(endpoint)
            .header("content-type", &self.kwargs.content_type)
            .json(body);

        if let Some(accept) = self.kwargs.accepts.first() {
            req = req.header("accept", accept);
        }
        for (name, value) in &self.kwargs.custom_headers {
            req = req.header(name, value);
        }
        if self.kwargs.auth_required
            && let Some(token) = env_auth_token()
        {
            req = req.bearer_auth(token);
        }
        if let Some(session_id) = session_id {
            req = req.header("Mcp-Session-Id", session_id);
        }

        let timeout = Duration::from_secs_f64(self.kwargs.timeout.max(0.0));
        let send = req.timeout(timeout).send();

        let resp = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(CallError::Timeout {
                    endpoint: endpoint.to_string(),
                    seconds: self.kwargs.timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(CallError::Transport {
                    endpoint: endpoint.to_string(),
                    cause: e.to_string(),
                });
            }
            Err(_) => {
                return Err(CallError::Timeout {
                    endpoint: endpoint.to_string(),
                    seconds: self.kwargs.timeout,
                });
            }
        };

        // Size precheck from the declared Content-Length, before the body
        // is read (§4.A algorithm, §8 boundary behavior).
        if let Some(len) = resp.content_length()
            && len > self.kwargs.max_response_size
        {
            return Err(CallError::SizeLimit {
                endpoint: endpoint.to_string(),
                limit: self.kwargs.max_response_size,
            });
        }

        let status = resp.status();
        if status.is_server_error() {
            return Err(CallError::Transport {
                endpoint: endpoint.to_string(),
                cause: format!("http {status}"),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| CallError::Transport {
            endpoint: endpoint.to_string(),
            cause: e.to_string(),
        })?;
        if bytes.len() as u64 > self.kwargs.max_response_size {
            return Err(CallError::SizeLimit {
                endpoint: endpoint.to_string(),
                limit: self.kwargs.max_response_size,
            });
        }

        if !status.is_success() {
            return Err(CallError::Protocol {
                endpoint: endpoint.to_string(),
                message: format!("http {status}"),
            });
        }

        parse_envelope(endpoint, &bytes)
    }

    /// Streaming invocation (§4.A public contract: `call_stream`); only
    /// valid when the proxy was configured `streaming=true`.
    pub async fn call_stream(
        &self,
        args: Value,
    ) -> Result<impl Stream<Item = Result<Value, CallError>> + Send + 'static, CallError> {
        let endpoint = self.mcp_url();
        if !self.kwargs.streaming {
            return Err(CallError::Protocol {
                endpoint,
                message: "proxy is not configured with streaming=true".to_string(),
            });
        }

        let body = self.build_request(&self.entry.function_name, &args);
        let mut req = self
            .client
            .post(&endpoint)
            .header("content-type", &self.kwargs.content_type)
            .header("accept", "text/event-stream")
            .json(&body);
        for (name, value) in &self.kwargs.custom_headers {
            req = req.header(name, value);
        }
        if self.kwargs.auth_required
            && let Some(token) = env_auth_token()
        {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| CallError::Transport {
            endpoint: endpoint.clone(),
            cause: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(CallError::Protocol {
                endpoint: endpoint.clone(),
                message: format!("http {}", resp.status()),
            });
        }

        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        let mut events = SseStream::from_byte_stream(byte_stream);

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let stream_timeout = Duration::from_secs_f64(self.kwargs.stream_timeout.max(0.0));
        let stream_endpoint = endpoint.clone();

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(stream_timeout, events.next()).await {
                    Ok(Some(Ok(event))) => {
                        let Some(data) = event.data else { continue };
                        match serde_json::from_str::<Value>(&data) {
                            Ok(chunk) => {
                                let ended = chunk
                                    .get("stream_end")
                                    .and_then(Value::as_bool)
                                    .unwrap_or(false);
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                                if ended {
                                    return;
                                }
                            }
                            Err(e) => {
                                let _ = tx
                                    .send(Err(CallError::Protocol {
                                        endpoint: stream_endpoint.clone(),
                                        message: e.to_string(),
                                    }))
                                    .await;
                                return;
                            }
                        }
                    }
                    Ok(Some(Err(e))) => {
                        let _ = tx
                            .send(Err(CallError::Transport {
                                endpoint: stream_endpoint.clone(),
                                cause: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                    Ok(None) => return,
                    Err(_) => {
                        debug!(target: "mesh_agent_proxy", endpoint = %stream_endpoint, "stream stalled past stream_timeout");
                        let _ = tx
                            .send(Err(CallError::Timeout {
                                endpoint: stream_endpoint.clone(),
                                seconds: stream_timeout.as_secs_f64(),
                            }))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Release local resources. Server-side sessions expire by TTL; this
    /// only drops the proxy's local idea of the current session id.
    pub fn close(&self) {
        self.session.clear();
    }
}

/// Decode a JSON-RPC 2.0 envelope and unwrap MCP content blocks (§4.A
/// "on success, decode result.content; if content is a single text block,
/// unwrap to a string; otherwise return the structured content").
fn parse_envelope(endpoint: &str, bytes: &[u8]) -> Result<Value, CallError> {
    let envelope: Value = serde_json::from_slice(bytes).map_err(|e| CallError::Protocol {
        endpoint: endpoint.to_string(),
        message: format!("invalid json: {e}"),
    })?;

    match envelope.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        _ => {
            return Err(CallError::Protocol {
                endpoint: endpoint.to_string(),
                message: "missing or unexpected jsonrpc version".to_string(),
            });
        }
    }

    if let Some(error) = envelope.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("remote error")
            .to_string();
        return Err(CallError::Remote {
            endpoint: endpoint.to_string(),
            message,
        });
    }

    let Some(result) = envelope.get("result") else {
        return Err(CallError::Protocol {
            endpoint: endpoint.to_string(),
            message: "response has neither result nor error".to_string(),
        });
    };

    let Some(content) = result.get("content") else {
        return Ok(result.clone());
    };

    if let Some(blocks) = content.as_array()
        && let [single] = blocks.as_slice()
        && single.get("type").and_then(Value::as_str) == Some("text")
        && let Some(text) = single.get("text").and_then(Value::as_str)
    {
        return Ok(Value::String(text.to_string()));
    }

    Ok(content.clone())
}
