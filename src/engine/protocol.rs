//! Engine command protocol layer
//!
//! Implements the line-oriented, sequence-numbered command protocol with
//! request/response correlation and event routing. Every outgoing envelope
//! carries a fresh `seq`; responses correlate via `request_seq`, not arrival
//! order, because asynchronous commands may complete after later-issued ones.

use crate::engine::error::EngineError;
use crate::io::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, trace};

// ============================================================================
// Envelope Types
// ============================================================================

/// Outgoing command envelope: one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Sequence number, unique and monotonic per connection
    pub seq: i64,

    /// Always "request"
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Command kind
    pub command: String,

    /// Command-specific arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Response envelope correlated to a command by `request_seq`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_seq: i64,

    pub command: String,

    pub success: bool,

    /// Failure explanation (present when `success` is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Result payload (present on most successful responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Unsolicited event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Any inbound line from the engine, discriminated by its `type` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundMessage {
    Response(ResponseEnvelope),
    Event(EventEnvelope),
}

// ============================================================================
// Engine Client (command correlator)
// ============================================================================

/// Type alias for the event handler to reduce signature noise
pub type EventHandler = Arc<dyn Fn(EventEnvelope) + Send + Sync>;

/// Default window after which a pending request is purged and rejected
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

type PendingMap = HashMap<i64, oneshot::Sender<ResponseEnvelope>>;

/// Command correlator multiplexing concurrent calls over one ordered transport
///
/// The pending-request table is the only shared mutable state: insert on
/// send, remove on resolve/timeout, flush on disconnect.
pub struct EngineClient<T: Transport> {
    /// Channel for outbound envelopes; preserves strict call order
    outbound_sender: mpsc::UnboundedSender<String>,

    /// Sequence number counter
    request_seq: AtomicI64,

    /// Pending requests awaiting responses, keyed by seq
    pending_requests: Arc<Mutex<PendingMap>>,

    /// Event handler (shared with the transport task)
    event_handler: Arc<Mutex<Option<EventHandler>>>,

    /// Type parameter marker
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Transport + 'static> EngineClient<T> {
    /// Create a new client and start its transport task
    pub fn new(transport: T) -> Self {
        let transport_arc = Arc::new(Mutex::new(transport));
        let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let pending_requests: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));

        let event_handler = Arc::new(Mutex::new(None::<EventHandler>));
        let handler_clone = Arc::clone(&event_handler);

        let transport_clone = Arc::clone(&transport_arc);
        let pending_clone = Arc::clone(&pending_requests);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Outbound envelopes (prioritized, written in call order)
                    Some(line) = outbound_receiver.recv() => {
                        let mut transport = transport_clone.lock().await;
                        if let Err(e) = transport.send(&line).await {
                            error!("Failed to send command to engine: {}", e);
                            break;
                        }
                        drop(transport);
                    }
                    // Inbound lines
                    result = async {
                        let mut transport = transport_clone.lock().await;
                        transport.receive().await
                    } => {
                        match result {
                            Ok(line) => {
                                let handler = handler_clone.lock().await.clone();
                                Self::process_inbound_line(&line, &pending_clone, &handler).await;
                            }
                            Err(e) => {
                                debug!("Engine connection closed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            // Connection is gone: every still-pending request is rejected.
            // Dropping the senders makes the awaiting callers observe
            // ConnectionClosed.
            let mut pending = pending_clone.lock().await;
            if !pending.is_empty() {
                debug!("Flushing {} pending requests on disconnect", pending.len());
                pending.clear();
            }

            trace!("Engine transport task finished");
        });

        Self {
            outbound_sender,
            request_seq: AtomicI64::new(1),
            pending_requests,
            event_handler,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Set the handler invoked for every unsolicited event
    pub async fn on_event<F>(&self, handler: F)
    where
        F: Fn(EventEnvelope) + Send + Sync + 'static,
    {
        *self.event_handler.lock().await = Some(Arc::new(handler));
    }

    /// Route an inbound line to the matching pending request or the event handler
    async fn process_inbound_line(
        line: &str,
        pending_requests: &Arc<Mutex<PendingMap>>,
        event_handler: &Option<EventHandler>,
    ) {
        trace!("EngineClient: received line: {}", line);

        match serde_json::from_str::<InboundMessage>(line) {
            Ok(InboundMessage::Response(response)) => {
                let mut pending = pending_requests.lock().await;
                match pending.remove(&response.request_seq) {
                    Some(sender) => {
                        if sender.send(response).is_err() {
                            debug!("Response receiver dropped before resolution");
                        }
                    }
                    None => {
                        // Already resolved, timed out, or never ours: dropped,
                        // never fatal
                        debug!(
                            "Dropping response with unmatched seq {}",
                            response.request_seq
                        );
                    }
                }
            }
            Ok(InboundMessage::Event(event)) => {
                trace!("EngineClient: event '{}'", event.event);
                if let Some(handler) = event_handler {
                    handler(event);
                }
            }
            Err(e) => {
                debug!("Dropping unparseable engine message: {} ({})", line, e);
            }
        }
    }

    /// Send a command and await its response with the default timeout
    pub async fn request<P, R>(&self, command: &str, arguments: Option<P>) -> Result<R, EngineError>
    where
        P: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        self.request_with_timeout(command, arguments, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send a command and await its response with a custom timeout
    ///
    /// On timeout the pending entry is purged; a response arriving later is
    /// dropped via the unmatched-seq path.
    pub async fn request_with_timeout<P, R>(
        &self,
        command: &str,
        arguments: Option<P>,
        timeout: std::time::Duration,
    ) -> Result<R, EngineError>
    where
        P: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst);
        let (response_sender, response_receiver) = oneshot::channel();

        {
            let mut pending = self.pending_requests.lock().await;
            pending.insert(seq, response_sender);
        }

        if let Err(e) = self.write_envelope(seq, command, arguments) {
            let mut pending = self.pending_requests.lock().await;
            pending.remove(&seq);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, response_receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Sender dropped: the transport task flushed the table
                return Err(EngineError::ConnectionClosed);
            }
            Err(_) => {
                let mut pending = self.pending_requests.lock().await;
                pending.remove(&seq);
                return Err(EngineError::Timeout);
            }
        };

        if !response.success {
            return Err(EngineError::Engine {
                message: response
                    .message
                    .unwrap_or_else(|| "unspecified engine failure".to_string()),
            });
        }

        match response.body {
            Some(body) => serde_json::from_value(body).map_err(EngineError::Deserialization),
            // Bodyless success: commands like `open` acknowledge with nothing
            None => serde_json::from_value(Value::Null).map_err(|_| EngineError::MissingBody),
        }
    }

    /// Send a fire-and-forget command
    ///
    /// The envelope still consumes a seq (every line carries one) but no
    /// pending entry is registered and no response is expected.
    pub fn notify<P>(&self, command: &str, arguments: Option<P>) -> Result<(), EngineError>
    where
        P: serde::Serialize,
    {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst);
        self.write_envelope(seq, command, arguments)
    }

    /// Serialize an envelope and hand it to the outbound writer
    fn write_envelope<P>(
        &self,
        seq: i64,
        command: &str,
        arguments: Option<P>,
    ) -> Result<(), EngineError>
    where
        P: serde::Serialize,
    {
        let envelope = CommandEnvelope {
            seq,
            msg_type: "request".to_string(),
            command: command.to_string(),
            arguments: arguments
                .map(|a| serde_json::to_value(a).map_err(EngineError::Serialization))
                .transpose()?,
        };

        let line = serde_json::to_string(&envelope).map_err(EngineError::Serialization)?;
        debug!("EngineClient: sending command: {}", line);

        self.outbound_sender
            .send(line)
            .map_err(|_| EngineError::ConnectionClosed)
    }

    /// Check if the outbound side is still open
    pub fn is_connected(&self) -> bool {
        !self.outbound_sender.is_closed()
    }

    /// Reject every pending request (engine exit, restart)
    pub async fn cleanup_pending_requests(&self) {
        let mut pending = self.pending_requests.lock().await;
        if !pending.is_empty() {
            debug!("Cleaning up {} pending requests", pending.len());
            // Dropping the senders resolves every caller with ConnectionClosed
            pending.clear();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
