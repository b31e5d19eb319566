//! Testing utilities for the engine protocol
//!
//! [`ScriptedEngine`] plays the part of the external analysis process: it
//! watches the command envelopes a component under test sends through a
//! [`MockTransport`], answers them by echoing `request_seq`, and can emit
//! unsolicited events on demand.

#![allow(dead_code)]

use crate::engine::protocol::CommandEnvelope;
use crate::io::{MockTransport, MockTransportHandle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// What the scripted engine answers for one command kind
pub enum ScriptedReply {
    /// `success: true` with the given body
    Success(Value),
    /// `success: true`, no body (lifecycle acknowledgements)
    BodylessSuccess,
    /// `success: false` with the given message
    Failure(String),
    /// No response at all (commands answered by events, e.g. geterr)
    Silent,
}

type Responder = Box<dyn Fn(&CommandEnvelope) -> ScriptedReply + Send + Sync>;

/// Scripted stand-in for the engine process
#[derive(Clone)]
pub struct ScriptedEngine {
    handle: MockTransportHandle,
    responders: Arc<Mutex<HashMap<String, Responder>>>,
    requests: Arc<Mutex<Vec<CommandEnvelope>>>,
    request_arrived: Arc<Notify>,
}

impl ScriptedEngine {
    /// Create the engine plus the transport to hand to the component under test
    ///
    /// Commands without a registered responder get a bodyless success, so
    /// lifecycle notifications never require scripting.
    pub fn new() -> (MockTransport, ScriptedEngine) {
        let (transport, handle) = MockTransport::new();

        let engine = ScriptedEngine {
            handle: handle.clone(),
            responders: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            request_arrived: Arc::new(Notify::new()),
        };

        let pump = engine.clone();
        tokio::spawn(async move {
            while let Some(line) = pump.handle.next_sent().await {
                let envelope: CommandEnvelope = match serde_json::from_str(&line) {
                    Ok(envelope) => envelope,
                    Err(_) => continue,
                };

                let reply = {
                    let responders = pump.responders.lock().unwrap();
                    match responders.get(&envelope.command) {
                        Some(responder) => responder(&envelope),
                        None => ScriptedReply::BodylessSuccess,
                    }
                };

                // Record before answering so that a resolved caller can
                // already observe its own envelope via requests()
                pump.requests.lock().unwrap().push(envelope.clone());
                pump.request_arrived.notify_waiters();

                match reply {
                    ScriptedReply::Success(body) => {
                        pump.respond(&envelope, true, None, Some(body));
                    }
                    ScriptedReply::BodylessSuccess => {
                        pump.respond(&envelope, true, None, None);
                    }
                    ScriptedReply::Failure(message) => {
                        pump.respond(&envelope, false, Some(message), None);
                    }
                    ScriptedReply::Silent => {}
                }
            }
        });

        (transport, engine)
    }

    /// Script the reply for a command kind
    pub fn respond_to<F>(&self, command: &str, responder: F)
    where
        F: Fn(&CommandEnvelope) -> ScriptedReply + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .insert(command.to_string(), Box::new(responder));
    }

    /// Script a fixed successful body for a command kind
    pub fn respond_with_body(&self, command: &str, body: Value) {
        self.respond_to(command, move |_| ScriptedReply::Success(body.clone()));
    }

    /// Script a command kind to never answer
    pub fn silence(&self, command: &str) {
        self.respond_to(command, |_| ScriptedReply::Silent);
    }

    /// Emit an unsolicited event
    pub fn emit_event(&self, event: &str, body: Value) {
        self.handle.push_inbound(
            serde_json::json!({
                "seq": 0,
                "type": "event",
                "event": event,
                "body": body,
            })
            .to_string(),
        );
    }

    /// Snapshot of every envelope received so far
    pub fn requests(&self) -> Vec<CommandEnvelope> {
        self.requests.lock().unwrap().clone()
    }

    /// Envelopes received so far for one command kind
    pub fn requests_for(&self, command: &str) -> Vec<CommandEnvelope> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.command == command)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` envelopes for `command` have arrived
    pub async fn await_requests(&self, command: &str, count: usize) -> Vec<CommandEnvelope> {
        loop {
            // Register for the wakeup before checking, so an arrival between
            // the check and the await is not lost
            let notified = self.request_arrived.notified();
            let matching = self.requests_for(command);
            if matching.len() >= count {
                return matching;
            }
            notified.await;
        }
    }

    fn respond(
        &self,
        envelope: &CommandEnvelope,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        let mut response = serde_json::json!({
            "seq": 0,
            "type": "response",
            "request_seq": envelope.seq,
            "command": envelope.command,
            "success": success,
        });
        if let Some(message) = message {
            response["message"] = Value::String(message);
        }
        if let Some(body) = body {
            response["body"] = body;
        }
        self.handle.push_inbound(response.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::protocol::EngineClient;

    #[tokio::test]
    async fn test_scripted_engine_answers_requests() {
        let (transport, engine) = ScriptedEngine::new();
        engine.respond_with_body("navtree", serde_json::json!({"text": "root"}));

        let client = EngineClient::new(transport);
        let body: Value = client
            .request("navtree", Some(serde_json::json!({"file": "/a.ts"})))
            .await
            .unwrap();
        assert_eq!(body["text"], "root");

        let seen = engine.await_requests("navtree", 1).await;
        assert_eq!(seen[0].arguments.as_ref().unwrap()["file"], "/a.ts");
    }

    #[tokio::test]
    async fn test_scripted_engine_default_bodyless_success() {
        let (transport, engine) = ScriptedEngine::new();
        let client = EngineClient::new(transport);

        client
            .notify("open", Some(serde_json::json!({"file": "/a.ts"})))
            .unwrap();

        let seen = engine.await_requests("open", 1).await;
        assert_eq!(seen.len(), 1);
    }
}
