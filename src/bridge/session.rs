//! Document session tracking
//!
//! The engine holds a mirror of every open document's text. The session
//! manager owns the authoritative copy on our side, forwards lifecycle
//! transitions as engine commands, and rejects out-of-order lifecycle calls
//! before anything reaches the wire.

use crate::bridge::convert::{apply_content_change, full_document_range, to_wire_span};
use crate::bridge::diagnostics::DiagnosticsReconciler;
use crate::bridge::error::BridgeError;
use crate::engine::protocol::EngineClient;
use crate::engine::types::{ChangeArgs, CloseArgs, OpenArgs, commands};
use crate::io::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use tracing::{debug, info};

// ============================================================================
// Session State
// ============================================================================

/// Authoritative state for one open document
#[derive(Debug, Clone)]
pub struct DocumentSession {
    pub uri: Url,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

/// Tracks open documents and mirrors their lifecycle into the engine
pub struct SessionManager<T: Transport> {
    client: Arc<EngineClient<T>>,
    reconciler: Arc<DiagnosticsReconciler<T>>,
    sessions: Mutex<HashMap<Url, DocumentSession>>,
}

impl<T: Transport + 'static> SessionManager<T> {
    pub fn new(client: Arc<EngineClient<T>>, reconciler: Arc<DiagnosticsReconciler<T>>) -> Self {
        Self {
            client,
            reconciler,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking a document and announce it to the engine
    ///
    /// Opening a uri that is already open is a client contract violation and
    /// is rejected without touching the engine.
    pub async fn open(
        &self,
        uri: Url,
        language_id: String,
        version: i32,
        text: String,
    ) -> Result<(), BridgeError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&uri) {
            return Err(BridgeError::invalid_state(format!(
                "document already open: {uri}"
            )));
        }

        info!("Opening document {} (version {})", uri, version);
        self.client.notify(
            commands::OPEN,
            Some(OpenArgs {
                file: uri.to_string(),
                file_content: text.clone(),
                script_kind_name: script_kind_for(&language_id),
            }),
        )?;

        sessions.insert(
            uri.clone(),
            DocumentSession {
                uri,
                language_id,
                version,
                text,
            },
        );
        Ok(())
    }

    /// Apply a batch of content changes and forward each as an engine edit
    ///
    /// The version is recorded unconditionally, even for an empty batch. Each
    /// change is forwarded before the local text is updated, so consecutive
    /// changes in one batch see the same pre-edit coordinates the client
    /// computed them against.
    pub async fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(), BridgeError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(uri)
            .ok_or_else(|| BridgeError::invalid_state(format!("document not open: {uri}")))?;

        debug!(
            "Applying {} change(s) to {} (version {} -> {})",
            changes.len(),
            uri,
            session.version,
            version
        );
        session.version = version;

        for change in changes {
            let range = match change.range {
                Some(range) => range,
                // Whole-document replacement becomes a full-span edit so the
                // engine sees one coherent change stream
                None => full_document_range(&session.text),
            };
            let span = to_wire_span(range);
            self.client.notify(
                commands::CHANGE,
                Some(ChangeArgs {
                    file: uri.to_string(),
                    line: span.start.line,
                    offset: span.start.offset,
                    end_line: span.end.line,
                    end_offset: span.end.offset,
                    insert_string: change.text.clone(),
                }),
            )?;
            apply_content_change(&mut session.text, change.range, &change.text);
        }
        Ok(())
    }

    /// Stop tracking a document, drop its in-flight diagnostics, and tell the
    /// engine to release it
    pub async fn close(&self, uri: &Url) -> Result<(), BridgeError> {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(uri)
        };
        let Some(session) = removed else {
            return Err(BridgeError::invalid_state(format!(
                "document not open: {uri}"
            )));
        };

        info!(
            "Closing document {} (last version {})",
            uri, session.version
        );
        self.reconciler.invalidate(uri).await;
        self.client.notify(
            commands::CLOSE,
            Some(CloseArgs {
                file: uri.to_string(),
            }),
        )?;
        Ok(())
    }

    /// Snapshot of an open document's state
    pub async fn get(&self, uri: &Url) -> Result<DocumentSession, BridgeError> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(uri)
            .cloned()
            .ok_or_else(|| BridgeError::invalid_state(format!("document not open: {uri}")))
    }

    /// Whether a document is currently open
    pub async fn is_open(&self, uri: &Url) -> bool {
        self.sessions.lock().await.contains_key(uri)
    }
}

/// Engine script-kind hint derived from the LSP language id
fn script_kind_for(language_id: &str) -> Option<String> {
    match language_id {
        "typescript" => Some("TS".to_string()),
        "typescriptreact" => Some("TSX".to_string()),
        "javascript" => Some("JS".to_string()),
        "javascriptreact" => Some("JSX".to_string()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
