//! Diagnostics reconciliation
//!
//! The engine reports diagnostics as independent per-category events
//! (syntax, semantic, suggestion) answering a single `geterr` command. The
//! reconciler tracks which categories are still outstanding per document,
//! merges them, and publishes exactly one notification per settled
//! generation. Generations substitute for cancellation: the engine cannot
//! abort work already requested, so superseded results are discarded by tag.

use crate::bridge::convert::from_wire_location;
use crate::bridge::error::BridgeError;
use crate::engine::protocol::{EngineClient, EventEnvelope};
use crate::engine::types::{
    DiagnosticCategory, DiagnosticEventBody, GeterrArgs, WireDiagnostic, commands,
};
use crate::io::Transport;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, oneshot};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Range, Url};
use tracing::{debug, warn};

// ============================================================================
// Publisher Seam
// ============================================================================

/// Outbound seam for merged diagnostics notifications
///
/// Implemented for `tower_lsp::Client` in the server layer and by a recorder
/// in tests.
#[async_trait]
pub trait DiagnosticsPublisher: Send + Sync {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>);
}

// ============================================================================
// Reconciler State
// ============================================================================

/// In-flight diagnostics bookkeeping for one document
struct RequestState {
    generation: u64,
    outstanding: HashSet<DiagnosticCategory>,
    merged: HashMap<DiagnosticCategory, Vec<WireDiagnostic>>,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Merges multi-category diagnostic events into single published notifications
pub struct DiagnosticsReconciler<T: Transport> {
    client: Arc<EngineClient<T>>,
    publisher: Arc<dyn DiagnosticsPublisher>,
    states: Arc<Mutex<HashMap<Url, RequestState>>>,
    next_generation: AtomicU64,
}

impl<T: Transport + 'static> DiagnosticsReconciler<T> {
    pub fn new(client: Arc<EngineClient<T>>, publisher: Arc<dyn DiagnosticsPublisher>) -> Self {
        Self {
            client,
            publisher,
            states: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Request (re)computation of diagnostics for a document
    ///
    /// Resolves once the merged result for the current generation has been
    /// published. A second call while the first is still outstanding attaches
    /// to the in-flight generation instead of issuing a duplicate command.
    pub async fn request_diagnostics(&self, uri: &Url) -> Result<(), BridgeError> {
        let receiver = {
            let mut states = self.states.lock().await;

            if let Some(state) = states.get_mut(uri) {
                // Coalesce: ride the in-flight generation
                debug!(
                    "Coalescing diagnostics request for {} into generation {}",
                    uri, state.generation
                );
                let (sender, receiver) = oneshot::channel();
                state.waiters.push(sender);
                receiver
            } else {
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                debug!("Starting diagnostics generation {} for {}", generation, uri);

                // geterr is answered by events only, so it bypasses the
                // pending-request table. Sent before the state is recorded;
                // an event cannot overtake us while we hold the lock.
                self.client.notify(
                    commands::GETERR,
                    Some(GeterrArgs {
                        files: vec![uri.to_string()],
                        generation,
                    }),
                )?;

                let (sender, receiver) = oneshot::channel();
                states.insert(
                    uri.clone(),
                    RequestState {
                        generation,
                        outstanding: DiagnosticCategory::ALL.into_iter().collect(),
                        merged: HashMap::new(),
                        waiters: vec![sender],
                    },
                );

                receiver
            }
        };

        // A dropped sender means the state was invalidated (document closed);
        // that resolves the caller without a publish, by design
        let _ = receiver.await;
        Ok(())
    }

    /// Drop any in-flight state for a closing document
    ///
    /// Late events for the dropped generation will no longer match anything
    /// and are discarded on arrival.
    pub async fn invalidate(&self, uri: &Url) {
        let mut states = self.states.lock().await;
        if let Some(state) = states.remove(uri) {
            debug!(
                "Invalidating diagnostics generation {} for {}",
                state.generation, uri
            );
            for waiter in state.waiters {
                let _ = waiter.send(());
            }
        }
    }

    /// Build the event handler to register on the engine client
    pub fn create_handler(self: &Arc<Self>) -> impl Fn(EventEnvelope) + Send + Sync + 'static {
        let reconciler = Arc::clone(self);
        move |event| {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                reconciler.handle_event(event).await;
            });
        }
    }

    /// Intake for unsolicited engine events
    ///
    /// Non-diagnostic events and stale or unmatched diagnostic events are
    /// dropped silently; that is the expected fate of superseded work.
    pub async fn handle_event(&self, event: EventEnvelope) {
        let Some(category) = DiagnosticCategory::from_event_name(&event.event) else {
            debug!("Ignoring engine event '{}'", event.event);
            return;
        };

        let Some(body) = event.body else {
            warn!("Diagnostic event '{}' without body", event.event);
            return;
        };
        let body: DiagnosticEventBody = match serde_json::from_value(body) {
            Ok(body) => body,
            Err(e) => {
                warn!("Malformed diagnostic event body: {}", e);
                return;
            }
        };
        let Ok(uri) = Url::parse(&body.file) else {
            warn!("Diagnostic event for unparseable uri: {}", body.file);
            return;
        };

        let publish = {
            let mut states = self.states.lock().await;

            let Some(state) = states.get_mut(&uri) else {
                debug!("Dropping diagnostics for closed or unknown uri {}", uri);
                return;
            };
            if state.generation != body.generation {
                debug!(
                    "Dropping stale diagnostics for {} (generation {} != {})",
                    uri, body.generation, state.generation
                );
                return;
            }

            state.merged.insert(category, body.diagnostics);
            state.outstanding.remove(&category);

            if state.outstanding.is_empty() {
                // Intentional .unwrap() - presence checked by get_mut above
                let state = states.remove(&uri).unwrap();
                Some(state)
            } else {
                None
            }
        };

        if let Some(state) = publish {
            let mut diagnostics = Vec::new();
            for category in DiagnosticCategory::ALL {
                if let Some(wire_diagnostics) = state.merged.get(&category) {
                    diagnostics.extend(
                        wire_diagnostics
                            .iter()
                            .map(|d| to_lsp_diagnostic(d, category)),
                    );
                }
            }

            debug!(
                "Publishing {} merged diagnostics for {} (generation {})",
                diagnostics.len(),
                uri,
                state.generation
            );
            self.publisher.publish(uri, diagnostics).await;

            for waiter in state.waiters {
                let _ = waiter.send(());
            }
        }
    }
}

/// Convert one wire diagnostic, using the reporting category as the severity
/// fallback when the engine supplies none
fn to_lsp_diagnostic(diagnostic: &WireDiagnostic, category: DiagnosticCategory) -> Diagnostic {
    let severity = match diagnostic.category.as_deref() {
        Some("error") => DiagnosticSeverity::ERROR,
        Some("warning") => DiagnosticSeverity::WARNING,
        Some("suggestion") => DiagnosticSeverity::HINT,
        _ => match category {
            DiagnosticCategory::Syntax | DiagnosticCategory::Semantic => DiagnosticSeverity::ERROR,
            DiagnosticCategory::Suggestion => DiagnosticSeverity::HINT,
        },
    };

    Diagnostic {
        range: Range {
            start: from_wire_location(diagnostic.start),
            end: from_wire_location(diagnostic.end),
        },
        severity: Some(severity),
        code: diagnostic.code.map(NumberOrString::Number),
        source: Some("tsbridge".to_string()),
        message: diagnostic.text.clone(),
        ..Diagnostic::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
