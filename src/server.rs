//! Editor-facing server surface
//!
//! [`Backend`] implements the language server protocol over the bridge layer:
//! lifecycle notifications feed the session manager and kick off diagnostics,
//! feature requests delegate to the capability handlers, and bridge errors
//! map onto protocol error codes.

use crate::bridge::capabilities;
use crate::bridge::diagnostics::{DiagnosticsPublisher, DiagnosticsReconciler};
use crate::bridge::session::SessionManager;
use crate::engine::protocol::EngineClient;
use crate::io::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionOptions, CompletionParams, CompletionResponse, Diagnostic,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentFormattingParams, DocumentSymbolParams, DocumentSymbolResponse, InitializeParams,
    InitializeResult, InitializedParams, Location, MessageType, OneOf, ReferenceParams,
    ServerCapabilities, ServerInfo, SignatureHelp, SignatureHelpOptions, SignatureHelpParams,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextEdit, Url,
};
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

// ============================================================================
// Diagnostics Publishing
// ============================================================================

/// Routes merged diagnostics to the connected editor
pub struct ClientPublisher {
    client: Client,
}

impl ClientPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticsPublisher for ClientPublisher {
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

// ============================================================================
// Backend
// ============================================================================

/// The language server backend, generic over the engine transport
pub struct Backend<T: Transport + 'static> {
    client: Client,
    sessions: Arc<SessionManager<T>>,
    engine: Arc<EngineClient<T>>,
    reconciler: Arc<DiagnosticsReconciler<T>>,
}

impl<T: Transport + 'static> Backend<T> {
    /// Wire the backend together and register the engine event handler
    pub fn new(client: Client, engine: Arc<EngineClient<T>>) -> Self {
        let publisher = Arc::new(ClientPublisher::new(client.clone()));
        let reconciler = Arc::new(DiagnosticsReconciler::new(Arc::clone(&engine), publisher));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&engine),
            Arc::clone(&reconciler),
        ));

        let handler = reconciler.create_handler();
        let engine_for_handler = Arc::clone(&engine);
        tokio::spawn(async move {
            engine_for_handler.on_event(handler).await;
        });

        Self {
            client,
            sessions,
            engine,
            reconciler,
        }
    }

    /// Kick off a background diagnostics pass for a document
    fn spawn_diagnostics(&self, uri: Url) {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            if let Err(e) = reconciler.request_diagnostics(&uri).await {
                warn!("Diagnostics request for {} failed: {}", uri, e);
            }
        });
    }
}

#[async_trait]
impl<T: Transport + 'static> LanguageServer for Backend<T> {
    async fn initialize(&self, _params: InitializeParams) -> RpcResult<InitializeResult> {
        info!("Initializing language server");
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(true),
                    trigger_characters: Some(vec![".".to_string(), "\"".to_string()]),
                    ..CompletionOptions::default()
                }),
                references_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    ..SignatureHelpOptions::default()
                }),
                document_formatting_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "tsbridge".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("Language server initialized");
        if !self.engine.is_connected() {
            self.client
                .log_message(MessageType::ERROR, "analysis engine is not running")
                .await;
        }
    }

    async fn shutdown(&self) -> RpcResult<()> {
        info!("Shutting down language server");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        debug!("didOpen {}", doc.uri);
        match self
            .sessions
            .open(doc.uri.clone(), doc.language_id, doc.version, doc.text)
            .await
        {
            Ok(()) => self.spawn_diagnostics(doc.uri),
            Err(e) => warn!("Rejected didOpen for {}: {}", doc.uri, e),
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("didChange {} (version {})", uri, params.text_document.version);
        match self
            .sessions
            .change(&uri, params.text_document.version, params.content_changes)
            .await
        {
            Ok(()) => self.spawn_diagnostics(uri),
            Err(e) => warn!("Rejected didChange for {}: {}", uri, e),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        debug!("didClose {}", uri);
        if let Err(e) = self.sessions.close(&uri).await {
            warn!("Rejected didClose for {}: {}", uri, e);
        }
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> RpcResult<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let items = capabilities::completion(
            &self.engine,
            &self.sessions,
            &position.text_document.uri,
            position.position,
        )
        .await?;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn completion_resolve(&self, item: CompletionItem) -> RpcResult<CompletionItem> {
        Ok(capabilities::resolve_completion(&self.engine, item).await?)
    }

    async fn references(&self, params: ReferenceParams) -> RpcResult<Option<Vec<Location>>> {
        let position = params.text_document_position;
        let locations = capabilities::references(
            &self.engine,
            &self.sessions,
            &position.text_document.uri,
            position.position,
        )
        .await?;
        Ok(Some(locations))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> RpcResult<Option<DocumentSymbolResponse>> {
        let symbols =
            capabilities::document_symbols(&self.engine, &self.sessions, &params.text_document.uri)
                .await?;
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn signature_help(
        &self,
        params: SignatureHelpParams,
    ) -> RpcResult<Option<SignatureHelp>> {
        let position = params.text_document_position_params;
        let help = capabilities::signature_help(
            &self.engine,
            &self.sessions,
            &position.text_document.uri,
            position.position,
        )
        .await?;
        Ok(help)
    }

    async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> RpcResult<Option<Vec<TextEdit>>> {
        let edits =
            capabilities::formatting(&self.engine, &self.sessions, &params.text_document.uri)
                .await?;
        Ok(Some(edits))
    }
}
