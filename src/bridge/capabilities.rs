//! Language capability handlers
//!
//! Each handler translates one editor-facing request into an engine command,
//! awaits the correlated response, and converts the body back to LSP shapes.
//! All of them require the target document to be open; positional arguments
//! cross the coordinate boundary through `bridge::convert`.

use crate::bridge::convert::{
    from_wire_location, from_wire_span, full_document_range, to_wire_location, to_wire_span,
};
use crate::bridge::error::BridgeError;
use crate::bridge::session::SessionManager;
use crate::engine::protocol::EngineClient;
use crate::engine::types::{
    CodeEdit, CompletionDetailsArgs, CompletionEntry, CompletionEntryDetails, CompletionsArgs,
    FileArgs, FileLocationArgs, FormatArgs, NavTreeItem, ReferencesBody, SignatureHelpBody,
    commands,
};
use crate::io::Transport;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, DocumentSymbol, Location,
    ParameterInformation, ParameterLabel, Position, Range, SignatureHelp, SignatureInformation,
    SymbolKind, TextEdit, Url,
};
use tracing::warn;

// ============================================================================
// Completion
// ============================================================================

/// Correlation payload stashed in `CompletionItem::data` so resolve can find
/// its way back to the original request site without a second completion pass
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveData {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub name: String,
}

/// Lightweight completion list for a position
///
/// Entries carry name, kind, and sort text only; documentation and display
/// strings are deferred to [`resolve_completion`].
pub async fn completion<T: Transport + 'static>(
    client: &EngineClient<T>,
    sessions: &SessionManager<T>,
    uri: &Url,
    position: Position,
) -> Result<Vec<CompletionItem>, BridgeError> {
    sessions.get(uri).await?;
    let location = to_wire_location(position);

    let entries: Vec<CompletionEntry> = client
        .request(
            commands::COMPLETIONS,
            Some(CompletionsArgs {
                file: uri.to_string(),
                line: location.line,
                offset: location.offset,
                prefix: None,
            }),
        )
        .await?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let data = ResolveData {
                file: uri.to_string(),
                line: location.line,
                offset: location.offset,
                name: entry.name.clone(),
            };
            CompletionItem {
                label: entry.name,
                kind: Some(completion_kind(&entry.kind)),
                sort_text: entry.sort_text,
                data: serde_json::to_value(data).ok(),
                ..CompletionItem::default()
            }
        })
        .collect())
}

/// Fill in the expensive fields of a previously returned completion item
///
/// Issues a details command for the single named entry; the original
/// completion list is never recomputed.
pub async fn resolve_completion<T: Transport + 'static>(
    client: &EngineClient<T>,
    mut item: CompletionItem,
) -> Result<CompletionItem, BridgeError> {
    let data = item
        .data
        .take()
        .ok_or_else(|| BridgeError::invalid_state("completion item has no resolve data"))?;
    let data: ResolveData = serde_json::from_value(data)
        .map_err(|e| BridgeError::protocol(format!("malformed resolve data: {e}")))?;

    let details: Vec<CompletionEntryDetails> = client
        .request(
            commands::COMPLETION_DETAILS,
            Some(CompletionDetailsArgs {
                file: data.file,
                line: data.line,
                offset: data.offset,
                entry_names: vec![data.name],
            }),
        )
        .await?;

    if let Some(detail) = details.into_iter().next() {
        item.detail = Some(detail.display_string);
        item.documentation = detail.documentation.map(Documentation::String);
    }
    Ok(item)
}

// ============================================================================
// References
// ============================================================================

/// All references to the symbol at a position, across every file the engine
/// knows about
pub async fn references<T: Transport + 'static>(
    client: &EngineClient<T>,
    sessions: &SessionManager<T>,
    uri: &Url,
    position: Position,
) -> Result<Vec<Location>, BridgeError> {
    sessions.get(uri).await?;
    let location = to_wire_location(position);

    let body: ReferencesBody = client
        .request(
            commands::REFERENCES,
            Some(FileLocationArgs {
                file: uri.to_string(),
                line: location.line,
                offset: location.offset,
            }),
        )
        .await?;

    Ok(body
        .refs
        .into_iter()
        .filter_map(|entry| match Url::parse(&entry.file) {
            Ok(uri) => Some(Location {
                uri,
                range: Range {
                    start: from_wire_location(entry.start),
                    end: from_wire_location(entry.end),
                },
            }),
            Err(_) => {
                warn!("Dropping reference with unparseable uri: {}", entry.file);
                None
            }
        })
        .collect())
}

// ============================================================================
// Document Symbols
// ============================================================================

/// Hierarchical symbol outline for a document
///
/// The engine's navigation tree root represents the file itself; its children
/// become the top-level symbols.
pub async fn document_symbols<T: Transport + 'static>(
    client: &EngineClient<T>,
    sessions: &SessionManager<T>,
    uri: &Url,
) -> Result<Vec<DocumentSymbol>, BridgeError> {
    sessions.get(uri).await?;

    let root: NavTreeItem = client
        .request(
            commands::NAVTREE,
            Some(FileArgs {
                file: uri.to_string(),
            }),
        )
        .await?;

    Ok(root.child_items.into_iter().map(to_document_symbol).collect())
}

#[allow(deprecated)]
fn to_document_symbol(item: NavTreeItem) -> DocumentSymbol {
    // The full range spans every occurrence the engine reports; the first
    // span is the primary declaration site
    let range = item
        .spans
        .iter()
        .copied()
        .map(from_wire_span)
        .reduce(|a, b| Range {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        })
        .unwrap_or_default();
    let selection_range = item
        .spans
        .first()
        .copied()
        .map(from_wire_span)
        .unwrap_or(range);

    let children: Vec<DocumentSymbol> =
        item.child_items.into_iter().map(to_document_symbol).collect();

    DocumentSymbol {
        name: item.text,
        detail: None,
        kind: symbol_kind(&item.kind),
        tags: None,
        deprecated: None,
        range,
        selection_range,
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

// ============================================================================
// Signature Help
// ============================================================================

/// Signature overloads applicable at a call site, or `None` when the engine
/// reports the position is not inside a call
pub async fn signature_help<T: Transport + 'static>(
    client: &EngineClient<T>,
    sessions: &SessionManager<T>,
    uri: &Url,
    position: Position,
) -> Result<Option<SignatureHelp>, BridgeError> {
    sessions.get(uri).await?;
    let location = to_wire_location(position);

    let body: Option<SignatureHelpBody> = client
        .request(
            commands::SIGNATURE_HELP,
            Some(FileLocationArgs {
                file: uri.to_string(),
                line: location.line,
                offset: location.offset,
            }),
        )
        .await?;

    Ok(body.map(|body| SignatureHelp {
        signatures: body
            .items
            .into_iter()
            .map(|item| SignatureInformation {
                label: item.label,
                documentation: item.documentation.map(Documentation::String),
                parameters: Some(
                    item.parameters
                        .into_iter()
                        .map(|parameter| ParameterInformation {
                            label: ParameterLabel::Simple(parameter.label),
                            documentation: parameter.documentation.map(Documentation::String),
                        })
                        .collect(),
                ),
                active_parameter: None,
            })
            .collect(),
        active_signature: Some(body.selected_item_index),
        active_parameter: Some(body.argument_index),
    }))
}

// ============================================================================
// Formatting
// ============================================================================

/// Whole-document formatting as a batch of text edits
///
/// The engine formats the full span of the tracked text; its edits come back
/// in arbitrary issuance order and are returned as-is, since LSP clients
/// apply edit batches atomically against the pre-edit document.
pub async fn formatting<T: Transport + 'static>(
    client: &EngineClient<T>,
    sessions: &SessionManager<T>,
    uri: &Url,
) -> Result<Vec<TextEdit>, BridgeError> {
    let session = sessions.get(uri).await?;
    let span = to_wire_span(full_document_range(&session.text));

    let edits: Vec<CodeEdit> = client
        .request(
            commands::FORMAT,
            Some(FormatArgs {
                file: uri.to_string(),
                line: span.start.line,
                offset: span.start.offset,
                end_line: span.end.line,
                end_offset: span.end.offset,
            }),
        )
        .await?;

    Ok(edits
        .into_iter()
        .map(|edit| TextEdit {
            range: Range {
                start: crate::bridge::convert::from_wire_location(edit.start),
                end: crate::bridge::convert::from_wire_location(edit.end),
            },
            new_text: edit.new_text,
        })
        .collect())
}

// ============================================================================
// Kind Mappings
// ============================================================================

/// Map the engine's element kind strings to LSP completion kinds
fn completion_kind(kind: &str) -> CompletionItemKind {
    match kind {
        "function" | "local function" => CompletionItemKind::FUNCTION,
        "method" | "construct" => CompletionItemKind::METHOD,
        "property" | "getter" | "setter" => CompletionItemKind::PROPERTY,
        "var" | "let" | "local var" | "parameter" => CompletionItemKind::VARIABLE,
        "const" => CompletionItemKind::CONSTANT,
        "class" | "local class" => CompletionItemKind::CLASS,
        "interface" => CompletionItemKind::INTERFACE,
        "enum" => CompletionItemKind::ENUM,
        "enum member" => CompletionItemKind::ENUM_MEMBER,
        "module" | "external module name" => CompletionItemKind::MODULE,
        "keyword" => CompletionItemKind::KEYWORD,
        "type" | "type parameter" | "alias" => CompletionItemKind::TYPE_PARAMETER,
        "directory" => CompletionItemKind::FOLDER,
        "script" => CompletionItemKind::FILE,
        _ => CompletionItemKind::TEXT,
    }
}

/// Map the engine's element kind strings to LSP symbol kinds
fn symbol_kind(kind: &str) -> SymbolKind {
    match kind {
        "function" | "local function" => SymbolKind::FUNCTION,
        "method" | "construct" => SymbolKind::METHOD,
        "property" | "getter" | "setter" => SymbolKind::PROPERTY,
        "var" | "let" | "local var" | "parameter" => SymbolKind::VARIABLE,
        "const" => SymbolKind::CONSTANT,
        "class" | "local class" => SymbolKind::CLASS,
        "interface" => SymbolKind::INTERFACE,
        "enum" => SymbolKind::ENUM,
        "enum member" => SymbolKind::ENUM_MEMBER,
        "module" | "external module name" => SymbolKind::MODULE,
        "type" | "alias" => SymbolKind::TYPE_PARAMETER,
        _ => SymbolKind::VARIABLE,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::convert::apply_edits;
    use crate::bridge::diagnostics::{DiagnosticsPublisher, DiagnosticsReconciler};
    use crate::engine::testing::ScriptedEngine;
    use crate::io::MockTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use tower_lsp::lsp_types::Diagnostic;

    struct NullPublisher;

    #[async_trait]
    impl DiagnosticsPublisher for NullPublisher {
        async fn publish(&self, _uri: Url, _diagnostics: Vec<Diagnostic>) {}
    }

    struct Fixture {
        client: Arc<EngineClient<MockTransport>>,
        sessions: SessionManager<MockTransport>,
        engine: ScriptedEngine,
    }

    async fn open_fixture(text: &str) -> Fixture {
        let (transport, engine) = ScriptedEngine::new();
        let client = Arc::new(EngineClient::new(transport));
        let reconciler = Arc::new(DiagnosticsReconciler::new(
            Arc::clone(&client),
            Arc::new(NullPublisher),
        ));
        let sessions = SessionManager::new(Arc::clone(&client), reconciler);
        sessions
            .open(uri(), "typescript".to_string(), 1, text.to_string())
            .await
            .unwrap();
        Fixture {
            client,
            sessions,
            engine,
        }
    }

    fn uri() -> Url {
        Url::parse("file:///project/main.ts").unwrap()
    }

    #[tokio::test]
    async fn test_completion_maps_entries_and_stashes_resolve_data() {
        let fixture = open_fixture("const x = a").await;
        fixture.engine.respond_with_body(
            commands::COMPLETIONS,
            json!([
                {"name": "parseInt", "kind": "function", "sortText": "11"},
                {"name": "answer", "kind": "const"},
            ]),
        );

        let items = completion(
            &fixture.client,
            &fixture.sessions,
            &uri(),
            Position::new(0, 11),
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "parseInt");
        assert_eq!(items[0].kind, Some(CompletionItemKind::FUNCTION));
        assert_eq!(items[0].sort_text.as_deref(), Some("11"));
        assert_eq!(items[1].kind, Some(CompletionItemKind::CONSTANT));

        // Wire coordinates recorded for resolve
        let data: ResolveData =
            serde_json::from_value(items[0].data.clone().unwrap()).unwrap();
        assert_eq!(data.line, 1);
        assert_eq!(data.offset, 12);
        assert_eq!(data.name, "parseInt");
    }

    #[tokio::test]
    async fn test_completion_requires_open_document() {
        let fixture = open_fixture("x").await;
        let other = Url::parse("file:///project/other.ts").unwrap();

        let err = completion(&fixture.client, &fixture.sessions, &other, Position::new(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_resolve_fetches_details_without_new_completion_pass() {
        let fixture = open_fixture("const x = a").await;
        fixture.engine.respond_with_body(
            commands::COMPLETIONS,
            json!([{"name": "parseInt", "kind": "function"}]),
        );
        fixture.engine.respond_with_body(
            commands::COMPLETION_DETAILS,
            json!([{
                "name": "parseInt",
                "kind": "function",
                "displayString": "function parseInt(string: string, radix?: number): number",
                "documentation": "Converts a string to an integer.",
            }]),
        );

        let items = completion(
            &fixture.client,
            &fixture.sessions,
            &uri(),
            Position::new(0, 11),
        )
        .await
        .unwrap();

        let resolved = resolve_completion(&fixture.client, items[0].clone())
            .await
            .unwrap();

        assert_eq!(
            resolved.detail.as_deref(),
            Some("function parseInt(string: string, radix?: number): number")
        );
        assert!(matches!(resolved.documentation, Some(Documentation::String(_))));

        // The details request named the entry; no second completions command
        let details = fixture.engine.requests_for(commands::COMPLETION_DETAILS);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].arguments.as_ref().unwrap()["entryNames"][0], "parseInt");
        assert_eq!(fixture.engine.requests_for(commands::COMPLETIONS).len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_without_data_rejected() {
        let fixture = open_fixture("x").await;
        let bare = CompletionItem::new_simple("orphan".to_string(), String::new());

        let err = resolve_completion(&fixture.client, bare).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
        assert!(fixture.engine.requests_for(commands::COMPLETION_DETAILS).is_empty());
    }

    #[tokio::test]
    async fn test_references_converted_to_locations() {
        let fixture = open_fixture("function f() {}\nf();").await;
        fixture.engine.respond_with_body(
            commands::REFERENCES,
            json!({"refs": [
                {"file": uri().to_string(), "start": {"line": 1, "offset": 10}, "end": {"line": 1, "offset": 11}, "isWriteAccess": true},
                {"file": uri().to_string(), "start": {"line": 2, "offset": 1}, "end": {"line": 2, "offset": 2}},
                {"file": "not a uri", "start": {"line": 1, "offset": 1}, "end": {"line": 1, "offset": 2}},
            ]}),
        );

        let locations = references(
            &fixture.client,
            &fixture.sessions,
            &uri(),
            Position::new(0, 9),
        )
        .await
        .unwrap();

        // Malformed uri entries are dropped, the rest converted to 0-based
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].range.start, Position::new(0, 9));
        assert_eq!(locations[1].range.start, Position::new(1, 0));
    }

    #[tokio::test]
    async fn test_document_symbols_nest_from_navtree() {
        let fixture = open_fixture("class C { m() {} }").await;
        fixture.engine.respond_with_body(
            commands::NAVTREE,
            json!({
                "text": "<module>",
                "kind": "module",
                "spans": [{"start": {"line": 1, "offset": 1}, "end": {"line": 1, "offset": 19}}],
                "childItems": [{
                    "text": "C",
                    "kind": "class",
                    "spans": [{"start": {"line": 1, "offset": 1}, "end": {"line": 1, "offset": 19}}],
                    "childItems": [{
                        "text": "m",
                        "kind": "method",
                        "spans": [{"start": {"line": 1, "offset": 11}, "end": {"line": 1, "offset": 17}}],
                    }],
                }],
            }),
        );

        let symbols = document_symbols(&fixture.client, &fixture.sessions, &uri())
            .await
            .unwrap();

        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "C");
        assert_eq!(symbols[0].kind, SymbolKind::CLASS);
        let children = symbols[0].children.as_ref().unwrap();
        assert_eq!(children[0].name, "m");
        assert_eq!(children[0].kind, SymbolKind::METHOD);
        assert_eq!(children[0].selection_range.start, Position::new(0, 10));
    }

    #[tokio::test]
    async fn test_signature_help_maps_overloads() {
        let fixture = open_fixture("f(1, ").await;
        fixture.engine.respond_with_body(
            commands::SIGNATURE_HELP,
            json!({
                "items": [{
                    "label": "f(a: number, b: string): void",
                    "parameters": [
                        {"label": "a: number"},
                        {"label": "b: string", "documentation": "the second one"},
                    ],
                }],
                "selectedItemIndex": 0,
                "argumentIndex": 1,
            }),
        );

        let help = signature_help(
            &fixture.client,
            &fixture.sessions,
            &uri(),
            Position::new(0, 5),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(help.signatures.len(), 1);
        assert_eq!(help.active_signature, Some(0));
        assert_eq!(help.active_parameter, Some(1));
        let params = help.signatures[0].parameters.as_ref().unwrap();
        assert_eq!(params.len(), 2);
    }

    #[tokio::test]
    async fn test_formatting_end_to_end() {
        let text = "export  function foo (     )   :  void   {   }";
        let fixture = open_fixture(text).await;
        // Scrambled issuance order, 1-based wire coordinates
        fixture.engine.respond_with_body(
            commands::FORMAT,
            json!([
                {"start": {"line": 1, "offset": 33}, "end": {"line": 1, "offset": 35}, "newText": " "},
                {"start": {"line": 1, "offset": 7}, "end": {"line": 1, "offset": 9}, "newText": " "},
                {"start": {"line": 1, "offset": 43}, "end": {"line": 1, "offset": 46}, "newText": " "},
                {"start": {"line": 1, "offset": 21}, "end": {"line": 1, "offset": 22}, "newText": ""},
                {"start": {"line": 1, "offset": 39}, "end": {"line": 1, "offset": 42}, "newText": " "},
                {"start": {"line": 1, "offset": 23}, "end": {"line": 1, "offset": 28}, "newText": ""},
                {"start": {"line": 1, "offset": 29}, "end": {"line": 1, "offset": 32}, "newText": ""},
            ]),
        );

        let edits = formatting(&fixture.client, &fixture.sessions, &uri())
            .await
            .unwrap();
        assert_eq!(edits.len(), 7);

        // The full-span request covered the whole document
        let format = fixture.engine.requests_for(commands::FORMAT);
        let args = format[0].arguments.as_ref().unwrap();
        assert_eq!(args["line"], 1);
        assert_eq!(args["offset"], 1);
        assert_eq!(args["endOffset"], text.len() as u64 + 1);

        assert_eq!(
            apply_edits(text, &edits),
            "export function foo(): void { }"
        );
    }

    #[test]
    fn test_kind_mappings() {
        assert_eq!(completion_kind("method"), CompletionItemKind::METHOD);
        assert_eq!(completion_kind("mystery"), CompletionItemKind::TEXT);
        assert_eq!(symbol_kind("interface"), SymbolKind::INTERFACE);
        assert_eq!(symbol_kind("mystery"), SymbolKind::VARIABLE);
    }
}
