//! Wire types for the engine command protocol
//!
//! Everything here mirrors the engine's JSON shapes exactly: camelCase field
//! names and 1-based line/offset coordinates. Conversion to LSP's 0-based
//! convention happens in `bridge::convert`, never here.

use serde::{Deserialize, Serialize};

// ============================================================================
// Command Kinds
// ============================================================================

/// Command kind strings understood by the engine
pub mod commands {
    pub const OPEN: &str = "open";
    pub const CHANGE: &str = "change";
    pub const CLOSE: &str = "close";
    pub const GETERR: &str = "geterr";
    pub const COMPLETIONS: &str = "completions";
    pub const COMPLETION_DETAILS: &str = "completionEntryDetails";
    pub const REFERENCES: &str = "references";
    pub const NAVTREE: &str = "navtree";
    pub const SIGNATURE_HELP: &str = "signatureHelp";
    pub const FORMAT: &str = "format";
}

// ============================================================================
// Coordinates
// ============================================================================

/// 1-based line/offset position on the engine wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLocation {
    pub line: u32,
    pub offset: u32,
}

/// A contiguous span between two wire locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSpan {
    pub start: WireLocation,
    pub end: WireLocation,
}

// ============================================================================
// Document Lifecycle Arguments
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenArgs {
    pub file: String,
    pub file_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_kind_name: Option<String>,
}

/// One incremental edit, expressed against the pre-edit document of the
/// change batch it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub end_line: u32,
    pub end_offset: u32,
    pub insert_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseArgs {
    pub file: String,
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeterrArgs {
    pub files: Vec<String>,
    /// Echoed back in every diagnostic event produced for this request;
    /// the reconciler discards events carrying a stale value
    pub generation: u64,
}

/// One diagnostic as reported by the engine (1-based coordinates)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDiagnostic {
    pub start: WireLocation,
    pub end: WireLocation,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Body of a `syntaxDiag` / `semanticDiag` / `suggestionDiag` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEventBody {
    pub file: String,
    pub generation: u64,
    pub diagnostics: Vec<WireDiagnostic>,
}

/// The independent diagnostic categories the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Syntax,
    Semantic,
    Suggestion,
}

impl DiagnosticCategory {
    /// Every category the bridge waits for before publishing
    pub const ALL: [DiagnosticCategory; 3] = [
        DiagnosticCategory::Syntax,
        DiagnosticCategory::Semantic,
        DiagnosticCategory::Suggestion,
    ];

    /// Event kind tag the engine uses for this category
    pub fn event_name(&self) -> &'static str {
        match self {
            DiagnosticCategory::Syntax => "syntaxDiag",
            DiagnosticCategory::Semantic => "semanticDiag",
            DiagnosticCategory::Suggestion => "suggestionDiag",
        }
    }

    /// Map an event kind tag back to its category
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "syntaxDiag" => Some(DiagnosticCategory::Syntax),
            "semanticDiag" => Some(DiagnosticCategory::Semantic),
            "suggestionDiag" => Some(DiagnosticCategory::Suggestion),
            _ => None,
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Lightweight completion entry; documentation and full signatures are
/// deliberately absent and fetched via `completionEntryDetails`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetailsArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub entry_names: Vec<String>,
}

/// Expensive per-entry details, only requested on resolve
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntryDetails {
    pub name: String,
    pub kind: String,
    pub display_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

// ============================================================================
// References / Symbols / Signature Help
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLocationArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub file: String,
    pub start: WireLocation,
    pub end: WireLocation,
    #[serde(default)]
    pub is_write_access: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesBody {
    pub refs: Vec<ReferenceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileArgs {
    pub file: String,
}

/// One node of the engine's navigation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavTreeItem {
    pub text: String,
    pub kind: String,
    pub spans: Vec<WireSpan>,
    #[serde(default)]
    pub child_items: Vec<NavTreeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureParameter {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub parameters: Vec<SignatureParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureHelpBody {
    pub items: Vec<SignatureItem>,
    pub selected_item_index: u32,
    pub argument_index: u32,
}

// ============================================================================
// Formatting
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    pub end_line: u32,
    pub end_offset: u32,
}

/// One discrete code edit produced by the engine
///
/// Edits may arrive in any issuance order but never overlap in target range;
/// overlap is a contract violation on the engine's side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdit {
    pub start: WireLocation,
    pub end: WireLocation,
    pub new_text: String,
}

// ============================================================================
// Tests
// ============================================================================
