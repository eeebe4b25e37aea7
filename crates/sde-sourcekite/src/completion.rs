//! Completion results projected into editor-facing items.
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Completion item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionItemKind {
    /// Fallback for kinds without a better match.
    Text = 1,
    Method = 2,
    Function = 3,
    Constructor = 4,
    Field = 5,
    Variable = 6,
    Class = 7,
    Interface = 8,
    Property = 10,
    Value = 12,
    Enum = 13,
    /// Operators and subscripts.
    Keyword = 14,
    Reference = 18,
}

impl CompletionItemKind {
    /// Map a sourcekite `key.kind` value.
    pub fn from_sourcekit_kind(kind: &str) -> Self {
        let Some(rest) = kind
            .strip_prefix("source.lang.swift.decl.")
            .or_else(|| kind.strip_prefix("source.lang.swift.ref."))
        else {
            return CompletionItemKind::Text;
        };

        match rest {
            "function.free" => CompletionItemKind::Function,
            "function.method.instance" | "function.method.static" => CompletionItemKind::Method,
            "function.operator" | "function.subscript" => CompletionItemKind::Keyword,
            "function.constructor" | "function.destructor" => CompletionItemKind::Constructor,
            "function.accessor.getter" | "function.accessor.setter" => CompletionItemKind::Property,
            "class" | "struct" | "extension.class" | "extension.struct" => {
                CompletionItemKind::Class
            }
            "enum" | "extension.enum" => CompletionItemKind::Enum,
            "enumelement" => CompletionItemKind::Value,
            "protocol" => CompletionItemKind::Interface,
            "typealias" => CompletionItemKind::Reference,
            "var.instance" => CompletionItemKind::Field,
            "var.global" | "var.static" | "var.local" => CompletionItemKind::Variable,
            _ => CompletionItemKind::Text,
        }
    }
}

/// An edit expressed in byte offsets of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEdit {
    pub start: usize,
    pub end: usize,
    pub new_text: String,
}

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text shown in the completion list.
    pub label: String,
    pub kind: CompletionItemKind,
    /// `Module.name` of the declaration.
    pub detail: Option<String>,
    /// Snippet inserted on accept.
    pub insert_text: String,
    pub documentation: Option<String>,
    /// Cleanups of text typed before the cursor that the snippet repeats.
    pub additional_edits: Vec<OffsetEdit>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#T##(.+?)#>").expect("placeholder regex is valid"))
}

/// Turn sourcekite placeholder syntax into an editor snippet.
///
/// `<#T##Int#>` becomes `${1:Int}` (numbered left to right, only the part
/// before any further `##` is kept), the first `<#code#>` becomes the next
/// bare tab stop, and a leading `.` is dropped.
pub fn snippet_from_sourcetext(sourcetext: &str) -> String {
    let mut index = 1;
    let replaced = placeholder_regex().replace_all(sourcetext, |caps: &Captures<'_>| {
        let name = caps[1].split("##").next().unwrap_or_default();
        let stop = format!("${{{}:{}}}", index, name);
        index += 1;
        stop
    });
    let normalized = replaced.replacen("<#code#>", &format!("${{{}}}", index), 1);
    match normalized.strip_prefix('.') {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

/// Edit removing the last `sub` typed shortly before `offset`.
fn remove_substring_fix(text: &str, offset: usize, sub: &str, replacement: &str) -> Option<OffsetEdit> {
    let offset = offset.min(text.len());
    let window = (sub.len() * 2 - 1).max(3);
    let mut prefix_start = offset.saturating_sub(window);
    while !text.is_char_boundary(prefix_start) {
        prefix_start -= 1;
    }
    let prefix = text.get(prefix_start..offset)?;
    let found = prefix.rfind(sub)?;
    Some(OffsetEdit {
        start: prefix_start + found,
        end: prefix_start + found + sub.len(),
        new_text: replacement.to_string(),
    })
}

/// Fixes for function completions typed after `func ` or `..`.
pub fn duplicate_fixes(kind: &str, text: &str, offset: usize) -> Vec<OffsetEdit> {
    if !kind.contains("source.lang.swift.decl.function.") {
        return Vec::new();
    }
    [("func ", ""), ("..", ".")]
        .iter()
        .filter_map(|(sub, replacement)| remove_substring_fix(text, offset, sub, replacement))
        .collect()
}

fn str_field(entry: &Value, key: &str) -> Option<String> {
    entry.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Build one item from a `key.results` entry.
pub fn completion_item(entry: &Value, text: &str, offset: usize) -> CompletionItem {
    let kind = entry.get("key.kind").and_then(Value::as_str).unwrap_or_default();
    let detail = match (str_field(entry, "key.modulename"), str_field(entry, "key.name")) {
        (Some(module), Some(name)) => Some(format!("{}.{}", module, name)),
        (None, Some(name)) => Some(name),
        _ => None,
    };
    CompletionItem {
        label: str_field(entry, "key.description").unwrap_or_default(),
        kind: CompletionItemKind::from_sourcekit_kind(kind),
        detail,
        insert_text: snippet_from_sourcetext(
            entry
                .get("key.sourcetext")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        documentation: str_field(entry, "key.doc.brief"),
        additional_edits: duplicate_fixes(kind, text, offset),
    }
}

/// Project a `code_complete` result. Anything but an array yields nothing.
pub fn completion_items(results: &Value, text: &str, offset: usize) -> Vec<CompletionItem> {
    results
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| completion_item(entry, text, offset))
                .collect()
        })
        .unwrap_or_default()
}
