//! Request payload encoding.
//!
//! Payloads are flat blocks of `key.xxx: value` lines. Keys are dotted and
//! unquoted, values are bare literals, JSON strings or JSON arrays, and the
//! block is followed by a blank line.
use std::path::Path;

use sde_platform::{Arch, SystemInfo};

use crate::target::Target;
use crate::types::FormatOptions;

/// The request kinds sourcekite understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    CodeComplete,
    CursorInfo,
    Demangle,
    EditorOpen,
    EditorFormatText,
}

impl RequestKind {
    /// Value of the `key.request` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            RequestKind::CodeComplete => "source.request.codecomplete",
            RequestKind::CursorInfo => "source.request.cursorinfo",
            RequestKind::Demangle => "source.request.demangle",
            RequestKind::EditorOpen => "source.request.editor.open",
            RequestKind::EditorFormatText => "source.request.editor.formattext",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// An encoded request ready to be written after its id line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub kind: RequestKind,
    pub text: String,
}

/// Accumulates `key: value` entries and renders the block.
struct PayloadBuilder {
    entries: Vec<(&'static str, String)>,
}

impl PayloadBuilder {
    fn new(kind: RequestKind) -> Self {
        Self {
            entries: vec![("key.request", kind.wire_name().to_string())],
        }
    }

    fn raw(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.entries.push((key, value.into()));
        self
    }

    fn string(self, key: &'static str, value: &str) -> Self {
        self.raw(key, json_string(value))
    }

    fn array(self, key: &'static str, values: &[String]) -> Self {
        let items: Vec<String> = values.iter().map(|v| json_string(v)).collect();
        self.raw(key, format!("[{}]", items.join(",")))
    }

    fn finish(self, kind: RequestKind) -> RequestPayload {
        let body: Vec<String> = self
            .entries
            .into_iter()
            .map(|(key, value)| format!("  {}: {}", key, value))
            .collect();
        RequestPayload {
            kind,
            text: format!("{{\n{}\n}}\n\n", body.join(",\n")),
        }
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Build a code-completion or cursor-info request.
pub fn source_request(
    kind: RequestKind,
    source_path: &Path,
    offset: u64,
    compiler_arguments: &[String],
    source_text: &str,
) -> RequestPayload {
    PayloadBuilder::new(kind)
        .string("key.sourcefile", &source_path.to_string_lossy())
        .raw("key.offset", offset.to_string())
        .array("key.compilerargs", compiler_arguments)
        .string("key.sourcetext", source_text)
        .finish(kind)
}

/// Build a demangle request for the given mangled names.
pub fn demangle_request(names: &[String]) -> RequestPayload {
    PayloadBuilder::new(RequestKind::Demangle)
        .array("key.names", names)
        .finish(RequestKind::Demangle)
}

/// Build a request registering a buffer with sourcekite.
pub fn editor_open_request(
    source_path: &Path,
    source_text: &str,
    compiler_arguments: &[String],
) -> RequestPayload {
    PayloadBuilder::new(RequestKind::EditorOpen)
        .string("key.name", &source_path.to_string_lossy())
        .string("key.sourcetext", source_text)
        .array("key.compilerargs", compiler_arguments)
        .finish(RequestKind::EditorOpen)
}

/// Build a request formatting one line of a previously opened buffer.
pub fn format_text_request(source_path: &Path, line: u32, options: &FormatOptions) -> RequestPayload {
    let nested = format!(
        "{{\n    key.editor.format.indentwidth: {},\n    key.editor.format.tabwidth: {},\n    key.editor.format.usetabs: {}\n  }}",
        options.indent_width,
        options.tab_width,
        u8::from(options.use_tabs)
    );
    PayloadBuilder::new(RequestKind::EditorFormatText)
        .string("key.name", &source_path.to_string_lossy())
        .raw("key.line", line.to_string())
        .raw("key.length", "1")
        .raw("key.editor.format.options", nested)
        .finish(RequestKind::EditorFormatText)
}

const XCODE_PLATFORMS: &str = "/Applications/Xcode.app/Contents/Developer/Platforms";

fn sdk_path(platform: &str) -> String {
    format!(
        "{}/{}.platform/Developer/SDKs/{}.sdk",
        XCODE_PLATFORMS, platform, platform
    )
}

/// Framework imports that pin the target triple, checked in order.
const IMPORT_TARGETS: &[(&str, &str, &str)] = &[
    ("UIKit", "iPhoneOS", "arm64-apple-ios11.0"),
    ("WatchKit", "WatchOS", "armv7k-apple-watchos4.0"),
    ("AppKit", "MacOSX", "x86_64-apple-macosx10.10"),
];

/// `-target`/`-sdk` arguments inferred from the source text and host.
///
/// Empty when `explicit_arguments` already carries `-target`.
pub fn infer_target_arguments(
    explicit_arguments: &[String],
    source_text: &str,
    host: &SystemInfo,
) -> Vec<String> {
    if explicit_arguments.iter().any(|a| a == "-target") {
        return Vec::new();
    }

    for (framework, platform, triple) in IMPORT_TARGETS {
        if source_text.contains(&format!("import {}", framework)) {
            return vec![
                "-target".to_string(),
                triple.to_string(),
                "-sdk".to_string(),
                sdk_path(platform),
            ];
        }
    }

    if host.is_linux() {
        let arch = match host.arch() {
            Arch::Aarch64 => "aarch64",
            _ => "x86_64",
        };
        vec!["-target".to_string(), format!("{}-unknown-linux", arch)]
    } else {
        vec![
            "-target".to_string(),
            "x86_64-apple-macosx10.10".to_string(),
            "-sdk".to_string(),
            sdk_path("MacOSX"),
        ]
    }
}

/// Full compiler argument list for a request on `source_path`.
///
/// The target's own arguments come first, then every source of the target
/// (or just `source_path` for a target without sources), then the inferred
/// target triple.
pub fn resolve_compiler_arguments(
    target: &Target,
    source_path: &Path,
    source_text: &str,
    host: &SystemInfo,
) -> Vec<String> {
    let mut args = target.compiler_arguments.clone();
    if target.sources.is_empty() {
        args.push(source_path.to_string_lossy().into_owned());
    } else {
        args.extend(
            target
                .sources
                .iter()
                .map(|s| s.to_string_lossy().into_owned()),
        );
    }
    args.extend(infer_target_arguments(
        &target.compiler_arguments,
        source_text,
        host,
    ));
    args
}
