//! Hover and go-to-definition projections of cursor info.
use std::path::PathBuf;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hover text for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverContents {
    pub name: String,
    /// Declaration with markup removed, when sourcekite supplied one.
    pub declaration: Option<String>,
    /// Demangled name(s) of the enclosing type.
    pub container_type: Option<String>,
    pub module: Option<String>,
    /// Markdown sections of the doc comment.
    pub documentation: Vec<String>,
}

impl HoverContents {
    /// Render as a single markdown document.
    pub fn to_markdown(&self) -> String {
        let Some(declaration) = &self.declaration else {
            return self.name.clone();
        };
        let mut md = format!("**Declaration:**\n```swift\n{}\n```\n", declaration);
        if let Some(container) = &self.container_type {
            md.push_str(&format!("**Declared In**:  {}\n\n", container));
        }
        if let Some(module) = &self.module {
            md.push_str(&format!("**Module**:  {}", module));
        }
        for paragraph in &self.documentation {
            md.push_str("\n\n");
            md.push_str(paragraph);
        }
        md
    }
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionLocation {
    pub path: PathBuf,
    /// Byte offset of the declaration.
    pub offset: u64,
    pub length: u64,
}

impl DefinitionLocation {
    /// Zero-based `(line, column)` of the start and end of the declaration
    /// within `text`, the contents of [`path`](Self::path).
    pub fn range_in(&self, text: &str) -> ((u32, u32), (u32, u32)) {
        let start = self.offset as usize;
        (
            position_at(text, start),
            position_at(text, start.saturating_add(self.length as usize)),
        )
    }
}

/// Zero-based line and column (in chars) of a byte offset, clamped to `text`.
pub fn position_at(text: &str, offset: usize) -> (u32, u32) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count();
    (line as u32, column as u32)
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

/// Concatenated text of every descendant, markup dropped.
fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

/// Running text of a paragraph-level element. `codeVoice` becomes inline code.
fn inline(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or_default());
        } else if child.is_element() {
            match child.tag_name().name() {
                "codeVoice" => {
                    out.push('`');
                    out.push_str(&text_content(child));
                    out.push('`');
                }
                _ => out.push_str(&inline(child)),
            }
        }
    }
    out
}

fn code_listing(node: Node<'_, '_>) -> String {
    let lines: Vec<String> = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "zCodeLineNumbered")
        .map(text_content)
        .collect();
    format!(
        "```{}\n{}\n```",
        node.attribute("language").unwrap_or_default(),
        lines.join("\n")
    )
}

fn list(node: Node<'_, '_>, marker: impl Fn(usize) -> String) -> String {
    node.children()
        .filter(|c| c.is_element() && c.tag_name().name() == "Item")
        .enumerate()
        .map(|(i, item)| format!("{} {}", marker(i), blocks(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn block(node: Node<'_, '_>) -> String {
    match node.tag_name().name() {
        "CodeListing" => code_listing(node),
        "List-Bullet" => list(node, |_| "*".to_string()),
        "List-Number" => list(node, |i| format!("{}.", i + 1)),
        _ => inline(node).trim().to_string(),
    }
}

/// Block children of a section, separated by blank lines.
fn blocks(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_element)
        .map(block)
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parameters(node: Node<'_, '_>) -> Option<String> {
    let items: Vec<String> = node
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "Parameter")
        .map(|param| {
            let name = child_element(param, "Name")
                .map(text_content)
                .unwrap_or_default();
            match child_element(param, "Discussion").map(blocks) {
                Some(discussion) if !discussion.is_empty() => {
                    format!("* **{}:** {}", name, discussion)
                }
                _ => format!("* **{}**", name),
            }
        })
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(format!("**Parameters:**\n{}", items.join("\n")))
    }
}

fn comment_part(node: Node<'_, '_>) -> Option<String> {
    let heading = match node.tag_name().name() {
        "Abstract" => "",
        "Discussion" => "**Discussion:**\n\n",
        "ResultDiscussion" => "**Returns:** ",
        "ThrowsDiscussion" => "**Throws:** ",
        "Parameters" => return parameters(node),
        other => {
            tracing::debug!("skipping <{}> in doc comment", other);
            return None;
        }
    };
    let body = blocks(node);
    if body.is_empty() {
        None
    } else {
        Some(format!("{}{}", heading, body))
    }
}

/// Markdown sections of `key.doc.full_as_xml`, in document order.
///
/// Only direct children of `CommentParts` are sections; a parameter's
/// `Discussion` stays inside its parameter bullet.
pub fn documentation_from_xml(xml: &str) -> Vec<String> {
    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!("unparsable doc comment xml: {}", e);
            return Vec::new();
        }
    };
    let root = doc.root_element();
    let parts = if root.tag_name().name() == "CommentParts" {
        root
    } else {
        match child_element(root, "CommentParts") {
            Some(parts) => parts,
            None => return Vec::new(),
        }
    };
    parts
        .children()
        .filter(Node::is_element)
        .filter_map(comment_part)
        .collect()
}

/// Text of a `Declaration` element, either the root itself or one of its children.
fn declaration_text(xml: &str) -> Option<String> {
    let doc = Document::parse(xml).ok()?;
    let root = doc.root_element();
    let declaration = if root.tag_name().name() == "Declaration" {
        root
    } else {
        child_element(root, "Declaration")?
    };
    Some(text_content(declaration).trim().to_string())
}

/// USR of the enclosing type, to be demangled for the hover.
pub fn container_type_usr(info: &Value) -> Option<&str> {
    info.get("key.containertypeusr")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Join the names of a `demangle` result.
pub fn container_type_name(demangled: &Value) -> Option<String> {
    let names: Vec<&str> = demangled
        .as_array()?
        .iter()
        .filter_map(|r| r.get("key.name").and_then(Value::as_str))
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(","))
    }
}

/// Build hover contents from cursor info. `None` when no symbol is under the cursor.
pub fn hover_from_cursor_info(info: &Value, container_type: Option<String>) -> Option<HoverContents> {
    let name = info.get("key.name").and_then(Value::as_str)?.to_string();
    let full_as_xml = info.get("key.doc.full_as_xml").and_then(Value::as_str);
    let annotated = info.get("key.annotated_decl").and_then(Value::as_str);

    let declaration = annotated.map(|annotated| {
        full_as_xml
            .and_then(declaration_text)
            .or_else(|| declaration_text(annotated))
            .unwrap_or_else(|| annotated.trim().to_string())
    });

    Some(HoverContents {
        name,
        declaration,
        container_type,
        module: info
            .get("key.modulename")
            .and_then(Value::as_str)
            .map(str::to_string),
        documentation: full_as_xml.map(documentation_from_xml).unwrap_or_default(),
    })
}

/// Definition location from cursor info. `None` for symbols without a source file.
pub fn definition_from_cursor_info(info: &Value) -> Option<DefinitionLocation> {
    let path = info.get("key.filepath").and_then(Value::as_str)?;
    Some(DefinitionLocation {
        path: PathBuf::from(path),
        offset: info.get("key.offset").and_then(Value::as_u64).unwrap_or(0),
        length: info.get("key.length").and_then(Value::as_u64).unwrap_or(0),
    })
}
