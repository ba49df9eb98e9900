//! Shared rendering helpers
//!
//! Graphviz and Mermaid have different reserved characters; every renderer
//! in this crate goes through these helpers so identifiers and labels are
//! escaped the same way everywhere.

/// Mermaid node identifiers must not contain hyphens
pub fn mermaid_id(id: &str) -> String {
    id.replace('-', "_")
}

/// Escape Mermaid label text with numeric entity codes.
///
/// Mermaid treats `[ ] { } ( ) < > | "` as shape/markup syntax inside
/// labels; each is replaced by its `#NN;` entity.
pub fn mermaid_label(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for ch in label.chars() {
        match ch {
            '[' => escaped.push_str("#91;"),
            ']' => escaped.push_str("#93;"),
            '{' => escaped.push_str("#123;"),
            '}' => escaped.push_str("#125;"),
            '(' => escaped.push_str("#40;"),
            ')' => escaped.push_str("#41;"),
            '<' => escaped.push_str("#60;"),
            '>' => escaped.push_str("#62;"),
            '|' => escaped.push_str("#124;"),
            '"' => escaped.push_str("#34;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape a string for a quoted Graphviz attribute
pub fn dot_escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Wrap Mermaid source in its fenced code block
pub fn mermaid_fence(body: &str) -> String {
    format!("```mermaid\n{}```\n", body)
}
