//! NF-008: HCL rendering, one Terraform `module` block per logical resource.
//!
//! Output is formatted the way `terraform fmt` would leave it: `source` and
//! `version` first, `=` aligned within each attribute group, `depends_on` last.

use crate::core::types::PropertyValue;

/// A rendered attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HclValue {
    Str(String),
    Int(u64),
    Bool(bool),
    List(Vec<String>),
    /// Raw expression, e.g. `module.compute_0.id`.
    Expr(String),
}

impl HclValue {
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            Self::Int(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => {
                let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
                format!("[{}]", quoted.join(", "))
            }
            Self::Expr(e) => e.clone(),
        }
    }
}

impl From<&PropertyValue> for HclValue {
    fn from(v: &PropertyValue) -> Self {
        match v {
            PropertyValue::Bool(b) => Self::Bool(*b),
            PropertyValue::Int(n) => Self::Int(*n),
            PropertyValue::Text(s) => Self::Str(s.clone()),
            PropertyValue::List(items) => Self::List(items.clone()),
        }
    }
}

/// Everything needed to render one module block.
#[derive(Debug)]
pub struct ModuleBlock<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub version: &'a str,
    /// Single-line header comment.
    pub comment: &'a str,
    pub attributes: &'a [(String, HclValue)],
    /// Target-specific identifiers of the modules this one waits on.
    pub depends_on: &'a [String],
}

/// Render a module block, terminated by a newline.
pub fn module_block(block: &ModuleBlock<'_>) -> String {
    let mut lines = vec![
        format!("# {}", block.comment),
        format!("module \"{}\" {{", block.name),
    ];

    let header = [
        ("source".to_string(), HclValue::Str(block.source.to_string())),
        ("version".to_string(), HclValue::Str(block.version.to_string())),
    ];
    push_aligned(&mut lines, &header);

    if !block.attributes.is_empty() {
        lines.push(String::new());
        push_aligned(&mut lines, block.attributes);
    }

    if !block.depends_on.is_empty() {
        lines.push(String::new());
        lines.push("  depends_on = [".to_string());
        for dep in block.depends_on {
            lines.push(format!("    module.{},", dep));
        }
        lines.push("  ]".to_string());
    }

    lines.push("}".to_string());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Reference to another module's output.
pub fn module_output(target_id: &str, output: &str) -> String {
    format!("module.{}.{}", target_id, output)
}

/// Target-specific identifier: `prefix` + logical id, lower-cased, with every
/// character outside `[a-z0-9_]` replaced by `_`.
pub fn sanitize_identifier(prefix: &str, logical_id: &str) -> String {
    let body: String = logical_id
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", prefix, body)
}

fn push_aligned(lines: &mut Vec<String>, attributes: &[(String, HclValue)]) {
    let width = attributes.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in attributes {
        lines.push(format!("  {:<width$} = {}", key, value.render(), width = width));
    }
}

/// Quote a string literal, escaping backslashes, quotes and template sequences.
fn quote(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "$${")
        .replace("%{", "%%{");
    format!("\"{}\"", escaped)
}
