// nbreport-core/src/catalog.rs
// ============================================================================
// Module: Template Catalog
// Description: Template discovery and parameter cell introspection.
// Purpose: List runnable notebook templates with their declared parameters.
// Dependencies: serde, serde_json, crate::literal
// ============================================================================

//! ## Overview
//! The catalog walks the template directory for notebook documents and
//! statically introspects each one's parameter cell: the first code cell
//! tagged `parameters`, whose lines declare defaults as
//! `name[: type] = literal  # help`. Introspection is best-effort — a
//! malformed notebook is still listed, with an empty parameter list, so one
//! broken template never hides the others. The catalog is recomputed on
//! every request; templates added or edited in the remote become visible
//! after the next sync.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::literal::literal_type_name;
use crate::literal::parse_literal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File extension identifying runnable templates.
const TEMPLATE_EXTENSION: &str = "ipynb";
/// Cell tag marking the parameter declaration cell.
const PARAMETERS_TAG: &str = "parameters";

// ============================================================================
// SECTION: Catalog Types
// ============================================================================

/// A runnable template and its declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDescriptor {
    /// Path relative to the template directory, forward-slash separated.
    pub path: String,
    /// Declared parameters, in declaration order.
    pub parameters: Vec<ParameterSpec>,
}

/// One declared template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Default value as raw source text.
    pub default: String,
    /// Declared or inferred type name.
    pub inferred_type_name: String,
    /// Help text from the trailing comment.
    pub help: String,
}

// ============================================================================
// SECTION: Notebook Document Model
// ============================================================================

/// Minimal notebook document model for introspection.
#[derive(Debug, Deserialize)]
struct Notebook {
    /// Document cells.
    #[serde(default)]
    cells: Vec<Cell>,
}

/// One notebook cell.
#[derive(Debug, Deserialize)]
struct Cell {
    /// Cell kind (`code`, `markdown`, ...).
    cell_type: String,
    /// Cell metadata carrying tags.
    #[serde(default)]
    metadata: CellMetadata,
    /// Cell source, either a single string or a list of lines.
    #[serde(default)]
    source: CellSource,
}

/// Notebook cell metadata.
#[derive(Debug, Default, Deserialize)]
struct CellMetadata {
    /// Cell tags.
    #[serde(default)]
    tags: Vec<String>,
}

/// Notebook cell source representation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    /// Whole source as one string.
    Text(String),
    /// Source split into lines.
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl CellSource {
    /// Returns the cell source as one string.
    fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Lines(lines) => lines.concat(),
        }
    }
}

// ============================================================================
// SECTION: Listing
// ============================================================================

/// Lists all templates under the given template directory.
///
/// Descriptors carry POSIX-style paths relative to `template_dir`, in
/// directory traversal order (entries sorted by name within each directory).
///
/// # Errors
///
/// Returns [`CatalogError`] when the template directory cannot be walked.
/// Per-template introspection failures are logged and yield an empty
/// parameter list instead of an error.
pub fn list_templates(template_dir: &Path) -> Result<Vec<TemplateDescriptor>, CatalogError> {
    let mut templates = Vec::new();
    walk(template_dir, template_dir, &mut templates)?;
    Ok(templates)
}

/// Recursively collects template descriptors under `dir`.
fn walk(
    dir: &Path,
    base: &Path,
    templates: &mut Vec<TemplateDescriptor>,
) -> Result<(), CatalogError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|err| CatalogError::Io {
            path: dir.display().to_string(),
            detail: err.to_string(),
        })?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, base, templates)?;
        } else if path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
            let relative = relative_posix_path(&path, base);
            let parameters = match introspect(&path) {
                Ok(parameters) => parameters,
                Err(err) => {
                    tracing::warn!(
                        template = %path.display(),
                        error = %err,
                        "unable to introspect template parameters"
                    );
                    Vec::new()
                }
            };
            templates.push(TemplateDescriptor {
                path: relative,
                parameters,
            });
        }
    }
    Ok(())
}

/// Renders a path relative to `base` with forward-slash separators.
fn relative_posix_path(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let components: Vec<String> =
        relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    components.join("/")
}

// ============================================================================
// SECTION: Introspection
// ============================================================================

/// Extracts the declared parameters of one template.
///
/// # Errors
///
/// Returns [`CatalogError`] when the document cannot be read or parsed.
pub fn introspect(template: &Path) -> Result<Vec<ParameterSpec>, CatalogError> {
    let bytes = fs::read(template).map_err(|err| CatalogError::Io {
        path: template.display().to_string(),
        detail: err.to_string(),
    })?;
    let notebook: Notebook =
        serde_json::from_slice(&bytes).map_err(|err| CatalogError::Malformed {
            path: template.display().to_string(),
            detail: err.to_string(),
        })?;
    let Some(cell) = notebook
        .cells
        .iter()
        .find(|cell| cell.cell_type == "code" && cell.metadata.tags.iter().any(|t| t == PARAMETERS_TAG))
    else {
        return Ok(Vec::new());
    };
    Ok(cell.source.text().lines().filter_map(parse_parameter_line).collect())
}

/// Parses one `name[: type] = literal  # help` declaration line.
fn parse_parameter_line(line: &str) -> Option<ParameterSpec> {
    let (code, help) = split_comment(line);
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let (lhs, default) = split_assignment(code)?;
    let (name, annotation) = match lhs.split_once(':') {
        Some((name, annotation)) => (name.trim(), Some(annotation.trim())),
        None => (lhs.trim(), None),
    };
    if !is_identifier(name) {
        return None;
    }
    let default = default.trim();
    if default.is_empty() {
        return None;
    }
    let inferred_type_name = annotation.map_or_else(
        || {
            parse_literal(default)
                .map_or("None", |value| literal_type_name(&value))
                .to_string()
        },
        ToString::to_string,
    );
    Some(ParameterSpec {
        name: name.to_string(),
        default: default.to_string(),
        inferred_type_name,
        help: help.unwrap_or_default(),
    })
}

/// Splits a line into code and trailing comment text, quote-aware.
fn split_comment(line: &str) -> (&str, Option<String>) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\'' | '"' => match quote {
                Some(open) if open == ch => quote = None,
                Some(_) => {}
                None => quote = Some(ch),
            },
            '#' if quote.is_none() => {
                return (&line[..index], Some(line[index + 1..].trim().to_string()));
            }
            _ => {}
        }
    }
    (line, None)
}

/// Splits a declaration at its first top-level `=`, rejecting comparisons.
fn split_assignment(code: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let bytes = code.as_bytes();
    for (index, ch) in code.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\'' | '"' => match quote {
                Some(open) if open == ch => quote = None,
                Some(_) => {}
                None => quote = Some(ch),
            },
            '=' if quote.is_none() => {
                let next_is_eq = bytes.get(index + 1) == Some(&b'=');
                let prev_is_cmp = index > 0
                    && matches!(bytes.get(index - 1), Some(b'=' | b'!' | b'<' | b'>'));
                if next_is_eq || prev_is_cmp {
                    return None;
                }
                return Some((&code[..index], &code[index + 1..]));
            }
            _ => {}
        }
    }
    None
}

/// Returns whether the text is a plain identifier.
fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Template catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem error while walking or reading templates.
    #[error("catalog io error for `{path}`: {detail}")]
    Io {
        /// Affected path.
        path: String,
        /// Failure detail.
        detail: String,
    },
    /// A template document failed to parse.
    #[error("malformed template `{path}`: {detail}")]
    Malformed {
        /// Affected path.
        path: String,
        /// Parse failure detail.
        detail: String,
    },
}
