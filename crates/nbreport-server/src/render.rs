// nbreport-server/src/render.rs
// ============================================================================
// Module: HTML Rendering
// Description: Server-rendered pages for the template picker and errors.
// Purpose: Build the picker form page and the error page from catalog and
//          error descriptors, with strict output escaping.
// Dependencies: nbreport-core, serde_json
// ============================================================================

//! ## Overview
//! The service serves two pages of its own: the template picker on `/` and
//! the error page rendered from an [`ErrorDescriptor`]. Both are plain
//! string templates; every interpolated value passes through [`escape`],
//! since template paths, parameter defaults, and stderr excerpts are all
//! untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nbreport_core::ErrorDescriptor;
use nbreport_core::TemplateDescriptor;

// ============================================================================
// SECTION: Escaping
// ============================================================================

/// Escapes text for interpolation into HTML bodies and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// SECTION: Pages
// ============================================================================

/// Renders the template picker page.
///
/// Each template gets its own form posting back to `/` with the template
/// path in a hidden field and one `root[<name>]` input per declared
/// parameter, pre-filled with the declared default.
#[must_use]
pub fn picker_page(templates: &[TemplateDescriptor]) -> String {
    let mut body = String::new();
    if templates.is_empty() {
        body.push_str("<p>No report templates available.</p>\n");
    }
    for template in templates {
        let path = escape(&template.path);
        body.push_str(&format!("<section>\n<h2>{path}</h2>\n"));
        body.push_str(&format!(
            "<form method=\"post\" action=\"/\">\n\
             <input type=\"hidden\" name=\"path\" value=\"/{path}\">\n"
        ));
        for parameter in &template.parameters {
            let name = escape(&parameter.name);
            let default = escape(&parameter.default);
            let kind = escape(&parameter.inferred_type_name);
            let help = escape(&parameter.help);
            body.push_str(&format!(
                "<label>{name} <small>({kind})</small>\n\
                 <input name=\"root[{name}]\" value=\"{default}\" title=\"{help}\">\n\
                 </label>\n"
            ));
        }
        body.push_str("<button type=\"submit\">Run report</button>\n</form>\n</section>\n");
    }
    page("Report templates", &body)
}

/// Renders the error page for a normalized error descriptor.
#[must_use]
pub fn error_page(descriptor: &ErrorDescriptor) -> String {
    let title = format!("{} {}", descriptor.status_code, descriptor.status_text);
    let mut body = format!("<p>{}</p>\n", escape(&descriptor.message));
    if let Some(archived) = descriptor.detail.get("broken_report").and_then(|v| v.as_str()) {
        body.push_str(&format!(
            "<p>The partially executed report was saved to <code>{}</code>.</p>\n",
            escape(archived)
        ));
    }
    if let Some(location) = descriptor.detail.get("notebook_path").and_then(|v| v.as_str()) {
        body.push_str(&format!(
            "<p>Open it from your notebook server at <code>{}</code>.</p>\n",
            escape(location)
        ));
    }
    let detail = serde_json::to_string_pretty(&descriptor.detail)
        .unwrap_or_else(|_| descriptor.detail.to_string());
    body.push_str(&format!("<pre>{}</pre>\n", escape(&detail)));
    page(&title, &body)
}

/// Wraps a rendered body in the shared page skeleton.
fn page(title: &str, body: &str) -> String {
    let title = escape(title);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}
