//! Template catalog tests for nbreport-core.
// crates/nbreport-core/tests/catalog_introspection.rs
// =============================================================================
// Module: Catalog Introspection Tests
// Description: Validate template discovery and parameter cell parsing.
// Purpose: Ensure the catalog lists templates and isolates broken ones.
// =============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions on tempdir fixtures."
)]

use std::fs;
use std::path::Path;

use nbreport_core::catalog::introspect;
use nbreport_core::list_templates;
use serde_json::json;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn write_notebook(dir: &Path, name: &str, parameter_source: &str) -> Result<(), String> {
    let notebook = json!({
        "cells": [
            {
                "cell_type": "markdown",
                "metadata": {},
                "source": "# A report"
            },
            {
                "cell_type": "code",
                "metadata": { "tags": ["parameters"] },
                "source": parameter_source
            }
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    });
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    fs::write(&path, notebook.to_string()).map_err(|err| err.to_string())
}

#[test]
fn nested_templates_list_with_posix_relative_paths() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(dir.path(), "daily.ipynb", "fruit = 'apple'\n")?;
    write_notebook(dir.path(), "finance/weekly.ipynb", "count = 4\n")?;
    fs::write(dir.path().join("notes.txt"), "ignored").map_err(|err| err.to_string())?;

    let templates = list_templates(dir.path()).map_err(|err| err.to_string())?;
    let paths: Vec<&str> = templates.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths, vec!["daily.ipynb", "finance/weekly.ipynb"]);
    Ok(())
}

#[test]
fn parameter_cell_lines_yield_specs() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(
        dir.path(),
        "report.ipynb",
        "fruit = 'cherry'  # which fruit to report on\ncount: int = 4\nratio = 0.5\n",
    )?;

    let specs = introspect(&dir.path().join("report.ipynb")).map_err(|err| err.to_string())?;
    assert_eq!(specs.len(), 3);

    assert_eq!(specs[0].name, "fruit");
    assert_eq!(specs[0].default, "'cherry'");
    assert_eq!(specs[0].inferred_type_name, "str");
    assert_eq!(specs[0].help, "which fruit to report on");

    assert_eq!(specs[1].name, "count");
    assert_eq!(specs[1].default, "4");
    assert_eq!(specs[1].inferred_type_name, "int");
    assert_eq!(specs[1].help, "");

    assert_eq!(specs[2].name, "ratio");
    assert_eq!(specs[2].inferred_type_name, "float");
    Ok(())
}

#[test]
fn annotation_overrides_inferred_type() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(dir.path(), "typed.ipynb", "day: str = 'monday'\n")?;
    let specs = introspect(&dir.path().join("typed.ipynb")).map_err(|err| err.to_string())?;
    assert_eq!(specs[0].inferred_type_name, "str");
    assert_eq!(specs[0].default, "'monday'");
    Ok(())
}

#[test]
fn non_literal_default_reports_none_type() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(dir.path(), "dynamic.ipynb", "today = datetime.now()\n")?;
    let specs = introspect(&dir.path().join("dynamic.ipynb")).map_err(|err| err.to_string())?;
    assert_eq!(specs[0].name, "today");
    assert_eq!(specs[0].default, "datetime.now()");
    assert_eq!(specs[0].inferred_type_name, "None");
    Ok(())
}

#[test]
fn comparison_lines_are_not_declarations() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(dir.path(), "cmp.ipynb", "x == 4\ny = 2\n")?;
    let specs = introspect(&dir.path().join("cmp.ipynb")).map_err(|err| err.to_string())?;
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name, "y");
    Ok(())
}

#[test]
fn template_without_parameter_cell_lists_empty() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let notebook = json!({
        "cells": [{ "cell_type": "code", "metadata": {}, "source": "print(1)" }],
        "nbformat": 4
    });
    fs::write(dir.path().join("plain.ipynb"), notebook.to_string())
        .map_err(|err| err.to_string())?;
    let templates = list_templates(dir.path()).map_err(|err| err.to_string())?;
    assert_eq!(templates.len(), 1);
    assert!(templates[0].parameters.is_empty());
    Ok(())
}

#[test]
fn malformed_template_stays_listed_with_empty_parameters() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    write_notebook(dir.path(), "good.ipynb", "fruit = 'apple'\n")?;
    fs::write(dir.path().join("broken.ipynb"), "this is not json")
        .map_err(|err| err.to_string())?;

    let templates = list_templates(dir.path()).map_err(|err| err.to_string())?;
    assert_eq!(templates.len(), 2);
    let broken = templates.iter().find(|t| t.path == "broken.ipynb").ok_or("broken missing")?;
    assert!(broken.parameters.is_empty());
    let good = templates.iter().find(|t| t.path == "good.ipynb").ok_or("good missing")?;
    assert_eq!(good.parameters.len(), 1);
    Ok(())
}

#[test]
fn list_source_cells_are_joined_before_parsing() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let notebook = json!({
        "cells": [{
            "cell_type": "code",
            "metadata": { "tags": ["parameters"] },
            "source": ["fruit = 'kiwi'\n", "count = 2\n"]
        }],
        "nbformat": 4
    });
    fs::write(dir.path().join("lines.ipynb"), notebook.to_string())
        .map_err(|err| err.to_string())?;
    let specs = introspect(&dir.path().join("lines.ipynb")).map_err(|err| err.to_string())?;
    assert_eq!(specs.len(), 2);
    Ok(())
}
