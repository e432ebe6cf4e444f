// nbreport-core/src/pipeline.rs
// ============================================================================
// Module: Execution Pipeline
// Description: Two-stage report generation with isolated scratch space.
// Purpose: Execute a template with coerced parameters, convert the result to
//          HTML, and preserve the partial document on failure.
// Dependencies: tempfile, tokio, crate::{archive, command, error, identity,
//               params}
// ============================================================================

//! ## Overview
//! Each request runs in a private scratch directory: the coerced parameters
//! file is written there, the execution engine produces the output document
//! there, and the conversion engine renders the HTML there. Both stages are
//! external processes, impersonated when the acting user is a real OS
//! account and bounded by configurable timeouts. On failure of either stage
//! the partial output document — when one exists — is archived before the
//! error surfaces; there is no retry. The handoff between the stages is the
//! typed [`StageArtifact`], not a filename convention.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use crate::archive::BrokenReportArchive;
use crate::command::CommandSpec;
use crate::command::run_command;
use crate::error::ReportError;
use crate::identity::ActingUser;
use crate::params::coerce_parameters;
use crate::params::write_parameters_file;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder for the parameters file path in engine argv templates.
pub const PARAMETERS_PLACEHOLDER: &str = "{parameters}";
/// Placeholder for the input document path in engine argv templates.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder for the output document path in engine argv templates.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder for the scratch directory path in engine argv templates.
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";
/// Scratch directory mode: writable by the service and by any impersonated
/// request user.
const SCRATCH_DIR_MODE: u32 = 0o707;

/// Returns the default execution engine argv.
#[must_use]
pub fn default_execute_command() -> Vec<String> {
    [
        "python3",
        "-m",
        "papermill",
        "--no-progress-bar",
        "--request-save-on-cell-execute",
        "--parameters_file",
        PARAMETERS_PLACEHOLDER,
        INPUT_PLACEHOLDER,
        OUTPUT_PLACEHOLDER,
    ]
    .map(String::from)
    .to_vec()
}

/// Returns the default conversion engine argv.
#[must_use]
pub fn default_convert_command() -> Vec<String> {
    ["python3", "-m", "nbconvert", "--to=html", "--output-dir", OUTPUT_DIR_PLACEHOLDER, INPUT_PLACEHOLDER]
        .map(String::from)
        .to_vec()
}

// ============================================================================
// SECTION: Pipeline Types
// ============================================================================

/// One report execution request.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Absolute path of the template to execute.
    pub template_path: PathBuf,
    /// Raw request parameters in arrival order, duplicates included.
    pub raw_parameters: Vec<(String, String)>,
    /// The user the request acts as.
    pub user: ActingUser,
}

/// Format tag of a pipeline stage artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Executed notebook document.
    Notebook,
    /// Rendered HTML document.
    Html,
}

/// Typed handoff between pipeline stages: a resolved path with its format.
#[derive(Debug, Clone)]
pub struct StageArtifact {
    /// Location of the artifact inside the scratch directory.
    pub path: PathBuf,
    /// Format of the artifact.
    pub format: ArtifactFormat,
}

/// A successfully rendered report.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    /// Rendered HTML contents.
    pub html: String,
}

/// Engine argv template with placeholder substitution.
#[derive(Debug, Clone)]
struct StageCommand {
    /// Argv template; `argv[0]` is the program.
    argv: Vec<String>,
}

impl StageCommand {
    /// Renders the argv with the given placeholder bindings.
    fn render(&self, bindings: &[(&str, &str)]) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                let mut rendered = arg.clone();
                for (placeholder, value) in bindings {
                    rendered = rendered.replace(placeholder, value);
                }
                rendered
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Two-stage report execution pipeline.
#[derive(Debug, Clone)]
pub struct ReportPipeline {
    /// Execution engine argv template.
    execute: StageCommand,
    /// Conversion engine argv template.
    convert: StageCommand,
    /// Execution stage timeout.
    execute_timeout: Duration,
    /// Conversion stage timeout.
    convert_timeout: Duration,
    /// Archive receiving partial documents of failed runs.
    archive: BrokenReportArchive,
}

impl ReportPipeline {
    /// Creates a pipeline from engine argv templates and stage timeouts.
    #[must_use]
    pub const fn new(
        execute_argv: Vec<String>,
        convert_argv: Vec<String>,
        execute_timeout: Duration,
        convert_timeout: Duration,
        archive: BrokenReportArchive,
    ) -> Self {
        Self {
            execute: StageCommand {
                argv: execute_argv,
            },
            convert: StageCommand {
                argv: convert_argv,
            },
            execute_timeout,
            convert_timeout,
            archive,
        }
    }

    /// Runs a template to a rendered HTML report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::TemplateNotFound`] when the template is
    /// missing, [`ReportError::Execution`] or [`ReportError::Conversion`]
    /// when an engine stage fails or times out (with the partial document
    /// archived when it exists), and [`ReportError::Unexpected`] for
    /// scratch-space faults.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<RenderedReport, ReportError> {
        if !request.template_path.exists() {
            return Err(ReportError::TemplateNotFound(request.template_path.clone()));
        }
        let scratch = prepare_scratch_dir()?;
        let parameters = coerce_parameters(&request.raw_parameters);
        let parameters_file = write_parameters_file(scratch.path(), &parameters)
            .await
            .map_err(|err| ReportError::Unexpected(format!("parameters file: {err}")))?;

        let executed = self.run_stage(&request.template_path, &parameters_file, scratch.path(), request).await?;
        let rendered = self.convert_stage(&executed, scratch.path(), request).await?;
        let html = tokio::fs::read_to_string(&rendered.path)
            .await
            .map_err(|err| ReportError::Unexpected(format!("rendered report: {err}")))?;
        Ok(RenderedReport {
            html,
        })
    }

    /// Stage 1: executes the template with the parameters file.
    async fn run_stage(
        &self,
        template: &Path,
        parameters_file: &Path,
        scratch: &Path,
        request: &ExecutionRequest,
    ) -> Result<StageArtifact, ReportError> {
        let output = scratch.join(template.file_name().unwrap_or_else(|| OsStr::new("report.ipynb")));
        let argv = self.execute.render(&[
            (PARAMETERS_PLACEHOLDER, &parameters_file.to_string_lossy()),
            (INPUT_PLACEHOLDER, &template.to_string_lossy()),
            (OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
        ]);
        let spec = CommandSpec::new(argv)
            .cwd(scratch.to_path_buf())
            .run_as(request.user.account().cloned())
            .timeout(self.execute_timeout);
        match run_command(spec).await {
            Ok(_) => Ok(StageArtifact {
                path: output,
                format: ArtifactFormat::Notebook,
            }),
            Err(source) => {
                let archived = self.archive_partial(&output, &request.user).await;
                Err(ReportError::Execution {
                    source,
                    archived,
                })
            }
        }
    }

    /// Stage 2: converts the executed document to HTML.
    async fn convert_stage(
        &self,
        executed: &StageArtifact,
        scratch: &Path,
        request: &ExecutionRequest,
    ) -> Result<StageArtifact, ReportError> {
        let argv = self.convert.render(&[
            (INPUT_PLACEHOLDER, &executed.path.to_string_lossy()),
            (OUTPUT_DIR_PLACEHOLDER, &scratch.to_string_lossy()),
        ]);
        let spec = CommandSpec::new(argv)
            .cwd(scratch.to_path_buf())
            .run_as(request.user.account().cloned())
            .timeout(self.convert_timeout);
        match run_command(spec).await {
            Ok(_) => Ok(StageArtifact {
                path: executed.path.with_extension("html"),
                format: ArtifactFormat::Html,
            }),
            Err(source) => {
                let archived = self.archive_partial(&executed.path, &request.user).await;
                Err(ReportError::Conversion {
                    source,
                    archived,
                })
            }
        }
    }

    /// Archives the partial output document when it exists on disk.
    async fn archive_partial(&self, document: &Path, user: &ActingUser) -> Option<PathBuf> {
        if !document.exists() {
            return None;
        }
        match self.archive.archive(document, user).await {
            Ok(record) => Some(record.path),
            Err(err) => {
                tracing::warn!(
                    document = %document.display(),
                    error = %err,
                    "failed to archive broken report"
                );
                None
            }
        }
    }
}

/// Allocates the request-scoped scratch directory.
fn prepare_scratch_dir() -> Result<TempDir, ReportError> {
    let scratch =
        TempDir::new().map_err(|err| ReportError::Unexpected(format!("scratch dir: {err}")))?;
    // The impersonated request user must be able to write into the scratch
    // directory.
    std::fs::set_permissions(scratch.path(), std::fs::Permissions::from_mode(SCRATCH_DIR_MODE))
        .map_err(|err| ReportError::Unexpected(format!("scratch dir mode: {err}")))?;
    Ok(scratch)
}
