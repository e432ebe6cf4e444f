// nbreport-server/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: axum router, handlers, and shared application state.
// Purpose: Expose the picker page, the template catalog API, and report
//          execution over HTTP.
// Dependencies: axum, nbreport-config, nbreport-core, serde_json, tokio,
//               url, crate::render
// ============================================================================

//! ## Overview
//! Four routes: `GET /` renders the template picker, `GET /api/templates`
//! returns the catalog as JSON, `POST /` turns a picker form submission into
//! a redirect, and `GET /{*path}` executes a template and returns its
//! rendered HTML. The picker and the API sync the working copy first and
//! fail when the sync fails; execution treats a sync failure as a warning
//! and proceeds against the last synchronized tree, so a flaky remote
//! degrades freshness instead of availability. Failures are normalized
//! through [`ReportError::describe`] and rendered as HTML or JSON depending
//! on the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Component;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Form;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Json;
use axum::response::Response;
use axum::routing::get;
use nbreport_config::ReportConfig;
use nbreport_core::ActingUser;
use nbreport_core::ErrorDescriptor;
use nbreport_core::ReportError;
use nbreport_core::RepositorySynchronizer;
use nbreport_core::TemplateDescriptor;
use nbreport_core::archive::BrokenReportArchive;
use nbreport_core::catalog::list_templates;
use nbreport_core::pipeline::ExecutionRequest;
use nbreport_core::pipeline::ReportPipeline;
use nbreport_core::pipeline::default_convert_command;
use nbreport_core::pipeline::default_execute_command;
use nbreport_core::substitute_username;
use serde_json::json;
use thiserror::Error;

use crate::render;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File extension a runnable report path must carry.
const REPORT_EXTENSION: &str = ".ipynb";
/// Form field naming the selected template path.
const PATH_FIELD: &str = "path";
/// Prefix of form fields carrying parameter values.
const PARAM_FIELD_PREFIX: &str = "root[";

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Template working copy synchronizer.
    pub synchronizer: Arc<RepositorySynchronizer>,
    /// Two-stage execution pipeline.
    pub pipeline: Arc<ReportPipeline>,
    /// Header carrying the authenticated username, when auth is configured.
    pub user_header: Option<String>,
    /// Per-user notebook server root (`USERNAME` substituted).
    pub notebook_dir: String,
}

impl AppState {
    /// Builds the application state from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the git remote cannot be assembled.
    pub fn from_config(config: &ReportConfig) -> Result<Self, ServerError> {
        let remote = config
            .templates
            .effective_git_url()
            .map_err(|err| ServerError::Config(err.to_string()))?;
        let synchronizer = RepositorySynchronizer::new(
            config.templates.root_dir.clone(),
            config.templates.dir.clone(),
            remote,
        );
        let archive = BrokenReportArchive::new(config.reports.broken_dir.clone());
        let pipeline = ReportPipeline::new(
            config.pipeline.execute_command.clone().unwrap_or_else(default_execute_command),
            config.pipeline.convert_command.clone().unwrap_or_else(default_convert_command),
            Duration::from_secs(config.pipeline.execute_timeout_secs),
            Duration::from_secs(config.pipeline.convert_timeout_secs),
            archive,
        );
        Ok(Self {
            synchronizer: Arc::new(synchronizer),
            pipeline: Arc::new(pipeline),
            user_header: config.server.user_header.clone(),
            notebook_dir: config.reports.notebook_dir.clone(),
        })
    }

    /// Resolves the acting user from the configured auth header.
    fn acting_user(&self, headers: &HeaderMap) -> Result<ActingUser, ReportError> {
        let username = self
            .user_header
            .as_ref()
            .and_then(|name| headers.get(name))
            .and_then(|value| value.to_str().ok());
        Ok(ActingUser::resolve(username)?)
    }

    /// Rewrites an archived report path relative to the acting user's
    /// notebook root, when the archive landed inside it.
    fn notebook_relative(&self, archived: &Path, user: &ActingUser) -> Option<String> {
        let home = substitute_username(&self.notebook_dir, user.username());
        archived
            .strip_prefix(&home)
            .ok()
            .map(|relative| relative.to_string_lossy().into_owned())
    }
}

// ============================================================================
// SECTION: Router and Serving
// ============================================================================

/// Builds the service router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(launch))
        .route("/api/templates", get(api_templates))
        .route("/{*path}", get(run_report))
        .with_state(state)
}

/// Serves the router on the configured bind address.
///
/// An initial sync is spawned before the listener starts so the first
/// request usually finds a warm working copy.
///
/// # Errors
///
/// Returns [`ServerError`] when the bind address is invalid, the listener
/// cannot bind, or the server loop fails.
pub async fn serve(config: &ReportConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(config)?;
    let warmup = Arc::clone(&state.synchronizer);
    tokio::spawn(async move {
        if let Err(err) = warmup.sync().await {
            tracing::warn!(error = %err, "initial template sync failed");
        }
    });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|_| ServerError::Config("invalid bind address".to_string()))?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::Transport(format!("bind failed: {err}")))?;
    tracing::info!(%addr, "nbreport listening");
    axum::serve(listener, app)
        .await
        .map_err(|err| ServerError::Transport(format!("server failed: {err}")))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /` — sync, list templates, render the picker page.
async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match catalog(&state).await {
        Ok(templates) => Html(render::picker_page(&templates)).into_response(),
        Err(err) => error_response(&headers, &err),
    }
}

/// `GET /api/templates` — sync, list templates, return the catalog as JSON.
async fn api_templates(State(state): State<AppState>) -> Response {
    match catalog(&state).await {
        Ok(templates) => Json(json!({ "templates": templates })).into_response(),
        Err(err) => json_error(&err),
    }
}

/// Syncs the working copy and lists its templates.
///
/// The directory walk is blocking filesystem work, so it runs on the
/// blocking pool instead of a runtime worker.
async fn catalog(state: &AppState) -> Result<Vec<TemplateDescriptor>, ReportError> {
    state.synchronizer.sync().await?;
    let dir = state.synchronizer.template_dir();
    let templates = tokio::task::spawn_blocking(move || list_templates(&dir))
        .await
        .map_err(|err| ReportError::Unexpected(format!("catalog task failed: {err}")))??;
    Ok(templates)
}

/// `POST /` — turn a picker form submission into a parameterized redirect.
///
/// Empty parameter values are dropped so untouched form fields do not
/// override template defaults.
async fn launch(Form(fields): Form<Vec<(String, String)>>) -> Response {
    let Some(path) = fields
        .iter()
        .find(|(name, _)| name == PATH_FIELD)
        .map(|(_, value)| value.clone())
    else {
        return (StatusCode::BAD_REQUEST, "missing template path").into_response();
    };
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (name, value) in &fields {
        let Some(parameter) =
            name.strip_prefix(PARAM_FIELD_PREFIX).and_then(|rest| rest.strip_suffix(']'))
        else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        query.append_pair(parameter, value);
        any = true;
    }
    let target = if any { format!("{path}?{}", query.finish()) } else { path };
    (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
}

/// `GET /{*path}` — execute a template and return the rendered HTML.
async fn run_report(
    State(state): State<AppState>,
    axum::extract::Path(path): axum::extract::Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if !path.ends_with(REPORT_EXTENSION) || !is_safe_relative_path(&path) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    // Freshness degrades before availability does.
    if let Err(err) = state.synchronizer.sync().await {
        tracing::warn!(error = %err, "template sync failed, executing against current tree");
    }
    let template_path = state.synchronizer.template_dir().join(&path);
    let user = match state.acting_user(&headers) {
        Ok(user) => user,
        Err(err) => return error_response(&headers, &err),
    };
    let raw_parameters = parse_query_pairs(query.as_deref());
    let request = ExecutionRequest {
        template_path,
        raw_parameters,
        user,
    };
    match state.pipeline.execute(&request).await {
        Ok(report) => Html(report.html).into_response(),
        Err(err) => {
            tracing::error!(template = %path, error = %err, "report execution failed");
            let mut descriptor = err.describe();
            if let Some(location) = err
                .archived()
                .and_then(|archived| state.notebook_relative(archived, &request.user))
                && let Some(detail) = descriptor.detail.as_object_mut()
            {
                detail.insert("notebook_path".to_string(), json!(location));
            }
            descriptor_response(&headers, descriptor)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns whether a request path stays inside the template directory.
fn is_safe_relative_path(path: &str) -> bool {
    Path::new(path).components().all(|component| matches!(component, Component::Normal(_)))
}

/// Parses a raw query string into ordered pairs, duplicates preserved.
fn parse_query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query.map_or_else(Vec::new, |raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect()
    })
}

/// Renders an error as JSON or HTML depending on the caller's accept header.
fn error_response(headers: &HeaderMap, err: &ReportError) -> Response {
    descriptor_response(headers, err.describe())
}

/// Renders a normalized descriptor as JSON or HTML per the accept header.
fn descriptor_response(headers: &HeaderMap, descriptor: ErrorDescriptor) -> Response {
    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));
    let status = StatusCode::from_u16(descriptor.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if wants_json {
        (status, Json(descriptor)).into_response()
    } else {
        (status, Html(render::error_page(&descriptor))).into_response()
    }
}

/// Renders an error as the JSON descriptor body.
fn json_error(err: &ReportError) -> Response {
    let descriptor = err.describe();
    let status = StatusCode::from_u16(descriptor.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(descriptor)).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server construction and serving errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be turned into a runnable server.
    #[error("server config error: {0}")]
    Config(String),
    /// The listener or the serve loop failed.
    #[error("server transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests;
