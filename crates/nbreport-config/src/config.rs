// nbreport-config/src/config.rs
// ============================================================================
// Module: nbreport Configuration
// Description: Configuration loading and validation for the report service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: nbreport-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! An explicitly requested config file that is missing or invalid fails
//! closed; when no file is requested and the default name is absent, the
//! built-in defaults apply so the service can run against a purely local
//! template tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use nbreport_core::pipeline::INPUT_PLACEHOLDER;
use nbreport_core::pipeline::OUTPUT_DIR_PLACEHOLDER;
use nbreport_core::pipeline::OUTPUT_PLACEHOLDER;
use nbreport_core::pipeline::PARAMETERS_PLACEHOLDER;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "nbreport.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "NBREPORT_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of argv entries in an engine command override.
pub(crate) const MAX_COMMAND_ARGV_LEN: usize = 64;
/// Minimum allowed engine stage timeout in seconds.
pub(crate) const MIN_STAGE_TIMEOUT_SECS: u64 = 1;
/// Maximum allowed engine stage timeout in seconds.
pub(crate) const MAX_STAGE_TIMEOUT_SECS: u64 = 86_400;
/// Default engine stage timeout in seconds.
pub(crate) const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;
/// Default service port.
const DEFAULT_PORT: u16 = 8888;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1";
/// Default template repository root directory.
const DEFAULT_TEMPLATE_ROOT: &str = "/opt/nbreport";
/// Default broken report directory (`USERNAME` substituted per request).
const DEFAULT_BROKEN_DIR: &str = "/home/USERNAME/broken_reports";
/// Default per-user notebook root (`USERNAME` substituted per request).
const DEFAULT_NOTEBOOK_DIR: &str = "/home/USERNAME";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// nbreport service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Template repository configuration.
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Per-user report directory configuration.
    #[serde(default)]
    pub reports: ReportsConfig,
    /// Execution pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ReportConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path` argument, then the `NBREPORT_CONFIG`
    /// environment variable, then `nbreport.toml` in the working directory.
    /// A missing default file yields the built-in defaults; a missing
    /// explicitly requested file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        if !explicit && !resolved.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.templates.validate()?;
        self.reports.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port the service listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address for the listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Header carrying the authenticated username, set by the auth layer in
    /// front of the service. Absent means every request is anonymous.
    #[serde(default)]
    pub user_header: Option<String>,
}

impl ServerConfig {
    /// Validates server settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server bind address must not be empty".to_string()));
        }
        if let Some(header) = &self.user_header {
            if header.is_empty() || !header.bytes().all(is_header_name_byte) {
                return Err(ConfigError::Invalid(
                    "server user_header must be a valid header name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            user_header: None,
        }
    }
}

/// Template repository configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Directory containing the template repository working copy.
    #[serde(default = "default_template_root")]
    pub root_dir: PathBuf,
    /// Template directory relative to `root_dir`.
    #[serde(default = "default_template_dir")]
    pub dir: PathBuf,
    /// Optional git remote URL for the template source.
    #[serde(default)]
    pub git_url: Option<String>,
    /// Optional `user:pass` injected into the remote URL authority.
    #[serde(default)]
    pub git_auth: Option<String>,
}

impl TemplatesConfig {
    /// Validates template repository settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path(&self.root_dir)?;
        if !self.root_dir.is_absolute() {
            return Err(ConfigError::Invalid("templates root_dir must be absolute".to_string()));
        }
        if self.dir.is_absolute() {
            return Err(ConfigError::Invalid("templates dir must be relative".to_string()));
        }
        if self.dir.components().any(|component| matches!(component, Component::ParentDir)) {
            return Err(ConfigError::Invalid(
                "templates dir must not escape the repository root".to_string(),
            ));
        }
        if let Some(auth) = &self.git_auth {
            if self.git_url.is_none() {
                return Err(ConfigError::Invalid(
                    "templates git_auth requires git_url".to_string(),
                ));
            }
            if !auth.contains(':') {
                return Err(ConfigError::Invalid(
                    "templates git_auth must be user:pass".to_string(),
                ));
            }
        }
        // Authority injection only works on URLs with a host part.
        self.effective_git_url()?;
        Ok(())
    }

    /// Returns the remote URL with authentication injected when configured.
    ///
    /// Plain filesystem paths are passed through untouched; `git_auth` is
    /// only supported for remotes that parse as URLs with an authority.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `git_auth` cannot be applied.
    pub fn effective_git_url(&self) -> Result<Option<String>, ConfigError> {
        let Some(remote) = &self.git_url else {
            return Ok(None);
        };
        let Some(auth) = &self.git_auth else {
            return Ok(Some(remote.clone()));
        };
        let mut url = Url::parse(remote)
            .map_err(|_| ConfigError::Invalid("templates git_auth requires a URL remote".to_string()))?;
        let (user, pass) = auth.split_once(':').ok_or_else(|| {
            ConfigError::Invalid("templates git_auth must be user:pass".to_string())
        })?;
        url.set_username(user)
            .and_then(|()| url.set_password(Some(pass)))
            .map_err(|()| {
                ConfigError::Invalid("templates git_url does not accept credentials".to_string())
            })?;
        Ok(Some(url.into()))
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root_dir: default_template_root(),
            dir: default_template_dir(),
            git_url: None,
            git_auth: None,
        }
    }
}

/// Per-user report directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// Directory receiving broken report copies (`USERNAME` substituted).
    #[serde(default = "default_broken_dir")]
    pub broken_dir: String,
    /// Per-user notebook server root (`USERNAME` substituted).
    #[serde(default = "default_notebook_dir")]
    pub notebook_dir: String,
}

impl ReportsConfig {
    /// Validates report directory settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("broken_dir", &self.broken_dir), ("notebook_dir", &self.notebook_dir)] {
            validate_path(Path::new(value))?;
            if !Path::new(value).is_absolute() {
                return Err(ConfigError::Invalid(format!("reports {name} must be absolute")));
            }
        }
        Ok(())
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            broken_dir: DEFAULT_BROKEN_DIR.to_string(),
            notebook_dir: DEFAULT_NOTEBOOK_DIR.to_string(),
        }
    }
}

/// Execution pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Timeout in seconds for the template execution stage.
    #[serde(default = "default_stage_timeout")]
    pub execute_timeout_secs: u64,
    /// Timeout in seconds for the HTML conversion stage.
    #[serde(default = "default_stage_timeout")]
    pub convert_timeout_secs: u64,
    /// Optional argv override for the execution engine.
    #[serde(default)]
    pub execute_command: Option<Vec<String>>,
    /// Optional argv override for the conversion engine.
    #[serde(default)]
    pub convert_command: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Validates pipeline settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("execute_timeout_secs", self.execute_timeout_secs),
            ("convert_timeout_secs", self.convert_timeout_secs),
        ] {
            if !(MIN_STAGE_TIMEOUT_SECS..=MAX_STAGE_TIMEOUT_SECS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "pipeline {name} must be between {MIN_STAGE_TIMEOUT_SECS} and {MAX_STAGE_TIMEOUT_SECS}"
                )));
            }
        }
        if let Some(argv) = &self.execute_command {
            validate_command(argv, "execute_command", &[INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, PARAMETERS_PLACEHOLDER])?;
        }
        if let Some(argv) = &self.convert_command {
            validate_command(argv, "convert_command", &[INPUT_PLACEHOLDER, OUTPUT_DIR_PLACEHOLDER])?;
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            execute_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            convert_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            execute_command: None,
            convert_command: None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem error while reading the config file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Semantic validation failure.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config file path and whether it was explicitly requested.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    match env::var(CONFIG_ENV_VAR) {
        Ok(value) if !value.is_empty() => Ok((PathBuf::from(value), true)),
        _ => Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false)),
    }
}

/// Validates structural path limits shared by all configured paths.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(ConfigError::Invalid("path must not be empty".to_string()));
    }
    if raw.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component exceeds length limit".to_string()));
        }
    }
    if path.to_string_lossy().contains('\0') {
        return Err(ConfigError::Invalid("path must not contain nul bytes".to_string()));
    }
    Ok(())
}

/// Validates an engine argv override and its required placeholders.
fn validate_command(
    argv: &[String],
    name: &str,
    placeholders: &[&str],
) -> Result<(), ConfigError> {
    if argv.is_empty() {
        return Err(ConfigError::Invalid(format!("pipeline {name} must not be empty")));
    }
    if argv.len() > MAX_COMMAND_ARGV_LEN {
        return Err(ConfigError::Invalid(format!("pipeline {name} exceeds argv limit")));
    }
    for placeholder in placeholders {
        if !argv.iter().any(|arg| arg.contains(placeholder)) {
            return Err(ConfigError::Invalid(format!(
                "pipeline {name} must reference {placeholder}"
            )));
        }
    }
    Ok(())
}

/// Returns the default service port.
const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Returns the default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Returns the default template repository root.
fn default_template_root() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATE_ROOT)
}

/// Returns the default template directory relative to the root.
fn default_template_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Returns the default broken report directory template.
fn default_broken_dir() -> String {
    DEFAULT_BROKEN_DIR.to_string()
}

/// Returns the default notebook directory template.
fn default_notebook_dir() -> String {
    DEFAULT_NOTEBOOK_DIR.to_string()
}

/// Returns whether a byte is valid in an HTTP header name.
const fn is_header_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

/// Returns the stage timeout default.
const fn default_stage_timeout() -> u64 {
    DEFAULT_STAGE_TIMEOUT_SECS
}
