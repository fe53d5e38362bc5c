//! # Error Handling
//!
//! This module defines the centralized error type for `acc-projects`. It uses
//! the `thiserror` library to describe every failure the provisioning run can
//! hit, with enough context (dotted config key, host, command, HTTP status) to
//! act on the message without reading the code.
//!
//! ## Taxonomy
//!
//! - **Configuration**: missing or malformed `accounting.yaml` / client YAML,
//!   or a required nested key that an operation needs but the record lacks.
//! - **Remote lookup**: a project or group that does not exist in GitLab.
//!   A missing project is recovered by the create path; a missing group is
//!   fatal.
//! - **Validation**: malformed key material in a client record.
//! - **External process**: a non-zero exit from `git` or an installer script,
//!   carrying the captured stdout and stderr.
//! - **GitLab API**: a non-success HTTP response.
//!
//! Every error is fatal for the run: the binary logs it and exits with
//! status 1. There is no partial-success reporting across clients.

use thiserror::Error;

/// Main error type for acc-projects operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration file is missing, malformed, or lacks a key that the
    /// requested operation needs.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A project lookup by `group/name` path returned nothing.
    #[error("GitLab project not found: {path}")]
    ProjectNotFound { path: String },

    /// No group with the exact full path exists. Groups are never created.
    #[error("GitLab group not found: {group}")]
    GroupNotFound { group: String },

    /// Key material in a client record failed validation.
    #[error("Validation error for {host}: {message}")]
    Validation { host: String, message: String },

    /// An external command exited unsuccessfully.
    #[error("Command failed ({status}): {command}{}", format_streams(stdout, stderr))]
    ExternalProcess {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// GitLab answered with a non-success status.
    #[error("GitLab API error: {method} {url} returned {status}: {body}")]
    GitLabApi {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport-level HTTP error, wrapped from `reqwest::Error`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A directory entry could not be read while expanding a glob.
    #[error("Glob iteration error: {0}")]
    GlobIter(#[from] glob::GlobError),
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Configuration error for a dotted key path the record does not carry.
    pub fn missing_key(client: &str, key: &str) -> Self {
        Error::Config {
            message: format!("client {} is missing required key {}", client, key),
            hint: Some(format!("add '{}' to the client YAML", key)),
        }
    }
}

fn format_streams(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str(&format!("\n  stdout: {}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        out.push_str(&format!("\n  stderr: {}", stderr.trim_end()));
    }
    out
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
