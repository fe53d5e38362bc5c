//! # CLI Command Implementations
//!
//! This module contains the implementation for each action of the
//! `acc-projects` command-line tool, one file per action family.
//!
//! ## Structure
//!
//! Every action shares the modifiers in [`GlobalArgs`] (selection lists,
//! dry-run, push, directories and the GitLab token) and optionally takes a
//! single client name through [`ClientArgs`]. Each command module exposes an
//! `execute` function that loads the run context, builds the selection
//! criteria and calls into the `acc_projects` library.

pub mod setup;
pub mod template;
pub mod wiki;

use anyhow::{Context as _, Result};
use clap::Args;
use std::env;
use std::path::PathBuf;

use acc_projects::context::{
    require_token, Context, RunOptions, DEFAULT_LOG_DIR, DEFAULT_WORK_DIR, TOKEN_ENV,
};
use acc_projects::gitlab::GitLabClient;
use acc_projects::selection::{ClientFilter, SelectionCriteria};

/// Client names given as a JSON array on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientList(pub Vec<String>);

/// Parse a JSON array of client names, e.g. `["acme", "beta"]`.
pub fn parse_client_list(value: &str) -> std::result::Result<ClientList, String> {
    serde_json::from_str::<Vec<String>>(value)
        .map(ClientList)
        .map_err(|e| format!("expected a JSON array of client names: {}", e))
}

/// Modifiers shared by every action
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Push working copies after committing
    #[arg(long, global = true)]
    pub git_push: bool,

    /// Do not create or change anything in GitLab
    #[arg(long, global = true)]
    pub dry_run_gitlab: bool,

    /// Exclude clients listed in JSON_LIST from all-clients operations
    #[arg(
        long,
        global = true,
        value_name = "JSON_LIST",
        value_parser = parse_client_list,
        conflicts_with = "include_clients"
    )]
    pub exclude_clients: Option<ClientList>,

    /// Only include clients listed in JSON_LIST in all-clients operations
    #[arg(long, global = true, value_name = "JSON_LIST", value_parser = parse_client_list)]
    pub include_clients: Option<ClientList>,

    /// Accounting work directory with accounting.yaml and clients/
    #[arg(long, global = true, value_name = "DIR", env = "ACC_WORKDIR", default_value = DEFAULT_WORK_DIR)]
    pub workdir: PathBuf,

    /// Directory for projects.log
    #[arg(long, global = true, value_name = "DIR", env = "ACC_LOGDIR", default_value = DEFAULT_LOG_DIR)]
    pub logdir: PathBuf,
}

impl GlobalArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            git_push: self.git_push,
            dry_run_gitlab: self.dry_run_gitlab,
        }
    }

    pub fn filter(&self) -> ClientFilter {
        match (&self.include_clients, &self.exclude_clients) {
            (Some(ClientList(names)), _) => ClientFilter::include(names),
            (None, Some(ClientList(names))) => ClientFilter::exclude(names),
            (None, None) => ClientFilter::All,
        }
    }

    /// Selection for an action that takes an optional single client.
    pub fn criteria(&self, client: Option<&str>) -> SelectionCriteria {
        match client {
            Some(name) => SelectionCriteria::single(name, self.filter()),
            None => SelectionCriteria::all(self.filter()),
        }
    }

    /// Check the admin token from the environment, then load the run
    /// context from the work directory.
    pub fn load(&self) -> Result<(Context, String)> {
        let token = env::var(TOKEN_ENV).ok();
        self.load_with_token(token.as_deref())
    }

    fn load_with_token(&self, token: Option<&str>) -> Result<(Context, String)> {
        let token = require_token(token)?.to_string();
        let ctx = Context::load(&self.workdir, self.run_options())
            .with_context(|| format!("Failed to load accounting data from {}", self.workdir.display()))?;
        Ok((ctx, token))
    }
}

/// Connect to the GitLab instance named in `accounting.yaml`.
pub fn gitlab_client(ctx: &Context, token: &str) -> Result<GitLabClient> {
    Ok(GitLabClient::new(&ctx.accounting.gitlab.url, token)?)
}

/// Positional client name for single-client actions
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Client name, matched case-insensitively
    #[arg(value_name = "CLIENT")]
    pub client: String,
}
