//! # Run Context
//!
//! One [`Context`] is built per invocation and handed to every operation:
//! it holds the work directory, the loaded `accounting.yaml`, every client
//! record and the run-wide switches. The GitLab session and the command
//! runner are passed alongside it, so tests can substitute fakes for both.
//!
//! Clients are processed one at a time in discovery order. The first error
//! aborts the run and later clients are not touched.

use crate::config::{self, AccountingConfig, ClientRecord};
use crate::error::{Error, Result};
use crate::gitlab::GitLabApi;
use crate::process::CommandRunner;
use crate::provision::Provisioner;
use crate::selection::{select, SelectionCriteria};
use crate::template::Templater;
use crate::wiki::WikiUpdater;
use std::path::{Path, PathBuf};

/// Default for `ACC_WORKDIR`
pub const DEFAULT_WORK_DIR: &str = "/opt/sysadmws/accounting";

/// Default for `ACC_LOGDIR`
pub const DEFAULT_LOG_DIR: &str = "/opt/sysadmws/accounting/log";

/// Environment variable holding the GitLab admin token
pub const TOKEN_ENV: &str = "GL_ADMIN_PRIVATE_TOKEN";

/// Run-wide switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Push working copies after committing
    pub git_push: bool,
    /// Read from GitLab but never create or change anything there
    pub dry_run_gitlab: bool,
}

/// Everything an operation needs besides its remote collaborators
#[derive(Debug, Clone)]
pub struct Context {
    pub work_dir: PathBuf,
    pub accounting: AccountingConfig,
    pub clients: Vec<ClientRecord>,
    pub options: RunOptions,
}

/// The GitLab admin token, or a configuration error when it is unset.
pub fn require_token(token: Option<&str>) -> Result<&str> {
    match token {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(Error::Config {
            message: format!("Env var {} missing", TOKEN_ENV),
            hint: Some(format!("export {} with an admin private token", TOKEN_ENV)),
        }),
    }
}

impl Context {
    /// Load `accounting.yaml` and every client file under `work_dir`.
    pub fn load(work_dir: &Path, options: RunOptions) -> Result<Self> {
        let accounting = config::load_accounting(work_dir)?;
        let clients = config::load_clients(work_dir)?;
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            accounting,
            clients,
            options,
        })
    }

    /// Ensure the salt and admin projects of every selected client.
    /// Returns the number of clients processed.
    pub fn setup_projects(&self, api: &dyn GitLabApi, criteria: &SelectionCriteria) -> Result<usize> {
        let provisioner = Provisioner::new(api, &self.accounting, self.options.dry_run_gitlab);
        let mut processed = 0;
        for client in select(&self.clients, criteria) {
            provisioner.setup_client(client)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Template the salt project of every selected client that has one.
    pub fn template_salt_projects(
        &self,
        api: &dyn GitLabApi,
        runner: &dyn CommandRunner,
        criteria: &SelectionCriteria,
    ) -> Result<usize> {
        let templater = Templater::new(
            api,
            runner,
            &self.work_dir,
            &self.accounting.gitlab.url,
            self.options.git_push,
        );
        let mut processed = 0;
        for client in select(&self.clients, criteria).filter(|c| c.gitlab.salt_project.is_some()) {
            templater.template_salt_project(client)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Update the admin wiki of every selected client that has an admin
    /// project.
    pub fn update_admin_wikis(
        &self,
        api: &dyn GitLabApi,
        runner: &dyn CommandRunner,
        criteria: &SelectionCriteria,
    ) -> Result<usize> {
        let updater = WikiUpdater::new(api, runner, &self.work_dir, self.options.git_push);
        let mut processed = 0;
        for client in select(&self.clients, criteria).filter(|c| c.gitlab.admin_project.is_some()) {
            updater.update_client(client)?;
            processed += 1;
        }
        Ok(processed)
    }
}
