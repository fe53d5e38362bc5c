//! # Salt Project Templating
//!
//! Stamps a client's salt project working copy with generated configuration
//! and commits the result. For one client the steps are:
//!
//! 1. Look up the salt project in GitLab (it must already exist).
//! 2. Sync the working copy under `.projects/` (clone or hard reset).
//! 3. Run the public and private template installers ([`installer`]).
//! 4. Rewrite `etc/salt/roster` ([`roster`]).
//! 5. For `salt` clients, rewrite the PKI pillars ([`pillar`]).
//! 6. Commit, and push when asked.

pub mod installer;
pub mod pillar;
pub mod roster;

use crate::config::{ClientRecord, CmKind};
use crate::error::{Error, Result};
use crate::git;
use crate::gitlab::GitLabApi;
use crate::process::CommandRunner;
use std::path::Path;

/// Commit message for templated salt projects
pub const SALT_COMMIT_MESSAGE: &str =
    ".salt-project-template, .salt-project-private-template installed";

/// Applies templates to salt project working copies.
pub struct Templater<'a> {
    api: &'a dyn GitLabApi,
    runner: &'a dyn CommandRunner,
    work_dir: &'a Path,
    gitlab_url: &'a str,
    push: bool,
}

impl<'a> Templater<'a> {
    pub fn new(
        api: &'a dyn GitLabApi,
        runner: &'a dyn CommandRunner,
        work_dir: &'a Path,
        gitlab_url: &'a str,
        push: bool,
    ) -> Self {
        Self {
            api,
            runner,
            work_dir,
            gitlab_url,
            push,
        }
    }

    /// Template the salt project of `client`. Returns whether a commit was
    /// made.
    pub fn template_salt_project(&self, client: &ClientRecord) -> Result<bool> {
        let salt_project = client.salt_project()?;
        let kind = client.configuration_management()?.kind;
        let project = self
            .api
            .get_project(&salt_project.path)?
            .ok_or_else(|| Error::ProjectNotFound {
                path: salt_project.path.clone(),
            })?;
        log::info!(
            "Salt project {} for client {} ssh_url_to_repo: {}, path_with_namespace: {}",
            salt_project.path,
            client.name,
            project.ssh_url_to_repo,
            project.path_with_namespace
        );

        let local_path = git::working_copy_path(self.work_dir, &project.path_with_namespace);
        git::sync_working_copy(self.runner, &local_path, &project.ssh_url_to_repo)?;

        installer::apply_config_template(self.runner, self.work_dir, &local_path, client)?;
        roster::write_roster(&local_path, client)?;
        if kind == CmKind::Salt {
            pillar::write_pillars(&local_path, client, self.gitlab_url, &project)?;
        }

        git::commit_and_push(self.runner, &local_path, SALT_COMMIT_MESSAGE, self.push)
    }
}
