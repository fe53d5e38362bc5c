//! # GitLab Project Provisioning
//!
//! Ensures that each client's salt and admin projects exist and carry the
//! expected settings. The model is "create if missing, then overwrite
//! settings": there is no retry policy and no rollback, but every
//! additive step (sharing, deploy keys, protected tags, runners, variables)
//! checks existing state first, so a second run against an unchanged remote
//! creates nothing new.
//!
//! In dry-run mode all reads still happen, and their errors still abort the
//! run, but nothing is created or changed. When the project does not exist
//! yet, dry-run has no handle to apply settings to and skips that step.

use crate::config::{AccountingConfig, ClientRecord};
use crate::error::{Error, Result};
use crate::gitlab::{GitLabApi, NewFile, Project, ProjectSettings, VariableSpec, MAINTAINER_ACCESS};
use std::collections::{BTreeMap, BTreeSet};

/// Protected tag pattern on salt projects
pub const RUN_TAG_PATTERN: &str = "run_*";

/// Build timeout for salt projects, in seconds
pub const SALT_BUILD_TIMEOUT: u64 = 86400;

/// CI variables copied from the client record onto the salt project
pub const SALT_PROJECT_VARIABLES: [&str; 2] = ["SALTSSH_ROOT_ED25519_PRIV", "SALTSSH_ROOT_ED25519_PUB"];

/// What to do when a project has to be created
#[derive(Debug, Clone, Default)]
pub struct CreationDefaults {
    /// File committed right after creation, if any
    pub initial_file: Option<NewFile>,
}

/// Applies project state through a [`GitLabApi`].
pub struct Provisioner<'a> {
    api: &'a dyn GitLabApi,
    config: &'a AccountingConfig,
    dry_run: bool,
}

/// Split `group/name`. Both parts must be non-empty and the name may not
/// contain further slashes.
pub fn split_project_path(path: &str) -> Result<(&str, &str)> {
    match path.split_once('/') {
        Some((group, name)) if !group.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((group, name))
        }
        _ => Err(Error::Config {
            message: format!("project path {} is not of the form group/name", path),
            hint: None,
        }),
    }
}

pub fn salt_project_description(client: &ClientRecord) -> String {
    format!("{} Salt Masters /srv", client.name)
}

pub fn admin_project_description(client: &ClientRecord) -> String {
    format!("{} Server Administration", client.name)
}

impl<'a> Provisioner<'a> {
    pub fn new(api: &'a dyn GitLabApi, config: &'a AccountingConfig, dry_run: bool) -> Self {
        Self {
            api,
            config,
            dry_run,
        }
    }

    /// Id of the group whose full path is exactly `group`.
    pub fn resolve_group(&self, group: &str) -> Result<u64> {
        self.api
            .search_groups(group)?
            .into_iter()
            .find(|g| g.full_path == group)
            .map(|g| g.id)
            .ok_or_else(|| Error::GroupNotFound {
                group: group.to_string(),
            })
    }

    /// Look up `path`, creating it (and its initial file) when missing.
    ///
    /// Returns `None` only in dry-run mode when the project does not exist.
    pub fn ensure_project(
        &self,
        path: &str,
        defaults: &CreationDefaults,
    ) -> Result<Option<Project>> {
        if let Some(project) = self.api.get_project(path)? {
            return Ok(Some(project));
        }
        log::info!("Project {} not found, creating", path);
        let (group, name) = split_project_path(path)?;
        let group_id = self.resolve_group(group)?;
        if self.dry_run {
            log::info!(
                "Dry run: would create project {} in group {} ({})",
                name,
                group,
                group_id
            );
            return Ok(None);
        }
        let project = self.api.create_project(name, group_id)?;
        if let Some(file) = &defaults.initial_file {
            self.api.create_file(project.id, file)?;
        }
        Ok(Some(project))
    }

    fn salt_creation_defaults(&self, client: &ClientRecord) -> CreationDefaults {
        let author = &self.config.gitlab.salt_project;
        CreationDefaults {
            initial_file: Some(NewFile {
                file_path: "README.md".to_string(),
                branch: crate::git::DEFAULT_BRANCH.to_string(),
                content: salt_project_description(client),
                author_email: author.author_email.clone(),
                author_name: author.author_name.clone(),
                commit_message: "Initial commit".to_string(),
            }),
        }
    }

    /// Ensure the client's salt project exists and apply its settings.
    ///
    /// Clients without `gitlab.salt_project` are skipped.
    pub fn setup_salt_project(&self, client: &ClientRecord) -> Result<Option<Project>> {
        let Some(salt_project) = client.gitlab.salt_project.as_ref() else {
            log::info!("Client {} has no salt project, skipping", client.name);
            return Ok(None);
        };
        log::info!(
            "Checking salt project {} for client {}",
            salt_project.path,
            client.name
        );
        let project =
            self.ensure_project(&salt_project.path, &self.salt_creation_defaults(client))?;
        let Some(project) = project else {
            return Ok(None);
        };
        let project = if self.dry_run {
            project
        } else {
            self.apply_salt_project_settings(&project, client)?
        };

        log::info!(
            "Salt project {} for client {} settings:\n{:#?}",
            salt_project.path,
            client.name,
            project
        );
        log::info!(
            "Salt project {} for client {} deploy keys:\n{:#?}",
            salt_project.path,
            client.name,
            self.api.list_deploy_keys(project.id)?
        );
        log::info!(
            "Salt project {} for client {} protected tags:\n{:#?}",
            salt_project.path,
            client.name,
            self.api.list_protected_tags(project.id)?
        );
        Ok(Some(project))
    }

    /// Apply salt project settings to an existing project.
    pub fn apply_salt_project_settings(
        &self,
        project: &Project,
        client: &ClientRecord,
    ) -> Result<Project> {
        let salt_project = client.salt_project()?;
        let settings = ProjectSettings {
            description: Some(salt_project_description(client)),
            visibility: Some("private".to_string()),
            shared_runners_enabled: Some(false),
            only_allow_merge_if_pipeline_succeeds: Some(true),
            only_allow_merge_if_all_discussions_are_resolved: Some(true),
            resolve_outdated_diff_discussions: Some(true),
            build_timeout: Some(SALT_BUILD_TIMEOUT),
        };

        // Maintainer group
        let group_id = self.config.gitlab.salt_project.maintainers_group_id;
        if !project
            .shared_with_groups
            .iter()
            .any(|g| g.group_id == group_id)
        {
            log::info!("Sharing {} with group {}", project.path_with_namespace, group_id);
            self.api
                .share_project(project.id, group_id, MAINTAINER_ACCESS)?;
        }

        // Deploy keys, deduplicated by title
        let mut titles: BTreeSet<String> = self
            .api
            .list_deploy_keys(project.id)?
            .into_iter()
            .map(|k| k.title)
            .collect();
        for deploy_key in &salt_project.deploy_keys {
            if !titles.insert(deploy_key.title.clone()) {
                continue;
            }
            log::info!(
                "Adding deploy key {} to {}",
                deploy_key.title,
                project.path_with_namespace
            );
            self.api
                .create_deploy_key(project.id, &deploy_key.title, &deploy_key.key)?;
        }

        // Protected tags
        if !self
            .api
            .list_protected_tags(project.id)?
            .iter()
            .any(|t| t.name == RUN_TAG_PATTERN)
        {
            self.api
                .protect_tag(project.id, RUN_TAG_PATTERN, MAINTAINER_ACCESS)?;
        }

        // Runners
        if let Some(runners) = &salt_project.runners {
            let attached = self.api.list_project_runners(project.id)?;
            for runner in self.api.list_runners()? {
                let Some(description) = runner.description.as_deref() else {
                    continue;
                };
                if !runners.contains(description) {
                    continue;
                }
                if attached
                    .iter()
                    .any(|r| r.description.as_deref() == Some(description))
                {
                    continue;
                }
                log::info!(
                    "Enabling runner {} ({}) on {}",
                    description,
                    runner.id,
                    project.path_with_namespace
                );
                self.api.enable_project_runner(project.id, runner.id)?;
            }
        }

        // Variables
        if let Some(variables) = &salt_project.variables {
            self.apply_variables(project, variables)?;
        }

        self.api.update_project(project.id, &settings)
    }

    fn apply_variables(
        &self,
        project: &Project,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        let existing = self.api.list_variables(project.id)?;
        for key in SALT_PROJECT_VARIABLES {
            let Some(value) = values.get(key) else {
                continue;
            };
            let spec = VariableSpec {
                key: key.to_string(),
                value: value.clone(),
                protected: true,
                masked: false,
                environment_scope: "*".to_string(),
            };
            let present = existing
                .iter()
                .any(|v| v.key == key && v.environment_scope.as_deref() == Some("*"));
            let result = if present {
                log::info!("Updating variable {} on {}", key, project.path_with_namespace);
                self.api.update_variable(&project.path_with_namespace, &spec)
            } else {
                log::info!("Creating variable {} on {}", key, project.path_with_namespace);
                self.api.create_variable(&project.path_with_namespace, &spec)
            };
            if let Err(e) = result {
                log::error!(
                    "Setting variable {} on {} failed: {}",
                    key,
                    project.path_with_namespace,
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Ensure the client's admin project exists and apply its settings.
    pub fn setup_admin_project(&self, client: &ClientRecord) -> Result<Option<Project>> {
        let admin_project = client.admin_project()?;
        log::info!(
            "Checking admin project {} for client {}",
            admin_project.path,
            client.name
        );
        let Some(project) =
            self.ensure_project(&admin_project.path, &CreationDefaults::default())?
        else {
            return Ok(None);
        };
        let project = if self.dry_run {
            project
        } else {
            self.apply_admin_project_settings(&project, client)?
        };
        log::info!(
            "Admin project {} for client {} settings:\n{:#?}",
            admin_project.path,
            client.name,
            project
        );
        Ok(Some(project))
    }

    /// Description and visibility only.
    pub fn apply_admin_project_settings(
        &self,
        project: &Project,
        client: &ClientRecord,
    ) -> Result<Project> {
        let settings = ProjectSettings {
            description: Some(admin_project_description(client)),
            visibility: Some("private".to_string()),
            ..Default::default()
        };
        self.api.update_project(project.id, &settings)
    }

    /// Salt project, then admin project, for one client.
    pub fn setup_client(&self, client: &ClientRecord) -> Result<()> {
        self.setup_salt_project(client)?;
        self.setup_admin_project(client)?;
        Ok(())
    }
}
