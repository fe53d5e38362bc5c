//! # GitLab API Access
//!
//! This module is the tool's window onto GitLab. It defines the small slice
//! of the REST v4 API the provisioner needs (projects, groups, repository
//! files, sharing, deploy keys, protected tags, runners and CI variables)
//! behind the [`GitLabApi`] trait, plus [`GitLabClient`], the production
//! implementation built on a blocking `reqwest` client.
//!
//! Keeping the API behind a trait lets the provisioner run against an
//! in-memory fake in tests, the same way repository access is mocked.
//!
//! All calls are synchronous. One authenticated client is created per run
//! and reused for every client record.

use crate::error::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// GitLab access level for maintainers
pub const MAINTAINER_ACCESS: u32 = 40;

const PER_PAGE: &str = "100";

/// A project as returned by `GET /projects/:id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    pub ssh_url_to_repo: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub shared_runners_enabled: Option<bool>,
    #[serde(default)]
    pub only_allow_merge_if_pipeline_succeeds: Option<bool>,
    #[serde(default)]
    pub only_allow_merge_if_all_discussions_are_resolved: Option<bool>,
    #[serde(default)]
    pub resolve_outdated_diff_discussions: Option<bool>,
    #[serde(default)]
    pub build_timeout: Option<u64>,
    #[serde(default)]
    pub shared_with_groups: Vec<SharedGroup>,
    /// Runner registration token, visible to admins only
    #[serde(default)]
    pub runners_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedGroup {
    pub group_id: u64,
    #[serde(default)]
    pub group_access_level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployKey {
    #[serde(default)]
    pub id: u64,
    pub title: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedTag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub id: u64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    #[serde(default)]
    pub environment_scope: Option<String>,
}

/// Settings written by `PUT /projects/:id`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_runners_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_allow_merge_if_pipeline_succeeds: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_allow_merge_if_all_discussions_are_resolved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_outdated_diff_discussions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_timeout: Option<u64>,
}

/// A file committed through `POST /projects/:id/repository/files/:path`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFile {
    #[serde(skip)]
    pub file_path: String,
    pub branch: String,
    pub content: String,
    pub author_email: String,
    pub author_name: String,
    pub commit_message: String,
}

/// A CI variable to create or update
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub key: String,
    pub value: String,
    pub protected: bool,
    pub masked: bool,
    pub environment_scope: String,
}

/// The GitLab operations the provisioner relies on.
pub trait GitLabApi {
    /// Look up a project by `group/name`; `Ok(None)` when it does not exist.
    fn get_project(&self, path: &str) -> Result<Option<Project>>;

    /// Groups whose name or path matches `search`.
    fn search_groups(&self, search: &str) -> Result<Vec<Group>>;

    fn create_project(&self, name: &str, namespace_id: u64) -> Result<Project>;

    fn create_file(&self, project_id: u64, file: &NewFile) -> Result<()>;

    fn update_project(&self, project_id: u64, settings: &ProjectSettings) -> Result<Project>;

    fn share_project(&self, project_id: u64, group_id: u64, access_level: u32) -> Result<()>;

    fn list_deploy_keys(&self, project_id: u64) -> Result<Vec<DeployKey>>;

    fn create_deploy_key(&self, project_id: u64, title: &str, key: &str) -> Result<()>;

    fn list_protected_tags(&self, project_id: u64) -> Result<Vec<ProtectedTag>>;

    fn protect_tag(&self, project_id: u64, name: &str, create_access_level: u32) -> Result<()>;

    /// Every runner visible to the token.
    fn list_runners(&self) -> Result<Vec<Runner>>;

    fn list_project_runners(&self, project_id: u64) -> Result<Vec<Runner>>;

    fn enable_project_runner(&self, project_id: u64, runner_id: u64) -> Result<()>;

    fn list_variables(&self, project_id: u64) -> Result<Vec<Variable>>;

    /// `POST /projects/:path/variables`
    fn create_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()>;

    /// `PUT /projects/:path/variables/:key`, filtered on the environment scope
    fn update_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()>;
}

/// Percent-encode a `group/name` path for use as a project id in a URL.
pub fn encode_path(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

/// Blocking GitLab REST v4 client authenticated with a private token
pub struct GitLabClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GitLabClient {
    /// Build a client for `base_url` (e.g. `https://gitlab.example.com`).
    ///
    /// No request is made until the first API call.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("acc-projects/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(base_url, token, http))
    }

    /// Build a client on top of an already configured HTTP client.
    pub fn with_http(base_url: &str, token: &str, http: Client) -> Self {
        Self {
            http,
            api_url: format!("{}/api/v4", base_url.trim_end_matches('/')),
            token: token.to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_url, endpoint.trim_start_matches('/'))
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(endpoint))
            .header("PRIVATE-TOKEN", &self.token)
    }

    /// Send a request, turning non-success statuses into `Error::GitLabApi`.
    fn send(&self, method: Method, endpoint: &str, builder: RequestBuilder) -> Result<Response> {
        log::debug!("GitLab {} {}", method, endpoint);
        let response = builder.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(Error::GitLabApi {
            method: method.to_string(),
            url: self.url(endpoint),
            status: status.as_u16(),
            body,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let builder = self.request(Method::GET, endpoint);
        Ok(self.send(Method::GET, endpoint, builder)?.json()?)
    }

    /// Fetch every page of a list endpoint.
    fn get_all<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = "1".to_string();
        loop {
            let builder = self
                .request(Method::GET, endpoint)
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page.as_str())]);
            let response = self.send(Method::GET, endpoint, builder)?;
            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let mut batch: Vec<T> = response.json()?;
            items.append(&mut batch);
            match next {
                Some(n) => page = n,
                None => break,
            }
        }
        Ok(items)
    }

    fn post_form(&self, endpoint: &str, form: &[(&str, String)]) -> Result<Response> {
        let builder = self.request(Method::POST, endpoint).form(form);
        self.send(Method::POST, endpoint, builder)
    }

    fn variable_form(variable: &VariableSpec) -> Vec<(&'static str, String)> {
        vec![
            ("value", variable.value.clone()),
            ("variable_type", "env_var".to_string()),
            ("protected", variable.protected.to_string()),
            ("masked", variable.masked.to_string()),
            ("environment_scope", variable.environment_scope.clone()),
        ]
    }
}

impl GitLabApi for GitLabClient {
    fn get_project(&self, path: &str) -> Result<Option<Project>> {
        let endpoint = format!("projects/{}", encode_path(path));
        match self.get_json(&endpoint) {
            Ok(project) => Ok(Some(project)),
            Err(Error::GitLabApi { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn search_groups(&self, search: &str) -> Result<Vec<Group>> {
        self.get_all("groups", &[("search", search)])
    }

    fn create_project(&self, name: &str, namespace_id: u64) -> Result<Project> {
        let form = [
            ("name", name.to_string()),
            ("namespace_id", namespace_id.to_string()),
        ];
        Ok(self.post_form("projects", &form)?.json()?)
    }

    fn create_file(&self, project_id: u64, file: &NewFile) -> Result<()> {
        let endpoint = format!(
            "projects/{}/repository/files/{}",
            project_id,
            encode_path(&file.file_path)
        );
        let builder = self.request(Method::POST, &endpoint).json(file);
        self.send(Method::POST, &endpoint, builder)?;
        Ok(())
    }

    fn update_project(&self, project_id: u64, settings: &ProjectSettings) -> Result<Project> {
        let endpoint = format!("projects/{}", project_id);
        let builder = self.request(Method::PUT, &endpoint).json(settings);
        Ok(self.send(Method::PUT, &endpoint, builder)?.json()?)
    }

    fn share_project(&self, project_id: u64, group_id: u64, access_level: u32) -> Result<()> {
        let form = [
            ("group_id", group_id.to_string()),
            ("group_access", access_level.to_string()),
        ];
        self.post_form(&format!("projects/{}/share", project_id), &form)?;
        Ok(())
    }

    fn list_deploy_keys(&self, project_id: u64) -> Result<Vec<DeployKey>> {
        self.get_all(&format!("projects/{}/deploy_keys", project_id), &[])
    }

    fn create_deploy_key(&self, project_id: u64, title: &str, key: &str) -> Result<()> {
        let form = [("title", title.to_string()), ("key", key.to_string())];
        self.post_form(&format!("projects/{}/deploy_keys", project_id), &form)?;
        Ok(())
    }

    fn list_protected_tags(&self, project_id: u64) -> Result<Vec<ProtectedTag>> {
        self.get_all(&format!("projects/{}/protected_tags", project_id), &[])
    }

    fn protect_tag(&self, project_id: u64, name: &str, create_access_level: u32) -> Result<()> {
        let form = [
            ("name", name.to_string()),
            ("create_access_level", create_access_level.to_string()),
        ];
        self.post_form(&format!("projects/{}/protected_tags", project_id), &form)?;
        Ok(())
    }

    fn list_runners(&self) -> Result<Vec<Runner>> {
        self.get_all("runners", &[])
    }

    fn list_project_runners(&self, project_id: u64) -> Result<Vec<Runner>> {
        self.get_all(&format!("projects/{}/runners", project_id), &[])
    }

    fn enable_project_runner(&self, project_id: u64, runner_id: u64) -> Result<()> {
        let form = [("runner_id", runner_id.to_string())];
        self.post_form(&format!("projects/{}/runners", project_id), &form)?;
        Ok(())
    }

    fn list_variables(&self, project_id: u64) -> Result<Vec<Variable>> {
        self.get_all(&format!("projects/{}/variables", project_id), &[])
    }

    fn create_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()> {
        let endpoint = format!("projects/{}/variables", encode_path(project_path));
        let mut form = Self::variable_form(variable);
        form.insert(0, ("key", variable.key.clone()));
        self.post_form(&endpoint, &form)?;
        Ok(())
    }

    fn update_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()> {
        let endpoint = format!(
            "projects/{}/variables/{}",
            encode_path(project_path),
            variable.key
        );
        let mut form = Self::variable_form(variable);
        form.push(("filter[environment_scope]", variable.environment_scope.clone()));
        let builder = self.request(Method::PUT, &endpoint).form(&form);
        self.send(Method::PUT, &endpoint, builder)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory GitLab used by provisioner and command tests.

    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    pub struct State {
        pub projects: Vec<Project>,
        pub groups: Vec<Group>,
        pub deploy_keys: Vec<(u64, DeployKey)>,
        pub protected_tags: Vec<(u64, ProtectedTag)>,
        pub runners: Vec<Runner>,
        pub project_runners: Vec<(u64, Runner)>,
        pub variables: Vec<(String, VariableSpec)>,
        pub files: Vec<(u64, NewFile)>,
        /// Every mutating call, in order, e.g. `create_project clients/acme`
        pub mutations: Vec<String>,
        /// Number of API calls of any kind
        pub calls: usize,
        /// Call name that answers with a server error, e.g. `create_variable`
        pub fail_on: Option<&'static str>,
        next_id: u64,
    }

    #[derive(Debug, Default)]
    pub struct FakeGitLab {
        pub state: RefCell<State>,
    }

    impl FakeGitLab {
        pub fn new() -> Self {
            let fake = Self::default();
            fake.state.borrow_mut().next_id = 100;
            fake
        }

        pub fn with_group(self, id: u64, full_path: &str) -> Self {
            self.state.borrow_mut().groups.push(Group {
                id,
                full_path: full_path.to_string(),
            });
            self
        }

        pub fn with_runner(self, id: u64, description: &str) -> Self {
            self.state.borrow_mut().runners.push(Runner {
                id,
                description: Some(description.to_string()),
            });
            self
        }

        pub fn with_project(self, path: &str) -> Self {
            {
                let mut state = self.state.borrow_mut();
                state.next_id += 1;
                let id = state.next_id;
                state.projects.push(project(id, path));
            }
            self
        }

        /// Make every call named `call` fail with a 500 response.
        pub fn failing_on(self, call: &'static str) -> Self {
            self.state.borrow_mut().fail_on = Some(call);
            self
        }

        pub fn mutations(&self) -> Vec<String> {
            self.state.borrow().mutations.clone()
        }

        pub fn calls(&self) -> usize {
            self.state.borrow().calls
        }

        fn touch(&self) -> std::cell::RefMut<'_, State> {
            let mut state = self.state.borrow_mut();
            state.calls += 1;
            state
        }

        fn check_failure(state: &State, call: &str, url: &str) -> Result<()> {
            if state.fail_on == Some(call) {
                return Err(Error::GitLabApi {
                    method: call.to_string(),
                    url: url.to_string(),
                    status: 500,
                    body: "injected failure".to_string(),
                });
            }
            Ok(())
        }

        fn find(state: &State, project_id: u64) -> Result<usize> {
            state
                .projects
                .iter()
                .position(|p| p.id == project_id)
                .ok_or_else(|| Error::ProjectNotFound {
                    path: project_id.to_string(),
                })
        }
    }

    pub fn project(id: u64, path: &str) -> Project {
        Project {
            id,
            path_with_namespace: path.to_string(),
            ssh_url_to_repo: format!("git@gitlab.example.com:{}.git", path),
            description: None,
            visibility: Some("internal".to_string()),
            shared_runners_enabled: Some(true),
            only_allow_merge_if_pipeline_succeeds: Some(false),
            only_allow_merge_if_all_discussions_are_resolved: Some(false),
            resolve_outdated_diff_discussions: Some(false),
            build_timeout: Some(3600),
            shared_with_groups: Vec::new(),
            runners_token: Some(format!("token-{}", id)),
        }
    }

    impl GitLabApi for FakeGitLab {
        fn get_project(&self, path: &str) -> Result<Option<Project>> {
            let state = self.touch();
            Ok(state
                .projects
                .iter()
                .find(|p| p.path_with_namespace == path)
                .cloned())
        }

        fn search_groups(&self, search: &str) -> Result<Vec<Group>> {
            let state = self.touch();
            Ok(state
                .groups
                .iter()
                .filter(|g| g.full_path.contains(search))
                .cloned()
                .collect())
        }

        fn create_project(&self, name: &str, namespace_id: u64) -> Result<Project> {
            let mut state = self.touch();
            let group = state
                .groups
                .iter()
                .find(|g| g.id == namespace_id)
                .map(|g| g.full_path.clone())
                .ok_or_else(|| Error::GroupNotFound {
                    group: namespace_id.to_string(),
                })?;
            state.next_id += 1;
            let created = project(state.next_id, &format!("{}/{}", group, name));
            state.projects.push(created.clone());
            state
                .mutations
                .push(format!("create_project {}", created.path_with_namespace));
            Ok(created)
        }

        fn create_file(&self, project_id: u64, file: &NewFile) -> Result<()> {
            let mut state = self.touch();
            state.files.push((project_id, file.clone()));
            state
                .mutations
                .push(format!("create_file {} {}", project_id, file.file_path));
            Ok(())
        }

        fn update_project(&self, project_id: u64, settings: &ProjectSettings) -> Result<Project> {
            let mut state = self.touch();
            let idx = Self::find(&state, project_id)?;
            let p = &mut state.projects[idx];
            if let Some(v) = &settings.description {
                p.description = Some(v.clone());
            }
            if let Some(v) = &settings.visibility {
                p.visibility = Some(v.clone());
            }
            if settings.shared_runners_enabled.is_some() {
                p.shared_runners_enabled = settings.shared_runners_enabled;
            }
            if settings.only_allow_merge_if_pipeline_succeeds.is_some() {
                p.only_allow_merge_if_pipeline_succeeds =
                    settings.only_allow_merge_if_pipeline_succeeds;
            }
            if settings.only_allow_merge_if_all_discussions_are_resolved.is_some() {
                p.only_allow_merge_if_all_discussions_are_resolved =
                    settings.only_allow_merge_if_all_discussions_are_resolved;
            }
            if settings.resolve_outdated_diff_discussions.is_some() {
                p.resolve_outdated_diff_discussions = settings.resolve_outdated_diff_discussions;
            }
            if settings.build_timeout.is_some() {
                p.build_timeout = settings.build_timeout;
            }
            let updated = p.clone();
            state.mutations.push(format!("update_project {}", project_id));
            Ok(updated)
        }

        fn share_project(&self, project_id: u64, group_id: u64, access_level: u32) -> Result<()> {
            let mut state = self.touch();
            let idx = Self::find(&state, project_id)?;
            state.projects[idx].shared_with_groups.push(SharedGroup {
                group_id,
                group_access_level: Some(access_level),
            });
            state
                .mutations
                .push(format!("share_project {} {} {}", project_id, group_id, access_level));
            Ok(())
        }

        fn list_deploy_keys(&self, project_id: u64) -> Result<Vec<DeployKey>> {
            let state = self.touch();
            Ok(state
                .deploy_keys
                .iter()
                .filter(|(id, _)| *id == project_id)
                .map(|(_, k)| k.clone())
                .collect())
        }

        fn create_deploy_key(&self, project_id: u64, title: &str, key: &str) -> Result<()> {
            let mut state = self.touch();
            state.deploy_keys.push((
                project_id,
                DeployKey {
                    id: 0,
                    title: title.to_string(),
                    key: key.to_string(),
                },
            ));
            state
                .mutations
                .push(format!("create_deploy_key {} {}", project_id, title));
            Ok(())
        }

        fn list_protected_tags(&self, project_id: u64) -> Result<Vec<ProtectedTag>> {
            let state = self.touch();
            Ok(state
                .protected_tags
                .iter()
                .filter(|(id, _)| *id == project_id)
                .map(|(_, t)| t.clone())
                .collect())
        }

        fn protect_tag(&self, project_id: u64, name: &str, create_access_level: u32) -> Result<()> {
            let mut state = self.touch();
            state.protected_tags.push((
                project_id,
                ProtectedTag {
                    name: name.to_string(),
                },
            ));
            state.mutations.push(format!(
                "protect_tag {} {} {}",
                project_id, name, create_access_level
            ));
            Ok(())
        }

        fn list_runners(&self) -> Result<Vec<Runner>> {
            Ok(self.touch().runners.clone())
        }

        fn list_project_runners(&self, project_id: u64) -> Result<Vec<Runner>> {
            let state = self.touch();
            Ok(state
                .project_runners
                .iter()
                .filter(|(id, _)| *id == project_id)
                .map(|(_, r)| r.clone())
                .collect())
        }

        fn enable_project_runner(&self, project_id: u64, runner_id: u64) -> Result<()> {
            let mut state = self.touch();
            let runner = state
                .runners
                .iter()
                .find(|r| r.id == runner_id)
                .cloned()
                .ok_or_else(|| Error::config(format!("no runner {}", runner_id)))?;
            state.project_runners.push((project_id, runner));
            state
                .mutations
                .push(format!("enable_project_runner {} {}", project_id, runner_id));
            Ok(())
        }

        fn list_variables(&self, project_id: u64) -> Result<Vec<Variable>> {
            let state = self.touch();
            let idx = Self::find(&state, project_id)?;
            let path = state.projects[idx].path_with_namespace.clone();
            Ok(state
                .variables
                .iter()
                .filter(|(p, _)| *p == path)
                .map(|(_, v)| Variable {
                    key: v.key.clone(),
                    environment_scope: Some(v.environment_scope.clone()),
                })
                .collect())
        }

        fn create_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()> {
            let mut state = self.touch();
            Self::check_failure(&state, "create_variable", project_path)?;
            state
                .variables
                .push((project_path.to_string(), variable.clone()));
            state
                .mutations
                .push(format!("create_variable {} {}", project_path, variable.key));
            Ok(())
        }

        fn update_variable(&self, project_path: &str, variable: &VariableSpec) -> Result<()> {
            let mut state = self.touch();
            Self::check_failure(&state, "update_variable", project_path)?;
            for (path, existing) in state.variables.iter_mut() {
                if path.as_str() == project_path && existing.key == variable.key {
                    *existing = variable.clone();
                }
            }
            state
                .mutations
                .push(format!("update_variable {} {}", project_path, variable.key));
            Ok(())
        }
    }
}
