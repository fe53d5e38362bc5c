//! # Admin Project Wiki
//!
//! Experimental: regenerates the `Accounting/` pages of a client's admin
//! project wiki from the client record and commits them.
//!
//! - `Requisites.md`: contract and papers details as a key/value table.
//! - `Servers.md`: one row per server in roster order, inactive servers
//!   struck through.
//! - `Tariffs.md`: tariff history per server.
//!
//! The wiki is a separate git repository next to the project, reachable at
//! the project's SSH URL with `.git` replaced by `.wiki.git`.

use crate::config::{ClientRecord, Server, TariffPlan};
use crate::error::{Error, Result};
use crate::git;
use crate::gitlab::GitLabApi;
use crate::process::CommandRunner;
use crate::template::roster::sorted_servers;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Commit message for wiki updates
pub const WIKI_COMMIT_MESSAGE: &str = "project wiki updated from accounting/projects.py";

/// Directory inside the wiki that holds generated pages
pub const ACCOUNTING_DIR: &str = "Accounting";

const STRIKE: &str = "~~";

/// The wiki remote for a project SSH URL.
pub fn wiki_url(ssh_url_to_repo: &str) -> Result<String> {
    let suffix = Regex::new(r"\.git$")?;
    Ok(suffix.replace(ssh_url_to_repo, ".wiki.git").into_owned())
}

fn br(text: &str) -> String {
    text.replace('\n', "<br>")
}

fn scalar_text(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn plan_text(plan: &TariffPlan) -> String {
    match plan {
        TariffPlan::File { file } => file.clone(),
        TariffPlan::Plan {
            service,
            plan,
            revision,
            monthly,
            hourly,
            storage,
        } => {
            let mut text = format!(
                "{} {} rev. {} ({} {} / month, {} {} / hour",
                service,
                plan,
                scalar_text(revision),
                monthly.rate,
                monthly.currency,
                hourly.rate,
                hourly.currency
            );
            if let Some(storage) = storage {
                text.push_str(&format!(", {} {} / Gb", storage.rate, storage.currency));
            }
            text.push_str(" )");
            text
        }
    }
}

/// Human-readable tariff history of a server, current period first.
pub fn tariff_history(server: &Server) -> String {
    let mut out = String::new();
    for (i, period) in server.tariffs.iter().enumerate() {
        out.push_str(if i == 0 { "active, from " } else { "not active, from " });
        out.push_str(&period.activated.format("%Y-%m-%d").to_string());
        out.push_str(" - ");
        let plans: Vec<String> = period.tariffs.iter().map(plan_text).collect();
        out.push_str(&plans.join(" + "));
        out.push_str("<br>");
    }
    out
}

/// `Requisites.md`
pub fn render_requisites(client: &ClientRecord) -> Result<String> {
    let code = client
        .code
        .as_deref()
        .ok_or_else(|| Error::missing_key(&client.name, "code"))?;
    let start_date = client
        .start_date
        .ok_or_else(|| Error::missing_key(&client.name, "start_date"))?;
    let contract = client
        .contract
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "contract"))?;
    let papers = client
        .papers
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "papers"))?;

    let rows = [
        ("Client Name", client.name.clone()),
        ("Client Code", code.to_string()),
        ("Start Date", start_date.format("%Y-%m-%d").to_string()),
        ("Contract Recipient", contract.recipient.clone()),
        ("Contract Requisites", br(&contract.details)),
        ("Contract Name", contract.name.clone()),
        ("Contract Person Name", contract.person.clone()),
        ("Contract Person Sign", contract.sign.clone()),
        (
            "Papers Envelope Address",
            papers.envelope_address.as_deref().map(br).unwrap_or_default(),
        ),
        ("Papers Email", papers.email.to.clone()),
    ];

    let mut out = String::from("# Requisites\n| Key | Value |\n| --- | ----- |\n");
    for (key, value) in rows {
        out.push_str(&format!("| {} | {} |\n", key, value));
    }
    Ok(out)
}

/// `Servers.md`
pub fn render_servers(client: &ClientRecord) -> String {
    let mut out = String::from(
        "# Servers\n| FQDN | Active | Location | Jobs | OS | Tariff |\n| ---- | ------ | -------- | ---- | -- | ------ |\n",
    );
    for server in sorted_servers(&client.servers) {
        let strike = if server.active { "" } else { STRIKE };
        let struck = |text: &str| format!("{strike}{text}{strike}");
        let optional = |value: &Option<String>| value.as_deref().map(struck).unwrap_or_default();
        let jobs = !(client.jobs_disabled || server.jobs_disabled);
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            struck(&server.fqdn),
            if server.active { "True" } else { "False" },
            optional(&server.location),
            struck(if jobs { "True" } else { "False" }),
            optional(&server.os),
            struck(&tariff_history(server)),
        ));
    }
    out
}

/// `Tariffs.md`
pub fn render_tariffs(client: &ClientRecord) -> String {
    let mut out = String::from("# Tariffs\n| FQDN | Tariff |\n| ---- | ------ |\n");
    for server in sorted_servers(&client.servers) {
        out.push_str(&format!(
            "| {} | {} |\n",
            server.fqdn,
            tariff_history(server)
        ));
    }
    out
}

/// Write the three pages into `<wiki_path>/Accounting`.
pub fn write_pages(wiki_path: &Path, client: &ClientRecord) -> Result<()> {
    let dir = wiki_path.join(ACCOUNTING_DIR);
    fs::create_dir_all(&dir)?;
    let pages = [
        ("Requisites.md", render_requisites(client)?),
        ("Servers.md", render_servers(client)),
        ("Tariffs.md", render_tariffs(client)),
    ];
    for (name, content) in pages {
        let path = dir.join(name);
        fs::write(&path, content)?;
        log::info!("Wiki page written to the file: {}", path.display());
    }
    Ok(())
}

/// Regenerates admin project wikis.
pub struct WikiUpdater<'a> {
    api: &'a dyn GitLabApi,
    runner: &'a dyn CommandRunner,
    work_dir: &'a Path,
    push: bool,
}

impl<'a> WikiUpdater<'a> {
    pub fn new(
        api: &'a dyn GitLabApi,
        runner: &'a dyn CommandRunner,
        work_dir: &'a Path,
        push: bool,
    ) -> Self {
        Self {
            api,
            runner,
            work_dir,
            push,
        }
    }

    /// Sync, regenerate and commit the wiki of `client`'s admin project.
    pub fn update_client(&self, client: &ClientRecord) -> Result<bool> {
        let admin_project = client.admin_project()?;
        let project = self
            .api
            .get_project(&admin_project.path)?
            .ok_or_else(|| Error::ProjectNotFound {
                path: admin_project.path.clone(),
            })?;
        let remote = wiki_url(&project.ssh_url_to_repo)?;
        let path_with_namespace = format!("{}.wiki", project.path_with_namespace);
        log::info!(
            "Admin project {} wiki for client {} ssh_url_to_repo: {}, path_with_namespace: {}",
            admin_project.path,
            client.name,
            remote,
            path_with_namespace
        );

        let local_path = git::working_copy_path(self.work_dir, &path_with_namespace);
        git::sync_working_copy(self.runner, &local_path, &remote)?;
        write_pages(&local_path, client)?;
        git::commit_and_push(self.runner, &local_path, WIKI_COMMIT_MESSAGE, self.push)
    }
}
