//! Salt-SSH roster generation.
//!
//! The roster lists every active server, ordered by the activation date of
//! its current tariff and then by fqdn, followed by the salt masters for
//! `salt` clients. The file is rewritten from scratch on every run.

use crate::config::{ClientRecord, CmKind, Server, SshConnection};
use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Roster location inside a salt project working copy
pub const ROSTER_FILE: &str = "etc/salt/roster";

/// Substituted with the real identity file by the project's CI
pub const ROSTER_PRIV_PLACEHOLDER: &str = "__ROSTER_PRIV__";

const DEFAULT_SSH_PORT: u16 = 22;

/// One host in the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// `host` or `host:port` for `ProxyJump`
    pub proxy_jump: Option<String>,
}

impl RosterEntry {
    fn new(name: &str, ssh: Option<&SshConnection>) -> Self {
        Self {
            name: name.to_string(),
            host: ssh
                .and_then(|s| s.host.clone())
                .unwrap_or_else(|| name.to_string()),
            port: ssh.and_then(|s| s.port).unwrap_or(DEFAULT_SSH_PORT),
            proxy_jump: None,
        }
    }
}

/// Servers in roster order: by current tariff activation date, then fqdn.
/// A server without tariffs sorts first.
pub fn sorted_servers(servers: &[Server]) -> Vec<&Server> {
    let mut sorted: Vec<&Server> = servers.iter().collect();
    sorted.sort_by(|a, b| {
        a.activated()
            .cmp(&b.activated())
            .then_with(|| a.fqdn.cmp(&b.fqdn))
    });
    sorted
}

/// Roster entries for `client`: active servers, then salt masters.
pub fn roster_entries(client: &ClientRecord) -> Result<Vec<RosterEntry>> {
    let mut entries: Vec<RosterEntry> = sorted_servers(&client.servers)
        .into_iter()
        .filter(|s| s.active)
        .map(|server| {
            let ssh = server.ssh.as_ref();
            let mut entry = RosterEntry::new(&server.fqdn, ssh);
            entry.proxy_jump = ssh.and_then(|s| s.jump.as_ref()).map(|jump| match jump.port {
                Some(port) => format!("{}:{}", jump.host, port),
                None => jump.host.clone(),
            });
            entry
        })
        .collect();

    let cm = client.configuration_management()?;
    if cm.kind == CmKind::Salt {
        let salt = cm
            .salt
            .as_ref()
            .ok_or_else(|| Error::missing_key(&client.name, "configuration_management.salt"))?;
        entries.extend(
            salt.masters
                .iter()
                .map(|master| RosterEntry::new(&master.fqdn, master.ssh.as_ref())),
        );
    }
    Ok(entries)
}

/// Render entries in roster YAML.
pub fn render_roster(entries: &[RosterEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{}:", entry.name);
        let _ = writeln!(out, "  host: {}", entry.host);
        let _ = writeln!(out, "  port: {}", entry.port);
        let _ = writeln!(out, "  priv: {}", ROSTER_PRIV_PLACEHOLDER);
        if let Some(jump) = &entry.proxy_jump {
            let _ = writeln!(out, "  ssh_options:");
            let _ = writeln!(out, "    - ProxyJump={}", jump);
        }
    }
    out
}

/// Replace `<local_path>/etc/salt/roster` with the roster for `client`.
pub fn write_roster(local_path: &Path, client: &ClientRecord) -> Result<PathBuf> {
    let content = render_roster(&roster_entries(client)?);
    let path = local_path.join(ROSTER_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    log::info!("Roster written to the file: {}", path.display());
    Ok(path)
}
