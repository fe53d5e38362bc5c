//! # Salt PKI Pillars
//!
//! For `salt` clients every host gets its key material delivered through a
//! pillar file under `pillar/salt` in the salt project:
//!
//! - `minion_<fqdn>.sls` for each active server with a `minion` key pair,
//!   carrying the pair and the shared master-signature public key.
//! - `master_<fqdn>.sls` for each salt master, carrying the master-signature
//!   pair, the master's own pair, the public key of every accepted minion,
//!   optional root SSH keys, the repository URL and runner registration data.
//! - `minion_<fqdn>.sls` for each salt master as well, since a master is
//!   also a minion of itself.
//!
//! Dots in the fqdn become underscores in the file name. Files are written
//! unconditionally and never merged with previous content.
//!
//! Key text is serialized with `serde_yaml`, which emits multi-line strings
//! as literal block scalars, so keys survive a parse of the pillar
//! byte-for-byte.

use crate::config::{ClientRecord, KeyPair, SaltMaster, SaltSettings, SshKeyPair};
use crate::error::{Error, Result};
use crate::gitlab::Project;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pillar directory inside a salt project working copy
pub const PILLAR_DIR: &str = "pillar/salt";

const KEY_HEADER_PATTERN: &str = r"(?m)\A-----BEGIN.*KEY-----$";
const MIN_KEY_NEWLINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinionPillar {
    pub salt: MinionRoot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinionRoot {
    pub minion: MinionSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinionSection {
    pub pki: MinionPki,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinionPki {
    pub minion: KeyPair,
    /// Accepted master public key, set for masters acting as their own minion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minion_master: Option<String>,
    /// Master-signature public key
    pub master_sign: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterPillar {
    pub salt: MasterRoot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRoot {
    pub master: MasterSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSection {
    pub pki: MasterPillarPki,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_ed25519: Option<SshKeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_rsa: Option<SshKeyPair>,
    /// SSH URL of the salt project itself
    pub repo: String,
    #[serde(rename = "gitlab-runner")]
    pub gitlab_runner: RunnerRegistration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterPillarPki {
    pub master_sign: KeyPair,
    pub master: KeyPair,
    /// Accepted minion public keys by fqdn, the master itself first
    pub minions: serde_yaml::Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerRegistration {
    pub gitlab_url: String,
    pub gitlab_runner_name: String,
    pub registration_token: Option<String>,
}

/// Checks key text before it goes into a pillar.
pub struct KeyValidator {
    header: Regex,
}

impl KeyValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            header: Regex::new(KEY_HEADER_PATTERN)?,
        })
    }

    /// Check that `value` opens with a PEM `-----BEGIN ... KEY-----` line
    /// and spans at least three newlines.
    pub fn check(&self, host: &str, field: &str, value: &str) -> Result<()> {
        if self.header.is_match(value) && value.matches('\n').count() >= MIN_KEY_NEWLINES {
            return Ok(());
        }
        Err(Error::Validation {
            host: host.to_string(),
            message: format!(
                "minion {} doesn't match the PEM header pattern or has fewer than {} newlines:\n{}",
                field, MIN_KEY_NEWLINES, value
            ),
        })
    }
}

fn file_stem(fqdn: &str) -> String {
    fqdn.replace('.', "_")
}

pub fn minion_pillar_name(fqdn: &str) -> String {
    format!("minion_{}.sls", file_stem(fqdn))
}

pub fn master_pillar_name(fqdn: &str) -> String {
    format!("master_{}.sls", file_stem(fqdn))
}

fn salt_settings(client: &ClientRecord) -> Result<&SaltSettings> {
    client
        .configuration_management()?
        .salt
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "configuration_management.salt"))
}

fn master_pillars(
    client: &ClientRecord,
    salt: &SaltSettings,
    master: &SaltMaster,
    gitlab_url: &str,
    project: &Project,
) -> (MasterPillar, MinionPillar) {
    let mut minions = serde_yaml::Mapping::new();
    minions.insert(
        master.fqdn.clone().into(),
        master.pki.minion.public.clone().into(),
    );
    for server in client.servers.iter().filter(|s| s.active) {
        if let Some(minion) = &server.minion {
            minions.insert(server.fqdn.clone().into(), minion.public.clone().into());
        }
    }

    let master_pillar = MasterPillar {
        salt: MasterRoot {
            master: MasterSection {
                pki: MasterPillarPki {
                    master_sign: salt.pki.master_sign.clone(),
                    master: master.pki.master.clone(),
                    minions,
                },
                root_ed25519: master.root_ed25519.clone(),
                root_rsa: master.root_rsa.clone(),
                repo: project.ssh_url_to_repo.clone(),
                gitlab_runner: RunnerRegistration {
                    gitlab_url: gitlab_url.to_string(),
                    gitlab_runner_name: master.fqdn.clone(),
                    registration_token: project.runners_token.clone(),
                },
            },
        },
    };
    let minion_pillar = MinionPillar {
        salt: MinionRoot {
            minion: MinionSection {
                pki: MinionPki {
                    minion: master.pki.minion.clone(),
                    minion_master: Some(master.pki.master.public.clone()),
                    master_sign: salt.pki.master_sign.public.clone(),
                },
            },
        },
    };
    (master_pillar, minion_pillar)
}

/// Render every pillar for `client` as `(file name, YAML)` pairs in write
/// order. Server key material is validated first.
pub fn render_pillars(
    client: &ClientRecord,
    gitlab_url: &str,
    project: &Project,
) -> Result<Vec<(String, String)>> {
    let salt = salt_settings(client)?;
    let validator = KeyValidator::new()?;
    let mut files = Vec::new();

    for server in client.servers.iter().filter(|s| s.active) {
        let Some(minion) = &server.minion else {
            continue;
        };
        validator.check(&server.fqdn, "pem", &minion.pem)?;
        validator.check(&server.fqdn, "pub", &minion.public)?;
        let pillar = MinionPillar {
            salt: MinionRoot {
                minion: MinionSection {
                    pki: MinionPki {
                        minion: minion.clone(),
                        minion_master: None,
                        master_sign: salt.pki.master_sign.public.clone(),
                    },
                },
            },
        };
        files.push((minion_pillar_name(&server.fqdn), serde_yaml::to_string(&pillar)?));
    }

    for master in &salt.masters {
        let (master_pillar, minion_pillar) =
            master_pillars(client, salt, master, gitlab_url, project);
        files.push((
            master_pillar_name(&master.fqdn),
            serde_yaml::to_string(&master_pillar)?,
        ));
        files.push((
            minion_pillar_name(&master.fqdn),
            serde_yaml::to_string(&minion_pillar)?,
        ));
    }
    Ok(files)
}

/// Write every pillar for `client` under `<local_path>/pillar/salt`.
pub fn write_pillars(
    local_path: &Path,
    client: &ClientRecord,
    gitlab_url: &str,
    project: &Project,
) -> Result<Vec<PathBuf>> {
    let files = render_pillars(client, gitlab_url, project)?;
    let dir = local_path.join(PILLAR_DIR);
    fs::create_dir_all(&dir)?;
    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = dir.join(name);
        fs::write(&path, content)?;
        log::info!("Pillar written to the file: {}", path.display());
        written.push(path);
    }
    Ok(written)
}
