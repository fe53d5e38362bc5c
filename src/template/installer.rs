//! Template installer invocation.
//!
//! The salt project templates live in two sibling checkouts under the work
//! directory. Each ships an `install.sh` that takes the target working copy
//! as its first argument and reads everything else from named environment
//! parameters. The public template is run first with the flavor argument,
//! then the private template with `CLIENT` only.

use crate::config::{ClientRecord, CmKind, ConfigurationManagement, SaltSettings, Templates};
use crate::error::{Error, Result};
use crate::process::{run_checked, CommandRunner, Invocation};
use std::path::Path;

/// Public template checkout, relative to the work directory
pub const PUBLIC_TEMPLATE_DIR: &str = ".salt-project-template";

/// Private template checkout, relative to the work directory
pub const PRIVATE_TEMPLATE_DIR: &str = ".salt-project-private-template";

const INSTALL_SCRIPT: &str = "./install.sh";

/// Named parameters passed to an installer, in the order they are set
pub type Params = Vec<(String, String)>;

fn param(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn templates<'a>(client: &ClientRecord, cm: &'a ConfigurationManagement) -> Result<&'a Templates> {
    cm.templates
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "configuration_management.templates"))
}

/// Parameters shared by both flavors.
pub fn common_params(client: &ClientRecord) -> Result<Params> {
    let cm = client.configuration_management()?;
    let t = templates(client, cm)?;
    let vendor = client.vendor()?;
    Ok(vec![
        param("TELEGRAM_TOKEN", &t.telegram_token),
        param("TELEGRAM_CHAT_ID", &t.telegram_chat_id),
        param("ALERTA_URL", &t.alerta_url),
        param("ALERTA_API_KEY", &t.alerta_api_key),
        param("HB_RECEIVER_HN", &t.heartbeat_mesh.sender.receiver),
        param("HB_TOKEN", &t.heartbeat_mesh.sender.token),
        param("ROOT_EMAIL", &t.root_email),
        param("CLIENT", client.key()),
        param("CLIENT_FULL", &client.name),
        param("VENDOR", vendor.to_lowercase()),
        param("VENDOR_FULL", vendor),
        param("DEFAULT_TZ", &t.default_tz),
        param("CLIENT_DOMAIN", &t.client_domain),
    ])
}

/// Full parameter set for a `salt-ssh` client.
pub fn salt_ssh_params(client: &ClientRecord) -> Result<Params> {
    let cm = client.configuration_management()?;
    let t = templates(client, cm)?;
    let salt_project = client.salt_project()?;
    let runners = salt_project
        .runners
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "gitlab.salt_project.runners"))?;
    let root_pub = salt_project
        .variables
        .as_ref()
        .and_then(|v| v.get("SALTSSH_ROOT_ED25519_PUB"))
        .ok_or_else(|| {
            Error::missing_key(
                &client.name,
                "gitlab.salt_project.variables.SALTSSH_ROOT_ED25519_PUB",
            )
        })?;
    let source_ip = t.runner_source_ip.as_deref().ok_or_else(|| {
        Error::missing_key(
            &client.name,
            "configuration_management.templates.runner_source_ip",
        )
    })?;
    let salt_ssh = cm
        .salt_ssh
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "configuration_management.salt-ssh"))?;

    let mut params = common_params(client)?;
    params.extend([
        param("DEV_RUNNER", &runners.dev),
        param("PROD_RUNNER", &runners.prod),
        param("SALTSSH_ROOT_ED25519_PUB", root_pub),
        param("SALTSSH_RUNNER_SOURCE_IP", source_ip),
        param("SALT_VERSION", &salt_ssh.version),
    ]);
    Ok(params)
}

fn salt_settings<'a>(client: &ClientRecord, cm: &'a ConfigurationManagement) -> Result<&'a SaltSettings> {
    cm.salt
        .as_ref()
        .ok_or_else(|| Error::missing_key(&client.name, "configuration_management.salt"))
}

/// Full parameter set for a `salt` client.
///
/// The template has exactly two master slots, filled from the first two
/// entries of the masters list. Both minion ports come from the first
/// master's `external_ports`.
pub fn salt_params(client: &ClientRecord) -> Result<Params> {
    let cm = client.configuration_management()?;
    let salt = salt_settings(client, cm)?;

    let [first, second, ..] = salt.masters.as_slice() else {
        return Err(Error::Config {
            message: format!(
                "client {} has {} salt master(s), the salt template needs two",
                client.name,
                salt.masters.len()
            ),
            hint: Some("list two entries under configuration_management.salt.masters".to_string()),
        });
    };
    let ssh_pub = |master: &crate::config::SaltMaster| {
        master.ssh_pub().map(str::to_string).ok_or_else(|| Error::Config {
            message: format!(
                "salt master {} of client {} has neither root_ed25519 nor root_rsa",
                master.fqdn, client.name
            ),
            hint: None,
        })
    };
    let [port_1, port_2, ..] = first.external_ports.as_slice() else {
        return Err(Error::Config {
            message: format!(
                "salt master {} of client {} needs two external_ports",
                first.fqdn, client.name
            ),
            hint: None,
        });
    };
    let staging = salt.staging_server.as_deref().ok_or_else(|| {
        Error::missing_key(&client.name, "configuration_management.salt.staging_server")
    })?;

    let mut params = common_params(client)?;
    params.extend([
        param("SALT_MINION_VERSION", &salt.version),
        param("SALT_MASTER_VERSION", &salt.version),
        param("SALT_MASTER_1_NAME", &first.fqdn),
        param("SALT_MASTER_1_IP", &first.ip),
        param("SALT_MASTER_1_EXT_IP", &first.external_ip),
        param("SALT_MASTER_1_SSH_PUB", ssh_pub(first)?),
        param("SALT_MASTER_2_NAME", &second.fqdn),
        param("SALT_MASTER_2_IP", &second.ip),
        param("SALT_MASTER_2_EXT_IP", &second.external_ip),
        param("SALT_MASTER_2_SSH_PUB", ssh_pub(second)?),
        param("SALT_MASTER_PORT_1", port_1.to_string()),
        param("SALT_MASTER_PORT_2", port_2.to_string()),
        param("STAGING_SALT_MASTER", staging),
    ]);
    Ok(params)
}

/// Invocations for both installers, public first.
pub fn installer_invocations(
    work_dir: &Path,
    local_path: &Path,
    client: &ClientRecord,
) -> Result<Vec<Invocation>> {
    let kind = client.configuration_management()?.kind;
    let params = match kind {
        CmKind::SaltSsh => salt_ssh_params(client)?,
        CmKind::Salt => salt_params(client)?,
    };
    let target = local_path.to_string_lossy().into_owned();

    let public = Invocation::new(INSTALL_SCRIPT)
        .current_dir(&work_dir.join(PUBLIC_TEMPLATE_DIR))
        .envs(params)
        .arg(target.as_str())
        .arg(kind.to_string());
    let private = Invocation::new(INSTALL_SCRIPT)
        .current_dir(&work_dir.join(PRIVATE_TEMPLATE_DIR))
        .env("CLIENT", client.key())
        .arg(target);
    Ok(vec![public, private])
}

/// Run both installers against `local_path`.
pub fn apply_config_template(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    local_path: &Path,
    client: &ClientRecord,
) -> Result<()> {
    for invocation in installer_invocations(work_dir, local_path, client)? {
        run_checked(runner, &invocation)?;
    }
    Ok(())
}
