//! # Template Command Implementation
//!
//! This module implements `template-salt-project-for-client` and
//! `template-salt-project-for-all-clients`. Working copies are synced under
//! `$ACC_WORKDIR/.projects`, templated, committed, and pushed with
//! `--git-push`. git runs with the current user's credentials.

use anyhow::Result;

use acc_projects::process::SystemRunner;

use super::{gitlab_client, GlobalArgs};

/// Execute the template action for `client`, or for all selected clients.
pub fn execute(global: &GlobalArgs, client: Option<&str>) -> Result<()> {
    let (ctx, token) = global.load()?;
    let criteria = global.criteria(client);
    let api = gitlab_client(&ctx, &token)?;
    let processed = ctx.template_salt_projects(&api, &SystemRunner, &criteria)?;
    log::info!("Salt projects templated for {} client(s)", processed);
    Ok(())
}
