//! # Wiki Command Implementation
//!
//! This module implements the experimental
//! `update-admin-project-wiki-for-client` and
//! `update-admin-project-wiki-for-all-clients` actions.

use anyhow::Result;

use acc_projects::process::SystemRunner;

use super::{gitlab_client, GlobalArgs};

/// Execute the wiki action for `client`, or for all selected clients.
pub fn execute(global: &GlobalArgs, client: Option<&str>) -> Result<()> {
    let (ctx, token) = global.load()?;
    let criteria = global.criteria(client);
    let api = gitlab_client(&ctx, &token)?;
    let processed = ctx.update_admin_wikis(&api, &SystemRunner, &criteria)?;
    log::info!("Admin wikis updated for {} client(s)", processed);
    Ok(())
}
