//! # Setup Command Implementation
//!
//! This module implements `setup-projects-for-client` and
//! `setup-projects-for-all-clients`: for each selected client the salt and
//! admin projects are created when missing and their settings applied.
//! With `--dry-run-gitlab` GitLab is only read.

use anyhow::Result;

use super::{gitlab_client, GlobalArgs};

/// Execute the setup action for `client`, or for all selected clients.
pub fn execute(global: &GlobalArgs, client: Option<&str>) -> Result<()> {
    let (ctx, token) = global.load()?;
    let criteria = global.criteria(client);
    let api = gitlab_client(&ctx, &token)?;
    let processed = ctx.setup_projects(&api, &criteria)?;
    log::info!("Projects set up for {} client(s)", processed);
    Ok(())
}
