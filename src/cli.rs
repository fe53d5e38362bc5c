//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use crate::commands::{self, ClientArgs, GlobalArgs};

/// Projects - ensure and template GitLab projects of accounting clients
#[derive(Parser, Debug)]
#[command(name = "acc-projects")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Action to perform
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure the -salt and -admin projects of CLIENT exist in GitLab and
    /// set them up
    SetupProjectsForClient(ClientArgs),

    /// Ensure the -salt and -admin projects of all clients exist in GitLab
    /// and set them up, honoring --exclude-clients / --include-clients
    SetupProjectsForAllClients,

    /// Apply templates to the salt project of CLIENT using the current
    /// user's git credentials
    TemplateSaltProjectForClient(ClientArgs),

    /// Apply templates to the salt projects of all clients, honoring
    /// --exclude-clients / --include-clients
    TemplateSaltProjectForAllClients,

    /// Update the admin project wiki (requisites, servers, tariffs) of
    /// CLIENT (experimental)
    UpdateAdminProjectWikiForClient(ClientArgs),

    /// Update the admin project wiki of all clients (experimental)
    UpdateAdminProjectWikiForAllClients,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let Some(command) = self.command else {
            Cli::command().print_help()?;
            anyhow::bail!("no action given");
        };

        acc_projects::logging::init(self.global.debug, &self.global.logdir);
        log::info!("Starting Projects");

        let result = match command {
            Commands::SetupProjectsForClient(args) => {
                commands::setup::execute(&self.global, Some(&args.client))
            }
            Commands::SetupProjectsForAllClients => commands::setup::execute(&self.global, None),
            Commands::TemplateSaltProjectForClient(args) => {
                commands::template::execute(&self.global, Some(&args.client))
            }
            Commands::TemplateSaltProjectForAllClients => {
                commands::template::execute(&self.global, None)
            }
            Commands::UpdateAdminProjectWikiForClient(args) => {
                commands::wiki::execute(&self.global, Some(&args.client))
            }
            Commands::UpdateAdminProjectWikiForAllClients => {
                commands::wiki::execute(&self.global, None)
            }
        };

        match result {
            Ok(()) => {
                log::info!("Finished Projects");
                Ok(())
            }
            Err(e) => {
                log::error!("{:#}", e);
                log::info!("Finished Projects with errors");
                Err(e)
            }
        }
    }
}
