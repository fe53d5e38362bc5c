//! # Accounting Projects Library
//!
//! This library provisions and templates the GitLab projects behind a
//! managed-hosting accounting system. Every client is described by a YAML
//! record; for each selected client the library can make sure its "salt"
//! (configuration management) and "admin" projects exist with the expected
//! settings, and stamp the salt project's working copy with generated
//! configuration before committing it.
//!
//! ## Quick Example
//!
//! ```
//! use acc_projects::config::parse_client;
//! use acc_projects::selection::{select, ClientFilter, SelectionCriteria};
//!
//! let clients = vec![
//!     parse_client("name: Acme\nactive: true\ngitlab: {}\n").unwrap(),
//!     parse_client("name: Gone\nactive: false\ngitlab: {}\n").unwrap(),
//! ];
//! let criteria = SelectionCriteria::all(ClientFilter::All);
//! let names: Vec<_> = select(&clients, &criteria).map(|c| c.name.as_str()).collect();
//! assert_eq!(names, vec!["Acme"]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: typed schema of `accounting.yaml` and the
//!   per-client records, loaded from the work directory.
//! - **Selection (`selection`)**: which clients a run acts on.
//! - **GitLab (`gitlab`)**: the slice of the REST API the tool uses, behind
//!   the `GitLabApi` trait.
//! - **Provisioning (`provision`)**: create-if-missing plus settings for the
//!   salt and admin projects.
//! - **Templating (`template`)**: installers, roster and PKI pillars for the
//!   salt project working copy.
//! - **Wiki (`wiki`)**: experimental accounting pages in the admin wiki.
//! - **Working copies (`git`, `process`)**: git and installer invocations
//!   through the `CommandRunner` trait.
//!
//! ## Execution Flow
//!
//! 1.  Load `accounting.yaml` and `clients/*.yaml` into a `context::Context`.
//! 2.  Select clients (active flag, single name, include or exclude list).
//! 3.  For each selected client, in discovery order, run the requested
//!     operation. The first error aborts the run.

pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod gitlab;
pub mod logging;
pub mod process;
pub mod provision;
pub mod selection;
pub mod template;
pub mod wiki;

#[cfg(test)]
mod selection_proptest;
