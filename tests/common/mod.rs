//! Shared test utilities for the CLI E2E tests.
//!
//! Add `mod common;` to a test file, then use the prelude:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = WorkDir::new().with_client("acme", clients::INACTIVE);
//!     fixture.command().arg("setup-projects-for-all-clients").assert().success();
//! }
//! ```

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;

pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::clients;
    pub use super::WorkDir;
}

/// `accounting.yaml` pointing at a port nothing listens on, so any GitLab
/// call fails fast.
pub const ACCOUNTING: &str = r#"gitlab:
  url: http://127.0.0.1:9
  salt_project:
    author_name: Accounting Bot
    author_email: bot@example.com
    maintainers_group_id: 42
"#;

/// Client records used across the E2E tests.
#[allow(dead_code)]
pub mod clients {
    pub const INACTIVE: &str = r#"name: Gone
active: false
gitlab:
  admin_project:
    path: clients/gone-admin
"#;

    pub const ACTIVE: &str = r#"name: Acme
active: true
gitlab:
  admin_project:
    path: clients/acme-admin
"#;

    pub const ACTIVE_NO_PROJECTS: &str = r#"name: Plain
active: true
gitlab: {}
"#;
}

/// Temporary accounting work directory plus a log directory.
pub struct WorkDir {
    pub temp: TempDir,
}

impl WorkDir {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        temp.child("accounting.yaml").write_str(ACCOUNTING).unwrap();
        temp.child("clients").create_dir_all().unwrap();
        temp.child("log").create_dir_all().unwrap();
        Self { temp }
    }

    pub fn with_client(self, file_stem: &str, yaml: &str) -> Self {
        self.temp
            .child(format!("clients/{}.yaml", file_stem))
            .write_str(yaml)
            .unwrap();
        self
    }

    /// Command with the work directory, log directory and token set.
    pub fn command(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("acc-projects");
        cmd.env("ACC_WORKDIR", self.temp.path())
            .env("ACC_LOGDIR", self.temp.child("log").path())
            .env("GL_ADMIN_PRIVATE_TOKEN", "test-token")
            .env_remove("RUST_LOG");
        cmd
    }

    #[allow(dead_code)]
    pub fn log_contents(&self) -> String {
        std::fs::read_to_string(self.temp.child("log/projects.log").path()).unwrap_or_default()
    }
}

impl Default for WorkDir {
    fn default() -> Self {
        Self::new()
    }
}
