//! External process execution.
//!
//! `git` and the template installer scripts are external collaborators with
//! a narrow contract: a program, arguments, environment and working
//! directory go in; an exit status and the captured streams come out.
//! [`CommandRunner`] captures that contract so callers can be exercised with
//! a recording fake, and [`SystemRunner`] runs real processes.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fully described process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs.extend(envs);
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Human-readable rendering for logs and errors. Environment values are
    /// not shown since they may carry secrets.
    pub fn display(&self) -> String {
        let mut out = String::new();
        if let Some(dir) = &self.current_dir {
            out.push_str(&format!("(cd {}) ", dir.display()));
        }
        for (key, _) in &self.envs {
            out.push_str(key);
            out.push_str("=*** ");
        }
        out.push_str(&self.program);
        for arg in &self.args {
            out.push(' ');
            if arg.contains(' ') || arg.is_empty() {
                out.push_str(&format!("\"{}\"", arg));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs invocations to completion
pub trait CommandRunner {
    /// Run `invocation`, capturing its output. Only a failure to spawn is an
    /// error here; use [`run_checked`] to treat a non-zero exit as fatal.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|e| Error::ExternalProcess {
            command: invocation.display(),
            status: "failed to start".to_string(),
            stdout: String::new(),
            stderr: e.to_string(),
        })?;
        Ok(ProcessOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `invocation` and fail with [`Error::ExternalProcess`] on a non-zero
/// exit. Captured streams are logged either way.
pub fn run_checked(runner: &dyn CommandRunner, invocation: &Invocation) -> Result<ProcessOutput> {
    log::info!("Running: {}", invocation.display());
    let output = runner.run(invocation)?;
    if output.success {
        log_streams(log::Level::Info, &output);
        Ok(output)
    } else {
        log_streams(log::Level::Error, &output);
        Err(Error::ExternalProcess {
            command: invocation.display(),
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn log_streams(level: log::Level, output: &ProcessOutput) {
    if !output.stdout.is_empty() {
        log::log!(level, "Check stdout:\n{}", output.stdout.trim_end());
    }
    if !output.stderr.is_empty() {
        log::log!(level, "Check stderr:\n{}", output.stderr.trim_end());
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    #[test]
    fn test_display_hides_env_values() {
        let inv = Invocation::new("./install.sh")
            .arg("/srv/acme salt")
            .env("TELEGRAM_TOKEN", "secret")
            .current_dir(Path::new("/work/.salt-project-template"));
        let shown = inv.display();
        assert!(shown.contains("TELEGRAM_TOKEN=***"));
        assert!(!shown.contains("secret"));
        assert!(shown.contains("\"/srv/acme salt\""));
        assert!(shown.starts_with("(cd /work/.salt-project-template)"));
    }

    #[test]
    fn test_run_checked_success() {
        let runner = RecordingRunner::new().respond("status", RecordingRunner::ok("clean"));
        let output = run_checked(&runner, &Invocation::new("git").arg("status")).unwrap();
        assert_eq!(output.stdout, "clean");
        assert_eq!(runner.commands(), vec!["git status"]);
    }

    #[test]
    fn test_run_checked_failure_carries_streams() {
        let runner = RecordingRunner::new().respond("push", RecordingRunner::failed("rejected"));
        let err = run_checked(&runner, &Invocation::new("git").arg("push")).unwrap_err();
        match err {
            Error::ExternalProcess {
                command, stderr, ..
            } => {
                assert_eq!(command, "git push");
                assert_eq!(stderr, "rejected");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_system_runner_missing_program() {
        let err = SystemRunner
            .run(&Invocation::new("definitely-not-a-real-program-xyz"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn test_system_runner_captures_output() {
        let output = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }
}
