//! Local working copies of GitLab projects.
//!
//! The tool owns `$ACC_WORKDIR/.projects/<group>/<project>` exclusively:
//! every run force-resets an existing clone to `origin/master` and wipes
//! untracked files, so local edits never survive between runs. Running two
//! instances against the same client at once is not supported.
//!
//! All git work goes through the system `git` command, which picks up SSH
//! keys, credential helpers and `~/.gitconfig` on its own.

use crate::error::Result;
use crate::process::{run_checked, CommandRunner, Invocation};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the work dir that holds working copies.
pub const PROJECTS_SUBDIR: &str = ".projects";

/// Branch every working copy tracks
pub const DEFAULT_BRANCH: &str = "master";

const SUBMODULE_REFRESH: &str =
    "git checkout master && git pull && git fetch --prune origin +refs/tags/*:refs/tags/*";

/// Where the working copy of `path_with_namespace` lives.
pub fn working_copy_path(work_dir: &Path, path_with_namespace: &str) -> PathBuf {
    work_dir.join(PROJECTS_SUBDIR).join(path_with_namespace)
}

fn git(dir: &Path) -> Invocation {
    Invocation::new("git").current_dir(dir)
}

/// Whether `local_path/.git` exists and git recognises it as a git dir.
pub fn is_git_dir(runner: &dyn CommandRunner, local_path: &Path) -> Result<bool> {
    let git_dir = local_path.join(".git");
    if !git_dir.is_dir() {
        return Ok(false);
    }
    let output = runner.run(&git(&git_dir).args(["rev-parse", "--is-inside-git-dir"]))?;
    Ok(output.success && output.stdout.trim() == "true")
}

/// Bring `local_path` in line with `remote_url`.
///
/// An existing clone is fetched, pruned, hard-reset to `origin/master` and
/// cleaned of every untracked and ignored file; anything else is cloned
/// fresh. Submodules are then initialised, force-updated, and moved to the
/// tip of their own `master`.
pub fn sync_working_copy(
    runner: &dyn CommandRunner,
    local_path: &Path,
    remote_url: &str,
) -> Result<()> {
    if is_git_dir(runner, local_path)? {
        log::info!(
            "Already cloned, fetching and resetting to origin: {}",
            local_path.display()
        );
        run_checked(runner, &git(local_path).args(["fetch", "origin"]))?;
        run_checked(
            runner,
            &git(local_path).args(["fetch", "--prune", "origin", "+refs/tags/*:refs/tags/*"]),
        )?;
        let upstream = format!("origin/{}", DEFAULT_BRANCH);
        run_checked(
            runner,
            &git(local_path).args(["reset", "--hard", upstream.as_str()]),
        )?;
        run_checked(runner, &git(local_path).args(["clean", "-ffdx"]))?;
    } else {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        run_checked(
            runner,
            &Invocation::new("git")
                .args(["clone", remote_url])
                .arg(local_path.to_string_lossy()),
        )?;
    }

    run_checked(runner, &git(local_path).args(["submodule", "init"]))?;
    run_checked(
        runner,
        &git(local_path).args(["submodule", "update", "-f", "--checkout"]),
    )?;
    run_checked(
        runner,
        &git(local_path).args(["submodule", "foreach", SUBMODULE_REFRESH]),
    )?;
    Ok(())
}

/// Stage everything, commit with `message` when there is something to
/// commit, and push when `push` is set.
///
/// Returns whether a commit was made. A clean tree is not an error.
pub fn commit_and_push(
    runner: &dyn CommandRunner,
    local_path: &Path,
    message: &str,
    push: bool,
) -> Result<bool> {
    run_checked(runner, &git(local_path).args(["add", "-A"]))?;
    let status = run_checked(runner, &git(local_path).args(["status", "--porcelain"]))?;
    let committed = if status.stdout.trim().is_empty() {
        log::info!("Nothing to commit in {}", local_path.display());
        false
    } else {
        run_checked(runner, &git(local_path).args(["commit", "-m", message]))?;
        true
    };
    if push {
        run_checked(runner, &git(local_path).arg("push"))?;
    }
    Ok(committed)
}
