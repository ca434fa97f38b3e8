//! Best-effort git persistence of the refs file: stage, commit, pull --rebase,
//! push. Every step tolerates failure — a commit with nothing to commit or a
//! rejected push must never take down the harvest loop.

use std::path::{Path, PathBuf};
use std::process::Command;

pub struct GitSync {
    repo_dir: PathBuf,
    message: String,
}

impl GitSync {
    pub fn new(repo_dir: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self { repo_dir: repo_dir.as_ref().to_path_buf(), message: message.into() }
    }

    /// Stage `file` and push it upstream. Returns true if the push step ran
    /// cleanly; false is informational only.
    pub fn sync(&self, file: &Path) -> bool {
        let file_arg = file.to_string_lossy();
        if !self.run(&["add", file_arg.as_ref()]) {
            return false;
        }
        // A failed commit usually just means nothing changed since last flush.
        if !self.run(&["commit", "-m", &self.message]) {
            tracing::debug!("git commit made no commit (likely nothing to commit)");
            return false;
        }
        if !self.run(&["pull", "--rebase"]) {
            tracing::warn!("git pull --rebase failed; pushing anyway");
        }
        self.run(&["push"])
    }

    fn run(&self, args: &[&str]) -> bool {
        match Command::new("git").args(args).current_dir(&self.repo_dir).output() {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                tracing::warn!(
                    args = ?args,
                    status = ?out.status.code(),
                    stderr = %stderr.trim(),
                    "git command failed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(args = ?args, error = %e, "could not invoke git");
                false
            }
        }
    }
}
