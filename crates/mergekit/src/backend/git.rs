//! git backend implementation.
//!
//! Shells out to the `git` CLI. Path listings use `-z` output so file names
//! with spaces, quotes or non-ASCII characters survive intact, and file
//! contents are read as raw bytes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};
use crate::types::Revision;

use super::Backend;

/// Backend implementation using the git CLI.
#[derive(Debug, Clone)]
pub struct GitBackend {
    program: String,
}

impl GitBackend {
    /// Create a new GitBackend.
    ///
    /// Returns an error if git is not on PATH.
    pub fn new() -> Result<Self> {
        if !Self::is_available() {
            return Err(Error::ToolNotFound("git".to_string()));
        }
        Ok(Self {
            program: "git".to_string(),
        })
    }

    /// Check if git is available on this system.
    pub fn is_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn output<I, S>(&self, repo: &Path, args: I) -> Result<(String, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let args: Vec<std::ffi::OsString> =
            args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let command = format!(
            "git {}",
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        log::trace!("Running `{command}` in {}", repo.display());

        let output = Command::new(&self.program)
            .arg("-c")
            .arg("core.quotepath=off")
            .args(&args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound("git".to_string())
                } else {
                    Error::Io(e)
                }
            })?;
        Ok((command, output))
    }

    /// Run git and return raw stdout, failing on a non-zero exit
    fn run<I, S>(&self, repo: &Path, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let (command, output) = self.output(repo, args)?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(Error::Command {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run git and return trimmed stdout as text
    fn run_text<I, S>(&self, repo: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let stdout = self.run(repo, args)?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    // ========================================================================
    // Repository plumbing used by the import workflow
    // ========================================================================

    /// Make sure a local mirror of `url` exists at `path` and is
    /// fast-forwarded to the remote tip.
    pub fn clone_or_update(&self, url: &str, path: &Path) -> Result<()> {
        if path.join(".git").exists() {
            log::info!("Updating upstream cache at {}", path.display());
            self.run(path, ["pull", "--ff-only", "--quiet"])?;
            return Ok(());
        }

        let parent = path
            .parent()
            .ok_or_else(|| Error::OutsideWorkTree(path.to_path_buf()))?;
        fs::create_dir_all(parent)?;
        log::info!("Cloning {url} into {}", path.display());
        self.run(
            parent,
            [
                std::ffi::OsStr::new("clone"),
                std::ffi::OsStr::new("--quiet"),
                std::ffi::OsStr::new(url),
                path.as_os_str(),
            ],
        )?;
        Ok(())
    }

    /// Write a tar archive of `treeish` to `dest`
    pub fn archive(&self, repo: &Path, treeish: &str, dest: &Path) -> Result<()> {
        self.run(
            repo,
            [
                std::ffi::OsStr::new("archive"),
                std::ffi::OsStr::new("--format=tar"),
                std::ffi::OsStr::new("-o"),
                dest.as_os_str(),
                std::ffi::OsStr::new(treeish),
            ],
        )?;
        Ok(())
    }

    /// Root of the working tree containing `path`.
    ///
    /// When `path` is inside a submodule, the superproject root is returned.
    pub fn toplevel(&self, path: &Path) -> Result<PathBuf> {
        let super_root = self
            .run_text(path, ["rev-parse", "--show-superproject-working-tree"])
            .unwrap_or_default();
        if !super_root.is_empty() {
            return Ok(PathBuf::from(super_root));
        }
        let root = self.run_text(path, ["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(root))
    }

    /// Name of the checked-out branch (empty when detached)
    pub fn current_branch(&self, repo: &Path) -> Result<String> {
        self.run_text(repo, ["branch", "--show-current"])
    }

    /// Returns true if the local branch `branch` exists
    pub fn branch_exists(&self, repo: &Path, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.run(repo, ["rev-parse", "--verify", "--quiet", reference.as_str()])
            .is_ok()
    }

    /// URL of `remote`, if configured
    pub fn remote_url(&self, repo: &Path, remote: &str) -> Option<String> {
        self.run_text(repo, ["remote", "get-url", remote])
            .ok()
            .filter(|url| !url.is_empty())
    }

    /// Paths with uncommitted changes (including untracked files)
    pub fn dirty_paths(&self, repo: &Path) -> Result<Vec<String>> {
        let stdout = self.run(repo, ["status", "--porcelain", "-z"])?;
        let mut paths = Vec::new();
        let mut fields = stdout.split(|b| *b == 0).filter(|f| !f.is_empty());
        while let Some(entry) = fields.next() {
            let entry = String::from_utf8_lossy(entry);
            let status = entry.get(..2).unwrap_or_default().to_string();
            let path = entry.get(3..).unwrap_or_default().to_string();
            // Renames and copies carry the original path in the next field
            if status.starts_with('R') || status.starts_with('C') {
                fields.next();
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Switch to `branch`, creating or resetting it first when `create` is set
    pub fn checkout_branch(&self, repo: &Path, branch: &str, create: bool) -> Result<()> {
        if create {
            self.run(repo, ["checkout", "--quiet", "-B", branch])?;
        } else {
            self.run(repo, ["checkout", "--quiet", branch])?;
        }
        Ok(())
    }

    /// Stage every change in the working tree except the `exclude` paths
    pub fn add_all(&self, repo: &Path, exclude: &[&str]) -> Result<()> {
        let mut args = vec!["add".to_string(), "--all".to_string(), "--".to_string(), ".".to_string()];
        args.extend(exclude.iter().map(|p| format!(":(exclude){p}")));
        self.run(repo, &args)?;
        Ok(())
    }

    /// Commit staged changes, allowing an empty commit
    pub fn commit(&self, repo: &Path, message: &str) -> Result<()> {
        self.run(repo, ["commit", "--quiet", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Force-push `branch` to `remote`
    pub fn push_force(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(repo, ["push", "--quiet", "-f", remote, branch])?;
        Ok(())
    }
}

impl Backend for GitBackend {
    fn current_revision(&self, repo: &Path) -> Result<Revision> {
        let head = self.run_text(repo, ["rev-parse", "HEAD"])?;
        Revision::new(head).ok_or(Error::NoSnapshot)
    }

    fn read_file_at(
        &self,
        repo: &Path,
        revision: &Revision,
        path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let object = format!("{revision}:{path}");
        let (command, output) = self.output(repo, ["show", object.as_str()])?;
        if output.status.success() {
            return Ok(Some(output.stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") {
            log::debug!("{path} not present at {}", revision.short());
            Ok(None)
        } else {
            Err(Error::Command {
                command,
                stderr: stderr.trim().to_string(),
            })
        }
    }

    fn list_files_at(&self, repo: &Path, revision: &Revision) -> Result<Vec<String>> {
        let stdout = self.run(repo, ["ls-tree", "-r", "-z", "--name-only", revision.as_str()])?;
        Ok(split_nul(&stdout))
    }

    fn diff_paths(&self, repo: &Path, old: &Revision, new: &Revision) -> Result<Vec<String>> {
        let range = format!("{old}..{new}");
        let stdout = self.run(repo, ["diff", "--name-only", "-z", range.as_str()])?;
        Ok(split_nul(&stdout))
    }

    fn checkout_paths(&self, repo: &Path, reference: &str, paths: &[&Path]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&std::ffi::OsStr> = vec![
            std::ffi::OsStr::new("checkout"),
            std::ffi::OsStr::new(reference),
            std::ffi::OsStr::new("--"),
        ];
        args.extend(paths.iter().map(|p| p.as_os_str()));
        self.run(repo, args)?;
        Ok(())
    }

    fn name_status(&self, repo: &Path, from: &str, to: &str) -> Result<Vec<(String, String)>> {
        let range = format!("{from}..{to}");
        let stdout = self.run(repo, ["diff", "--name-status", "-z", range.as_str()])?;
        Ok(parse_name_status(&stdout))
    }
}

/// Split NUL-terminated git output into paths
fn split_nul(stdout: &[u8]) -> Vec<String> {
    stdout
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).to_string())
        .collect()
}

/// Parse `git diff --name-status -z` output.
///
/// Renames and copies (`R100`, `C075`) are followed by two paths; the
/// destination path is reported.
fn parse_name_status(stdout: &[u8]) -> Vec<(String, String)> {
    let fields = split_nul(stdout);
    let mut entries = Vec::new();
    let mut iter = fields.into_iter();
    while let Some(status) = iter.next() {
        let path = if status.starts_with('R') || status.starts_with('C') {
            iter.next();
            iter.next()
        } else {
            iter.next()
        };
        if let Some(path) = path {
            entries.push((status, path));
        }
    }
    entries
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn split_nul_drops_empty_fields() {
        assert_eq!(
            split_nul(b"a.txt\0dir/b c.txt\0\0"),
            vec!["a.txt".to_string(), "dir/b c.txt".to_string()]
        );
        assert!(split_nul(b"").is_empty());
    }

    #[test]
    fn parse_name_status_handles_renames() {
        let raw = b"M\0dot_bashrc\0A\0dot_zshrc\0R100\0old_name\0new_name\0D\0gone\0";
        let parsed = parse_name_status(raw);
        assert_eq!(
            parsed,
            vec![
                ("M".to_string(), "dot_bashrc".to_string()),
                ("A".to_string(), "dot_zshrc".to_string()),
                ("R100".to_string(), "new_name".to_string()),
                ("D".to_string(), "gone".to_string()),
            ]
        );
    }

    fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(repo)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "--quiet"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    fn commit_file(dir: &Path, name: &str, content: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        git(dir, &["add", "--all"]);
        git(dir, &["commit", "--quiet", "-m", name]);
    }

    #[test]
    fn git_backend_reads_history() {
        if !GitBackend::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        let backend = GitBackend::new().unwrap();

        commit_file(repo, ".bashrc", b"one\n");
        let first = backend.current_revision(repo).unwrap();
        commit_file(repo, "bin/tool", b"\0binary");
        commit_file(repo, ".bashrc", b"two\n");
        let second = backend.current_revision(repo).unwrap();
        assert_ne!(first, second);

        let content = backend.read_file_at(repo, &first, ".bashrc").unwrap();
        assert_eq!(content.as_deref(), Some(&b"one\n"[..]));

        let binary = backend.read_file_at(repo, &second, "bin/tool").unwrap();
        assert_eq!(binary.as_deref(), Some(&b"\0binary"[..]));

        let missing = backend.read_file_at(repo, &first, "bin/tool").unwrap();
        assert!(missing.is_none());

        let mut listed = backend.list_files_at(repo, &second).unwrap();
        listed.sort();
        assert_eq!(listed, vec![".bashrc".to_string(), "bin/tool".to_string()]);

        let mut changed = backend.diff_paths(repo, &first, &second).unwrap();
        changed.sort();
        assert_eq!(changed, vec![".bashrc".to_string(), "bin/tool".to_string()]);
    }

    #[test]
    fn git_backend_checkout_paths_from_branch() {
        if !GitBackend::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        let backend = GitBackend::new().unwrap();

        commit_file(repo, "dot_vimrc", b"set nu\n");
        let main = backend.current_branch(repo).unwrap();
        assert!(!backend.branch_exists(repo, "compare"));
        backend.checkout_branch(repo, "compare", true).unwrap();
        assert!(backend.branch_exists(repo, "compare"));
        commit_file(repo, "dot_vimrc", b"set rnu\n");
        backend.checkout_branch(repo, &main, false).unwrap();

        let status = backend.name_status(repo, "HEAD", "compare").unwrap();
        assert_eq!(status, vec![("M".to_string(), "dot_vimrc".to_string())]);

        backend
            .checkout_paths(repo, "compare", &[Path::new("dot_vimrc")])
            .unwrap();
        assert_eq!(fs::read(repo.join("dot_vimrc")).unwrap(), b"set rnu\n");
        assert_eq!(backend.dirty_paths(repo).unwrap(), vec!["dot_vimrc".to_string()]);
    }

    #[test]
    fn git_backend_add_all_honors_exclusions() {
        if !GitBackend::is_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        init_repo(repo);
        let backend = GitBackend::new().unwrap();

        commit_file(repo, "dot_zshrc", b"export A=1\n");
        fs::write(repo.join("dot_zshrc"), b"export A=2\n").unwrap();
        fs::write(repo.join(".dotmerge-revision"), b"abc\n").unwrap();
        fs::create_dir_all(repo.join(".external_sources/dots")).unwrap();
        fs::write(repo.join(".external_sources/dots/file"), b"x").unwrap();

        backend
            .add_all(repo, &[".dotmerge-revision", ".external_sources"])
            .unwrap();
        backend.commit(repo, "Import from dots").unwrap();

        let mut dirty = backend.dirty_paths(repo).unwrap();
        dirty.sort();
        assert_eq!(
            dirty,
            vec![".dotmerge-revision".to_string(), ".external_sources/".to_string()]
        );

        // Nothing staged, still commits
        backend.commit(repo, "Import from dots").unwrap();
    }
}
