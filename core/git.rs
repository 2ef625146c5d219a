use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitFileStatus {
    Unmodified,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Untracked,
}

impl fmt::Display for GitFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GitFileStatus::Unmodified => "unmodified",
            GitFileStatus::Modified => "modified",
            GitFileStatus::Added => "added",
            GitFileStatus::Deleted => "deleted",
            GitFileStatus::Renamed => "renamed",
            GitFileStatus::Copied => "copied",
            GitFileStatus::Untracked => "untracked",
        };
        f.write_str(label)
    }
}

pub type GitChanges = HashMap<PathBuf, GitFileStatus>;

#[derive(Debug)]
struct CachedChanges {
    taken_at: Instant,
    changes: GitChanges,
}

/// Per-repository `git status` results, refreshed after `cache_timeout`.
#[derive(Debug)]
pub struct GitStatusProvider {
    cache_timeout: Duration,
    cache: HashMap<PathBuf, CachedChanges>,
}

impl GitStatusProvider {
    pub fn new(cache_timeout: Duration) -> Self {
        Self {
            cache_timeout,
            cache: HashMap::new(),
        }
    }

    pub fn repository_root(&self, path: &Path) -> Result<PathBuf> {
        let stdout = run_git(path, &["rev-parse", "--show-toplevel"])?;
        let root = stdout.trim();
        if root.is_empty() {
            return Err(AppError::Git(format!(
                "'{}' is not inside a git work tree",
                path.display()
            )));
        }
        Ok(PathBuf::from(root))
    }

    /// Changed files of the repository containing `path`, keyed by absolute path.
    pub fn check_changes(&mut self, path: &Path) -> Result<&GitChanges> {
        let root = self.repository_root(path)?;
        let fresh = self
            .cache
            .get(&root)
            .is_some_and(|cached| cached.taken_at.elapsed() < self.cache_timeout);
        if !fresh {
            log::debug!("Running git status in {}", root.display());
            let output = run_git(&root, &["status", "--porcelain"])?;
            let changes = parse_porcelain(&root, &output);
            log::info!("{} changed files in {}", changes.len(), root.display());
            self.cache.insert(
                root.clone(),
                CachedChanges {
                    taken_at: Instant::now(),
                    changes,
                },
            );
        } else {
            log::trace!("Using cached git status for {}", root.display());
        }
        self.cache
            .get(&root)
            .map(|cached| &cached.changes)
            .ok_or_else(|| AppError::Git(format!("no status cached for {}", root.display())))
    }

    pub fn invalidate(&mut self, repo_root: &Path) {
        self.cache.remove(repo_root);
    }
}

pub fn status_of(changes: &GitChanges, path: &Path) -> GitFileStatus {
    changes
        .get(path)
        .copied()
        .unwrap_or(GitFileStatus::Unmodified)
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| AppError::Git(format!("Failed to run git: {}", e)))?;
    if !output.status.success() {
        return Err(AppError::Git(format!(
            "git {} failed in {}: {}",
            args.join(" "),
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `git status --porcelain` (v1) output; paths are relative to `repo_root`.
pub fn parse_porcelain(repo_root: &Path, output: &str) -> GitChanges {
    let mut changes = GitChanges::new();
    for line in output.lines() {
        if line.len() < 4 || !line.is_char_boundary(3) {
            continue;
        }
        let (code, rest) = line.split_at(2);
        let raw_path = &rest[1..];
        let Some(status) = status_from_code(code) else {
            log::trace!("Ignoring porcelain line: {}", line);
            continue;
        };
        let path = match status {
            GitFileStatus::Renamed | GitFileStatus::Copied => raw_path
                .rsplit_once(" -> ")
                .map_or(raw_path, |(_, new)| new),
            _ => raw_path,
        };
        changes.insert(repo_root.join(unquote(path)), status);
    }
    changes
}

fn status_from_code(code: &str) -> Option<GitFileStatus> {
    if code == "??" {
        return Some(GitFileStatus::Untracked);
    }
    if code == "!!" {
        return None;
    }
    code.chars().find(|c| *c != ' ').and_then(|c| match c {
        'M' | 'T' | 'U' => Some(GitFileStatus::Modified),
        'A' => Some(GitFileStatus::Added),
        'D' => Some(GitFileStatus::Deleted),
        'R' => Some(GitFileStatus::Renamed),
        'C' => Some(GitFileStatus::Copied),
        _ => None,
    })
}

/// Undoes git's C-style quoting of unusual paths.
fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    else {
        return path.to_string();
    };
    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        match next {
            b'0'..=b'7' => {
                let digits: Vec<u8> = bytes[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|b| (b'0'..=b'7').contains(*b))
                    .copied()
                    .collect();
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                match u8::try_from(value) {
                    Ok(byte) => out.push(byte),
                    // Above \377 is not a byte escape; keep the text as written.
                    Err(_) => out.extend_from_slice(&bytes[i..i + 1 + digits.len()]),
                }
                i += 1 + digits.len();
            }
            _ => {
                out.push(match next {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    other => other,
                });
                i += 2;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_columns() {
        let root = Path::new("/repo");
        let output = concat!(
            " M src/a.py\n",
            "M  src/b.py\n",
            "A  new.ts\n",
            " D gone.cs\n",
            "?? scratch.py\n",
            "!! ignored.py\n",
        );
        let changes = parse_porcelain(root, output);
        assert_eq!(changes.len(), 5);
        assert_eq!(changes[&root.join("src/a.py")], GitFileStatus::Modified);
        assert_eq!(changes[&root.join("src/b.py")], GitFileStatus::Modified);
        assert_eq!(changes[&root.join("new.ts")], GitFileStatus::Added);
        assert_eq!(changes[&root.join("gone.cs")], GitFileStatus::Deleted);
        assert_eq!(changes[&root.join("scratch.py")], GitFileStatus::Untracked);
    }

    #[test]
    fn renames_are_keyed_by_new_path() {
        let root = Path::new("/repo");
        let changes = parse_porcelain(root, "R  old/x.py -> new/x.py\n");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[&root.join("new/x.py")], GitFileStatus::Renamed);
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        let root = Path::new("/repo");
        let changes = parse_porcelain(root, "?? \"with space/k\\303\\266k.py\"\n");
        assert_eq!(
            changes[&root.join("with space/kök.py")],
            GitFileStatus::Untracked
        );
    }

    #[test]
    fn out_of_range_octal_escape_is_kept() {
        assert_eq!(unquote("\"a\\477b.py\""), "a\\477b.py");
        assert_eq!(unquote("\"\\101\\377x\""), "A\u{FFFD}x");
    }

    #[test]
    fn unknown_paths_are_unmodified() {
        let changes = parse_porcelain(Path::new("/repo"), " M a.py\n");
        assert_eq!(
            status_of(&changes, Path::new("/repo/b.py")),
            GitFileStatus::Unmodified
        );
        assert_eq!(
            status_of(&changes, Path::new("/repo/a.py")),
            GitFileStatus::Modified
        );
    }

    #[test]
    fn non_repository_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut provider = GitStatusProvider::new(Duration::from_secs(300));
        // Fails both when git is missing and when the directory is not a work tree.
        assert!(matches!(
            provider.check_changes(dir.path()),
            Err(AppError::Git(_))
        ));
    }
}
