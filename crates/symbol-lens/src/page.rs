//! Classification of repository page paths.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::{surface::FileRegion, symbols::FileIdentity};

static FULL_SHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("valid sha pattern"));

/// Commit used as the base of a root commit's diff.
pub const EMPTY_TREE_BASE: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// A single file, plain or blame view. On a branch, `file.commit` is the
    /// branch name until [`PageKind::pinned_to`] replaces it with the sha.
    File {
        file: FileIdentity,
        git_ref: Option<String>,
        blame: bool,
    },
    Commit {
        owner: String,
        repo: String,
        sha: String,
    },
    PullRequest {
        owner: String,
        repo: String,
        number: u64,
    },
}

impl PageKind {
    /// Ref that lookups for this page should carry.
    pub fn git_ref(&self) -> Option<String> {
        match self {
            PageKind::File {
                git_ref,
                ..
            } => git_ref.clone(),
            PageKind::Commit {
                ..
            } => None,
            PageKind::PullRequest {
                number,
                ..
            } => Some(pull_ref(*number)),
        }
    }
}

/// Commit named by a permalink href, absolute or path-only:
/// `/OWNER/REPO/(blob|blame|tree|commit)/SHA/...`. `None` unless that is a
/// full sha.
pub fn permalink_commit(href: &str) -> Option<(&str, &str, &str)> {
    let path = match href.strip_prefix("https://").or_else(|| href.strip_prefix("http://")) {
        Some(rest) => rest.find('/').map_or("", |slash| &rest[slash..]),
        None => href,
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let mut parts = path.trim_start_matches('/').split('/');
    let owner = non_empty(parts.next())?;
    let repo = non_empty(parts.next())?;
    if !matches!(parts.next()?, "blob" | "blame" | "tree" | "commit") {
        return None;
    }
    let commit = parts.next().filter(|commit| is_full_sha(commit))?;
    Some((owner, repo, commit))
}

impl PageKind {
    /// Pin a file page reached through a branch to the commit its permalink
    /// names. The branch ref is kept so the backend can still fetch through
    /// it. Other pages, and permalinks for another repository, are left
    /// alone.
    pub fn pinned_to(
        mut self,
        permalink_href: &str,
    ) -> Self {
        if let PageKind::File {
            file,
            ..
        } = &mut self
            && let Some((owner, repo, commit)) = permalink_commit(permalink_href)
        {
            if owner == file.owner && repo == file.repo {
                file.commit = commit.to_string();
            } else {
                warn!("[page] permalink {permalink_href} points at another repository");
            }
        }
        self
    }
}

/// Map a URL path to the kind of page it shows. `None` for pages without
/// code.
pub fn classify(path: &str) -> Option<PageKind> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let mut parts = path.trim_start_matches('/').split('/');
    let owner = non_empty(parts.next())?;
    let repo = non_empty(parts.next())?;
    let kind = parts.next()?;

    match kind {
        "blob" | "blame" => {
            let rev = non_empty(parts.next())?;
            let file_path = parts.collect::<Vec<_>>().join("/");
            if file_path.is_empty() {
                return None;
            }
            Some(PageKind::File {
                file: FileIdentity::new(owner, repo, rev, file_path),
                git_ref: branch_ref(rev),
                blame: kind == "blame",
            })
        },
        "commit" => {
            let sha = non_empty(parts.next())?;
            Some(PageKind::Commit {
                owner: owner.to_string(),
                repo: repo.to_string(),
                sha: sha.to_string(),
            })
        },
        "pull" => {
            let number = parts.next()?.parse::<u64>().ok()?;
            match parts.next()? {
                "files" | "commits" => Some(PageKind::PullRequest {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number,
                }),
                _ => None,
            }
        },
        _ => None,
    }
}

/// `refs/heads/{rev}` unless `rev` is already a full commit sha.
pub fn branch_ref(rev: &str) -> Option<String> {
    if is_full_sha(rev) {
        None
    } else {
        Some(format!("refs/heads/{rev}"))
    }
}

pub fn pull_ref(number: u64) -> String {
    format!("refs/pull/{number}/head")
}

pub fn is_full_sha(rev: &str) -> bool {
    FULL_SHA.is_match(rev)
}

fn non_empty(part: Option<&str>) -> Option<&str> {
    part.filter(|part| !part.is_empty())
}

/// The pair of commits a diff view compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSpec {
    pub base: String,
    pub head: String,
    pub git_ref: Option<String>,
}

impl CommitSpec {
    /// A single commit against its first parent, or the empty tree for a
    /// root commit.
    pub fn for_commit(
        head: impl Into<String>,
        parent: Option<&str>,
    ) -> Self {
        Self {
            base: parent.unwrap_or(EMPTY_TREE_BASE).to_string(),
            head: head.into(),
            git_ref: None,
        }
    }

    pub fn for_pull(
        number: u64,
        base: impl Into<String>,
        head: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
            git_ref: Some(pull_ref(number)),
        }
    }

    /// Region for one file of the diff. Renames give different paths.
    pub fn region(
        &self,
        owner: &str,
        repo: &str,
        base_path: &str,
        head_path: &str,
    ) -> FileRegion {
        FileRegion::diff(
            FileIdentity::new(owner, repo, self.base.clone(), base_path),
            FileIdentity::new(owner, repo, self.head.clone(), head_path),
        )
    }
}

#[cfg(test)]
#[path = "../tests/src/page_tests.rs"]
mod tests;
