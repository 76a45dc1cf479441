use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::stencil::Range;

/// A file at one commit of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    pub owner: String,
    pub repo: String,
    pub commit: String,
    pub path: String,
}

impl FileIdentity {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        commit: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            commit: commit.into(),
            path: path.into(),
        }
    }

    /// Same repository and path, ignoring the commit.
    pub fn same_path(
        &self,
        other: &FileIdentity,
    ) -> bool {
        self.owner == other.owner && self.repo == other.repo && self.path == other.path
    }

    pub fn at(
        &self,
        range: Range,
    ) -> LocatedRange {
        LocatedRange {
            file: self.clone(),
            range,
        }
    }

    pub fn repo_commit(&self) -> RepoCommit {
        RepoCommit::new(self.owner.clone(), self.repo.clone(), self.commit.clone())
    }

    /// Permalink to a line of this file on github.com.
    pub fn line_url(
        &self,
        line: u32,
    ) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}#L{}",
            self.owner,
            self.repo,
            self.commit,
            self.path,
            u64::from(line) + 1
        )
    }
}

impl Display for FileIdentity {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}/{}@{}:{}", self.owner, self.repo, short_commit(&self.commit), self.path)
    }
}

/// One commit of one repository, without a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCommit {
    pub owner: String,
    pub repo: String,
    pub commit: String,
}

impl RepoCommit {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            commit: commit.into(),
        }
    }
}

impl Display for RepoCommit {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, short_commit(&self.commit))
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

/// A [`Range`] inside a specific file.
///
/// Serialized flat, the way the backend sends it:
/// `{owner, repo, commit, path, line, characterStart, characterEnd}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatedRange {
    #[serde(flatten)]
    pub file: FileIdentity,
    #[serde(flatten)]
    pub range: Range,
}

impl Display for LocatedRange {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}",
            self.file,
            self.range.line,
            self.range.character_start,
            self.range.character_end
        )
    }
}

/// Resolution result for a position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<LocatedRange>,
    #[serde(default)]
    pub references: Vec<LocatedRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<String>,
}

impl Symbol {
    /// Definition followed by every reference.
    pub fn occurrences(&self) -> impl Iterator<Item = &LocatedRange> {
        self.definition.iter().chain(self.references.iter())
    }

    /// Whether `range` is this symbol's definition site.
    pub fn is_defined_at(
        &self,
        range: &LocatedRange,
    ) -> bool {
        self.definition.as_ref().is_some_and(|definition| definition == range)
    }
}

/// What the symbol cache stores: `None` when nothing is at the position.
pub type SymbolValue = Option<Arc<Symbol>>;

/// Cache key for a symbol lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    pub range: LocatedRange,
    /// Branch or pull ref the commit was reached through, if any.
    pub git_ref: Option<String>,
}

impl SymbolKey {
    pub fn new(
        range: LocatedRange,
        git_ref: Option<String>,
    ) -> Self {
        Self {
            range,
            git_ref,
        }
    }
}

impl Display for SymbolKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.git_ref {
            Some(git_ref) => write!(f, "{} ({git_ref})", self.range),
            None => write!(f, "{}", self.range),
        }
    }
}

/// Keys known to resolve to `value` once `key` has been loaded.
///
/// Every occurrence of a symbol (definition and references) yields the same
/// symbol, so each becomes an alias. The request's ref is carried over so
/// aliases compare equal to keys callers build for the same view.
pub fn symbol_aliases(
    key: &SymbolKey,
    value: &SymbolValue,
) -> Vec<SymbolKey> {
    let Some(symbol) = value else {
        return Vec::new();
    };
    symbol
        .occurrences()
        .filter(|occurrence| **occurrence != key.range)
        .map(|occurrence| SymbolKey::new(occurrence.clone(), key.git_ref.clone()))
        .collect()
}
