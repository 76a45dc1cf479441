use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// Failure of a stencil or symbol lookup.
///
/// `Clone` so that one failed load can reject every caller waiting on the
/// same shared cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The backend is still cloning or indexing the commit.
    NotReady,
    /// Binary or otherwise unsupported file; the pipeline gives up silently.
    UnsupportedInput(String),
    /// The backend answered with an error we have no special handling for.
    Backend {
        reason: String,
    },
    /// The backend process could not be launched or talked to.
    Transport {
        command: String,
        reason: String,
    },
    /// The backend answered with something that is not a valid response.
    Decode {
        reason: String,
    },
    /// The load did not finish within the cache's load timeout.
    TimedOut {
        after_ms: u64,
    },
}

impl LookupError {
    /// Map an `{"error": "..."}` message from the backend onto the taxonomy.
    pub fn from_backend_message(message: &str) -> Self {
        match message.trim() {
            "not-ready" => Self::NotReady,
            "unsupported" | "unsupported-input" | "binary" => Self::UnsupportedInput(message.trim().to_string()),
            other => Self::Backend {
                reason: other.to_string(),
            },
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedInput(_))
    }
}

impl Display for LookupError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "not-ready"),
            Self::UnsupportedInput(reason) => write!(f, "unsupported input: {reason}"),
            Self::Backend {
                reason,
            } => write!(f, "backend error: {reason}"),
            Self::Transport {
                command,
                reason,
            } => {
                write!(f, "failed to talk to {command}: {reason}")
            },
            Self::Decode {
                reason,
            } => write!(f, "invalid backend response: {reason}"),
            Self::TimedOut {
                after_ms,
            } => write!(f, "lookup timed out after {after_ms}ms"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Failure to read a `symbol-lens.toml` settings file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        reason: String,
    },
    Parse {
        path: PathBuf,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Read {
                path,
                reason,
            } => {
                write!(f, "failed to read {}: {reason}", path.display())
            },
            Self::Parse {
                path,
                reason,
            } => {
                write!(f, "failed to parse {}: {reason}", path.display())
            },
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
#[path = "../tests/src/error_tests.rs"]
mod tests;
