//! Upstream stencil and symbol providers.
//!
//! The analysis backend is an external program. [`CommandBackend`] talks to
//! it with one JSON request on stdin and one JSON response on stdout per
//! lookup; tests plug in in-memory providers through the same traits.
//! Besides lookups the backend accepts `touch`, which starts cloning and
//! indexing a commit before anything is looked up in it.

use std::{
    fmt::{Display, Formatter},
    process::Stdio,
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::{
    cache::AliasCache,
    config::BackendSettings,
    error::LookupError,
    stencil::{Position, Stencil},
    symbols::{FileIdentity, RepoCommit, Symbol, SymbolKey, SymbolValue, symbol_aliases},
};

/// Computes the stencil of a file at a commit.
#[async_trait]
pub trait StencilProvider: Send + Sync {
    async fn stencil(
        &self,
        file: &FileIdentity,
        git_ref: Option<&str>,
    ) -> Result<Stencil, LookupError>;
}

/// Resolves the symbol at a position. `Ok(None)` when there is none.
#[async_trait]
pub trait SymbolProvider: Send + Sync {
    async fn symbol_at(
        &self,
        file: &FileIdentity,
        position: Position,
        git_ref: Option<&str>,
    ) -> Result<Option<Symbol>, LookupError>;
}

/// Asks the backend to start preparing a commit. Best effort; callers
/// ignore the result.
#[async_trait]
pub trait CommitWarmer: Send + Sync {
    async fn touch(
        &self,
        commit: &RepoCommit,
        git_ref: Option<&str>,
    ) -> Result<(), LookupError>;
}

/// Cache key for a stencil fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StencilKey {
    pub file: FileIdentity,
    pub git_ref: Option<String>,
}

impl StencilKey {
    pub fn new(
        file: FileIdentity,
        git_ref: Option<String>,
    ) -> Self {
        Self {
            file,
            git_ref,
        }
    }
}

impl Display for StencilKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.git_ref {
            Some(git_ref) => write!(f, "{} ({git_ref})", self.file),
            None => write!(f, "{}", self.file),
        }
    }
}

pub type StencilCache = AliasCache<StencilKey, Arc<Stencil>>;
pub type SymbolCache = AliasCache<SymbolKey, SymbolValue>;

/// Stencil cache backed by `provider`. Stencils have no aliases.
pub fn stencil_cache(
    provider: Arc<dyn StencilProvider>,
    max_in_flight: usize,
) -> StencilCache {
    let cache = AliasCache::new(move |key: StencilKey| {
        let provider = Arc::clone(&provider);
        async move { provider.stencil(&key.file, key.git_ref.as_deref()).await.map(Arc::new) }
    });
    cache.set_max_in_flight(max_in_flight);
    cache
}

/// Symbol cache backed by `provider`. Every occurrence of a loaded symbol
/// becomes an alias of the key that loaded it.
pub fn symbol_cache(
    provider: Arc<dyn SymbolProvider>,
    max_in_flight: usize,
) -> SymbolCache {
    let cache = AliasCache::with_aliases(
        move |key: SymbolKey| {
            let provider = Arc::clone(&provider);
            async move {
                let position = Position::new(key.range.range.line, key.range.range.character_start);
                let symbol = provider.symbol_at(&key.range.file, position, key.git_ref.as_deref()).await?;
                Ok(symbol.map(Arc::new))
            }
        },
        symbol_aliases,
    );
    cache.set_max_in_flight(max_in_flight);
    cache
}

/// Request line written to the backend's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRequest<'a> {
    pub kind: RequestKind,
    #[serde(flatten)]
    pub file: &'a FileIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(rename = "char", skip_serializing_if = "Option::is_none")]
    pub character: Option<u32>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<&'a str>,
}

/// `touch` request: a commit without a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TouchRequest<'a> {
    pub kind: RequestKind,
    #[serde(flatten)]
    pub commit: &'a RepoCommit,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Stencil,
    SymbolAt,
    Touch,
}

#[derive(Debug, Deserialize)]
struct BackendResponse<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Provider that runs an external analysis command per request.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn request<R: Serialize + Sync, T: DeserializeOwned>(
        &self,
        request: &R,
    ) -> Result<Option<T>, LookupError> {
        let payload = serde_json::to_string(request).map_err(|error| LookupError::Decode {
            reason: format!("failed to encode request: {error}"),
        })?;
        debug!("[backend] {} <- {payload}", self.command);

        let stdout = run_backend(&self.command, &self.args, &payload).await?;
        decode_response(&stdout)
    }
}

#[async_trait]
impl StencilProvider for CommandBackend {
    async fn stencil(
        &self,
        file: &FileIdentity,
        git_ref: Option<&str>,
    ) -> Result<Stencil, LookupError> {
        let request = BackendRequest {
            kind: RequestKind::Stencil,
            file,
            line: None,
            character: None,
            git_ref,
        };
        let stencil = self.request::<_, Stencil>(&request).await?;
        Ok(stencil.unwrap_or_default())
    }
}

#[async_trait]
impl SymbolProvider for CommandBackend {
    async fn symbol_at(
        &self,
        file: &FileIdentity,
        position: Position,
        git_ref: Option<&str>,
    ) -> Result<Option<Symbol>, LookupError> {
        let request = BackendRequest {
            kind: RequestKind::SymbolAt,
            file,
            line: Some(position.line),
            character: Some(position.character),
            git_ref,
        };
        self.request::<_, Symbol>(&request).await
    }
}

#[async_trait]
impl CommitWarmer for CommandBackend {
    async fn touch(
        &self,
        commit: &RepoCommit,
        git_ref: Option<&str>,
    ) -> Result<(), LookupError> {
        let request = TouchRequest {
            kind: RequestKind::Touch,
            commit,
            git_ref,
        };
        self.request::<_, serde_json::Value>(&request).await.map(|_| ())
    }
}

/// Parse one backend response. `{"data": null}` and `{}` mean "nothing".
pub(crate) fn decode_response<T: DeserializeOwned>(stdout: &str) -> Result<Option<T>, LookupError> {
    let response: BackendResponse<T> = serde_json::from_str(stdout.trim()).map_err(|error| LookupError::Decode {
        reason: error.to_string(),
    })?;
    if let Some(message) = response.error {
        return Err(LookupError::from_backend_message(&message));
    }
    Ok(response.data)
}

async fn run_backend(
    executable: &str,
    args: &[String],
    input: &str,
) -> Result<String, LookupError> {
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| LookupError::Transport {
            command: executable.to_string(),
            reason: match error.kind() {
                std::io::ErrorKind::NotFound => "command not found".to_string(),
                _ => error.to_string(),
            },
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await.map_err(|error| LookupError::Transport {
            command: executable.to_string(),
            reason: format!("failed to write request: {error}"),
        })?;
        stdin.write_all(b"\n").await.map_err(|error| LookupError::Transport {
            command: executable.to_string(),
            reason: format!("failed to write request: {error}"),
        })?;
    }

    let output = child.wait_with_output().await.map_err(|error| LookupError::Transport {
        command: executable.to_string(),
        reason: error.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(LookupError::Transport {
            command: executable.to_string(),
            reason: if stderr.is_empty() {
                format!("process exited with status {}", output.status)
            } else {
                stderr
            },
        });
    }

    String::from_utf8(output.stdout).map_err(|error| LookupError::Decode {
        reason: format!("backend produced invalid UTF-8 output: {error}"),
    })
}

#[cfg(test)]
#[path = "../tests/src/provider_tests.rs"]
mod tests;
