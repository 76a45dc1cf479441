use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use symbol_lens::{
    CommandBackend, CommitWarmer, ConfigError, FileIdentity, LensSettings, LineMetrics, Position, RepoCommit,
    compose_hover, config::find_config_file, hover_character, lookup_symbol, stencil_cache, symbol_cache,
};

#[derive(Parser, Debug)]
#[command(name = "symbol-lens", version, about)]
struct Args {
    #[arg(long, short)]
    verbose: bool,

    #[arg(long)]
    log_file: Option<String>,

    /// Settings file; defaults to the nearest symbol-lens.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Character index under a horizontal offset into a rendered line.
    Resolve {
        #[arg(long)]
        text: String,
        /// Offset in pixels from where the line's text starts.
        #[arg(long)]
        x: f64,
        #[arg(long)]
        tab_size: Option<u32>,
        #[arg(long)]
        char_width: Option<f64>,
    },
    /// Hover text of the symbol at a position, via the configured backend.
    Lookup {
        /// OWNER/REPO/COMMIT/PATH
        target: String,
        #[arg(long)]
        line: u32,
        #[arg(long = "char")]
        character: u32,
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },
    /// Ask the backend to start preparing a commit.
    Touch {
        /// OWNER/REPO/COMMIT
        target: String,
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },
}

fn default_log_path() -> PathBuf {
    let dir = dirs_or_tmp();
    dir.join("symbol-lens.log")
}

fn dirs_or_tmp() -> PathBuf {
    if let Some(cache) = std::env::var_os("HOME") {
        let dir = PathBuf::from(cache).join(".symbol-lens");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    std::env::temp_dir()
}

fn load_settings(explicit: Option<&Path>) -> Result<LensSettings, ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir().ok().and_then(|cwd| find_config_file(&cwd)),
    };
    match path {
        Some(path) => LensSettings::load_toml(&path),
        None => Ok(LensSettings::default()),
    }
}

fn parse_target(target: &str) -> Option<FileIdentity> {
    let mut parts = target.splitn(4, '/');
    let owner = parts.next().filter(|part| !part.is_empty())?;
    let repo = parts.next().filter(|part| !part.is_empty())?;
    let commit = parts.next().filter(|part| !part.is_empty())?;
    let path = parts.next().filter(|part| !part.is_empty())?;
    Some(FileIdentity::new(owner, repo, commit, path))
}

fn parse_commit(target: &str) -> Option<RepoCommit> {
    let mut parts = target.split('/');
    let owner = parts.next().filter(|part| !part.is_empty())?;
    let repo = parts.next().filter(|part| !part.is_empty())?;
    let commit = parts.next().filter(|part| !part.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(RepoCommit::new(owner, repo, commit))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let loaded = load_settings(args.config.as_deref());
    let settings = loaded.as_ref().cloned().unwrap_or_default();

    let stderr_filter = if args.verbose {
        EnvFilter::new("symbol_lens=debug")
    } else {
        EnvFilter::new(settings.logging.level.as_directive())
    };

    let file_filter = if args.verbose {
        EnvFilter::new("symbol_lens=debug")
    } else {
        EnvFilter::new("symbol_lens=info")
    };

    let log_path = args.log_file.as_ref().map(PathBuf::from).unwrap_or_else(default_log_path);

    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or(Path::new(".")),
        log_path.file_name().unwrap_or(std::ffi::OsStr::new("symbol-lens.log")),
    );

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false).with_target(false).with_filter(file_filter);

    let stderr_layer =
        fmt::layer().with_writer(std::io::stderr).with_ansi(false).with_target(false).with_filter(stderr_filter);

    tracing_subscriber::registry().with(file_layer).with(stderr_layer).init();

    info!("symbol-lens v{}", env!("CARGO_PKG_VERSION"));
    if let Err(error) = loaded {
        warn!("[config] {error}; using defaults");
    }

    match args.command {
        Command::Resolve {
            text,
            x,
            tab_size,
            char_width,
        } => {
            let rendering = &settings.rendering;
            let metrics = LineMetrics::new(
                char_width.unwrap_or(rendering.character_width),
                tab_size.unwrap_or(rendering.tab_size),
            );
            match hover_character(x, &text, metrics) {
                Some(index) => println!("{index}"),
                None => println!("no match"),
            }
            ExitCode::SUCCESS
        },
        Command::Lookup {
            target,
            line,
            character,
            git_ref,
        } => {
            let Some(file) = parse_target(&target) else {
                error!("expected OWNER/REPO/COMMIT/PATH, got {target:?}");
                return ExitCode::FAILURE;
            };
            let backend = Arc::new(CommandBackend::new(&settings.backend));
            let stencils = stencil_cache(backend.clone(), 1);
            let symbols = symbol_cache(backend, settings.cache.max_concurrent_loads);
            stencils.set_load_timeout(Some(settings.cache.load_timeout()));
            symbols.set_load_timeout(Some(settings.cache.load_timeout()));

            let result = lookup_symbol(&stencils, &symbols, &file, Position::new(line, character), git_ref).await;
            stencils.log_stats();
            symbols.log_stats();
            match result {
                Ok(Some((range, symbol))) => {
                    println!("{}", compose_hover(&symbol, &range));
                    ExitCode::SUCCESS
                },
                Ok(None) => {
                    println!("no symbol");
                    ExitCode::SUCCESS
                },
                Err(error) => {
                    error!("lookup failed: {error}");
                    ExitCode::FAILURE
                },
            }
        },
        Command::Touch {
            target,
            git_ref,
        } => {
            let Some(commit) = parse_commit(&target) else {
                error!("expected OWNER/REPO/COMMIT, got {target:?}");
                return ExitCode::FAILURE;
            };
            let backend = CommandBackend::new(&settings.backend);
            match backend.touch(&commit, git_ref.as_deref()).await {
                Ok(()) => {
                    info!("touched {commit}");
                    ExitCode::SUCCESS
                },
                Err(error) => {
                    error!("touch failed: {error}");
                    ExitCode::FAILURE
                },
            }
        },
    }
}
