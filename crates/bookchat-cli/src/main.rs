//! Bookchat CLI - ask questions about your books from the terminal.
//!
//! This is the entry point for the `bookchat` binary.

mod commands;
mod navigator;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bookchat_auth::{AuthConfig, AuthSession, FileTokenStore};
use bookchat_chat::ChatConfig;
use bookchat_client::{ApiClient, ClientConfig};

use navigator::CliNavigator;

/// Token file used when neither `--token-file` nor `BOOKCHAT_TOKEN_FILE` is set,
/// relative to the home directory.
const DEFAULT_TOKEN_FILE: &str = ".bookchat/tokens.json";

/// Bookchat CLI - ask questions about your books.
#[derive(Parser, Debug)]
#[command(name = "bookchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend API URL.
    #[arg(long, env = "BOOKCHAT_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// File holding the session tokens.
    #[arg(long, env = "BOOKCHAT_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Interval between revealed characters, in milliseconds.
    #[arg(long, default_value = "10")]
    reveal_tick_ms: u64,

    /// Ceiling on one answer, in seconds.
    #[arg(long, default_value = "30")]
    timeout_seconds: u64,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session tokens.
    Login {
        /// Account email.
        email: String,
        /// Password (prompted for when omitted).
        #[arg(long, env = "BOOKCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account.
    Register {
        /// Account email.
        email: String,
        /// Display handle.
        username: String,
        /// Full name.
        #[arg(long)]
        full_name: Option<String>,
        /// Password (prompted for when omitted).
        #[arg(long, env = "BOOKCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session tokens.
    Logout,
    /// Show the logged-in account.
    Whoami,
    /// List your books.
    Books,
    /// Print the chat history for a book.
    History {
        /// Book identifier.
        book: String,
    },
    /// Delete the chat history for a book.
    Clear {
        /// Book identifier.
        book: String,
    },
    /// Ask one question and print the answer as it is revealed.
    Ask {
        /// Book identifier.
        book: String,
        /// The question.
        question: String,
    },
    /// Chat interactively about a book.
    Chat {
        /// Book identifier.
        book: String,
    },
}

/// Shared handles built once from the command line.
pub struct Context {
    pub api: ApiClient,
    pub auth_config: AuthConfig,
    pub chat_config: ChatConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let navigator = Arc::new(CliNavigator::new());
    let result = match build_context(&args, Arc::clone(&navigator)) {
        Ok(ctx) => commands::run(&ctx, args.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The navigator already told the user what to do.
            if !navigator.notified() {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging to stderr. `RUST_LOG` wins over `--debug`.
fn init_logging(debug: bool) {
    let default_directive = if debug {
        "bookchat=debug,bookchat_chat=debug,bookchat_client=debug,bookchat_auth=debug,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_context(args: &Args, navigator: Arc<CliNavigator>) -> anyhow::Result<Context> {
    let token_file = resolve_token_file(args.token_file.clone())?;
    tracing::debug!(path = %token_file.display(), "Using token file");

    let session = AuthSession::new(Arc::new(FileTokenStore::new(token_file)));
    let client_config = ClientConfig::new(args.api_url.clone());
    let api = ApiClient::new(&client_config, session, navigator)?;

    Ok(Context {
        auth_config: AuthConfig::new(args.api_url.clone()),
        chat_config: ChatConfig {
            reveal_tick_ms: args.reveal_tick_ms,
            timeout_seconds: args.timeout_seconds,
            ..ChatConfig::default()
        },
        api,
    })
}

fn resolve_token_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let home = std::env::var_os("HOME").ok_or_else(|| {
        anyhow::anyhow!("HOME is not set; pass --token-file or set BOOKCHAT_TOKEN_FILE")
    })?;
    Ok(PathBuf::from(home).join(DEFAULT_TOKEN_FILE))
}
