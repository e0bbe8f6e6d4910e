//! ghauth CLI - GitHub authentication from the terminal
//!
//! This binary can:
//! - Authenticate using the OAuth device flow
//! - Verify a personal access token
//! - List and create repositories
//! - Show trending repositories

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ghauth_core::api::{self, ApiConfig, GitHubClient, NewRepository};
use ghauth_core::auth::{Credentials, DeviceFlow, DeviceFlowEvent, DeviceFlowOutcome};
use output::Printer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ghauth")]
#[command(version)]
#[command(about = "Authenticate against GitHub and manage repositories")]
#[command(long_about = "
ghauth signs in to GitHub with either a personal access token or the OAuth
device flow, then talks to the REST API with the resulting credential.

Quick start:
  1. Sign in:          ghauth login
  2. Check the token:  GITHUB_TOKEN=... ghauth whoami
  3. List repos:       ghauth repos --owner octocat

Settings are read from the environment, ./config.env and
~/.config/ghauth/config.toml (see: ghauth config).
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Token to use instead of GITHUB_TOKEN / the config file
    #[arg(long, global = true)]
    pub token: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with the OAuth device flow and verify the new token
    Login {
        /// Space separated scopes to request
        #[arg(short, long)]
        scopes: Option<String>,

        /// Don't try to open the verification page in a browser
        #[arg(long)]
        no_browser: bool,

        /// OAuth App client ID (overrides GITHUB_CLIENT_ID)
        #[arg(long)]
        client_id: Option<String>,

        /// Print the new access token after signing in
        #[arg(long)]
        show_token: bool,
    },

    /// Verify the configured token and show the user it belongs to
    #[command(alias = "verify")]
    Whoami,

    /// List repositories
    Repos {
        /// List this user's public repositories instead of your own
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Create a repository for the authenticated user
    Create {
        name: String,

        /// Make the repository private
        #[arg(short, long)]
        private: bool,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show the most starred repositories created recently
    Trending {
        /// Look back this many days
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// Number of repositories to show
        #[arg(short, long, default_value = "10")]
        top: u8,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(cli.verbose).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = api::load_api_config();
    if cli.token.is_some() {
        config.token = cli.token;
    }
    tracing::debug!("Resolved configuration: {:?}", config);

    let printer = Printer::new(cli.format);

    match cli.command {
        Commands::Login {
            scopes,
            no_browser,
            client_id,
            show_token,
        } => {
            if client_id.is_some() {
                config.client_id = client_id;
            }
            if let Some(scopes) = scopes {
                config.scopes = scopes;
            }
            cmd_login(&printer, &config, !no_browser, show_token).await
        }
        Commands::Whoami => cmd_whoami(&printer, &config).await,
        Commands::Repos { owner } => cmd_repos(&printer, &config, owner.as_deref()).await,
        Commands::Create {
            name,
            private,
            description,
        } => {
            let repo = NewRepository::new(name)
                .private(private)
                .description(description);
            cmd_create(&printer, &config, &repo).await
        }
        Commands::Trending { days, top } => cmd_trending(&printer, &config, days, top).await,
        Commands::Config => cmd_config(&printer, &config),
    }
}

fn default_log_filter(verbose: bool) -> String {
    let log_level = if verbose { "debug" } else { "info" };
    format!("ghauth={},ghauth_core={}", log_level, log_level)
}

#[derive(Debug, PartialEq)]
enum Interrupt {
    CancelFlow,
    Exit,
}

/// Routes Ctrl-C into the device flow's cancellation token while the flow
/// runs. Once `finish` is called, Ctrl-C exits the process instead.
///
/// tokio keeps its SIGINT handler installed for the life of the process,
/// so the listener must stay alive after the flow ends or the signal is
/// silently swallowed.
struct InterruptHandler {
    finished: CancellationToken,
    listener: JoinHandle<()>,
}

impl InterruptHandler {
    fn install(cancel: CancellationToken) -> Self {
        let finished = CancellationToken::new();
        let done = finished.clone();
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match interrupt_action(&done) {
                    Interrupt::CancelFlow => cancel.cancel(),
                    Interrupt::Exit => std::process::exit(130),
                }
            }
        });
        Self { finished, listener }
    }

    fn finish(&self) {
        self.finished.cancel();
    }
}

fn interrupt_action(finished: &CancellationToken) -> Interrupt {
    if finished.is_cancelled() {
        Interrupt::Exit
    } else {
        Interrupt::CancelFlow
    }
}

fn client(config: &ApiConfig) -> Result<GitHubClient> {
    GitHubClient::new(config, Credentials::from_config(config))
}

async fn cmd_login(
    printer: &Printer,
    config: &ApiConfig,
    open_browser: bool,
    show_token: bool,
) -> Result<()> {
    let flow = DeviceFlow::from_config(config)
        .context("Cannot start device flow")?
        .open_browser(open_browser);

    // Ctrl-C aborts the wait instead of killing the process mid-poll
    let cancel = CancellationToken::new();
    let interrupt = InterruptHandler::install(cancel.clone());

    let outcome = flow
        .authenticate(&cancel, |event| match event {
            DeviceFlowEvent::Prompt(prompt) => printer.login_prompt(&prompt),
            DeviceFlowEvent::BrowserOpened => printer.line("Opening browser..."),
            DeviceFlowEvent::Waiting => printer.waiting(),
            DeviceFlowEvent::Pending | DeviceFlowEvent::SlowDown { .. } => printer.progress(),
        })
        .await;
    interrupt.finish();

    printer.login_outcome(&outcome);

    let DeviceFlowOutcome::Authorized(token) = outcome else {
        std::process::exit(1);
    };

    let client = GitHubClient::new(
        config,
        Credentials::from_token(token.secret()).with_scheme(config.auth_scheme),
    )?;
    let identity = client.verify_identity().await;
    printer.identity(&identity, show_token.then(|| token.secret()));

    Ok(())
}

async fn cmd_whoami(printer: &Printer, config: &ApiConfig) -> Result<()> {
    let identity = client(config)?.verify_identity().await;
    printer.identity(&identity, None);

    if !identity.is_authenticated() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_repos(printer: &Printer, config: &ApiConfig, owner: Option<&str>) -> Result<()> {
    let repos = client(config)?.list_repositories(owner).await;
    printer.repositories(&repos);
    Ok(())
}

async fn cmd_create(printer: &Printer, config: &ApiConfig, repo: &NewRepository) -> Result<()> {
    match client(config)?.create_repository(repo).await {
        Ok(created) => {
            printer.created(&created);
            Ok(())
        }
        Err(e) => {
            printer.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn cmd_trending(printer: &Printer, config: &ApiConfig, days: u32, top: u8) -> Result<()> {
    match client(config)?.trending_repositories(days, top).await {
        Ok(repos) => {
            printer.trending(days, &repos);
            Ok(())
        }
        Err(e) => {
            printer.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn cmd_config(printer: &Printer, config: &ApiConfig) -> Result<()> {
    printer.config(
        config,
        &api::config::get_config_file_path_string(),
        &api::config::generate_example_config(),
    );
    Ok(())
}
