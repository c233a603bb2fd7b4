//! labtrack - LabTrack command-line client
//!
//! Signs in against the REST backend, uploads lab reports for analysis, and
//! prints the results. `serve-mock` runs an in-memory backend to talk to.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use labtrack_client::mock_server::{self, MockState};
use labtrack_client::models::SelectedFile;
use labtrack_client::report::ResultsView;
use labtrack_client::workflow::{AnalyzeOutcome, UploadLimits};
use labtrack_client::{ClientContext, EVENT_BUS_CAPACITY};
use labtrack_common::config::{resolve_config, ClientConfig};
use labtrack_common::events::LabEvent;
use labtrack_common::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for `serve-mock --token-lifetime-secs`
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Command-line arguments for labtrack
#[derive(Parser, Debug)]
#[command(name = "labtrack")]
#[command(about = "LabTrack health test result client")]
#[command(version)]
struct Args {
    /// Config file (overrides LABTRACK_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the in-memory mock backend
    ServeMock {
        /// Port to listen on
        #[arg(short, long, default_value = "5780", env = "LABTRACK_MOCK_PORT")]
        port: u16,

        /// Lifetime of issued access tokens, in seconds (at most one year)
        #[arg(
            long,
            default_value = "3600",
            value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_LIFETIME_SECS)
        )]
        token_lifetime_secs: i64,
    },

    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "LABTRACK_PASSWORD")]
        password: String,
    },

    /// Sign out (local session is always cleared)
    Logout,

    /// Show the current session
    Status,

    /// Upload a lab report and print the analysis
    Analyze {
        /// PDF, JPEG, or PNG file
        file: PathBuf,
    },

    /// Print the redirect URL for a social login provider
    SocialUrl {
        provider: String,

        #[arg(long)]
        redirect_uri: String,
    },

    /// Complete a social login from the callback URL
    SocialCallback {
        url: String,

        /// State printed by `social-url`
        #[arg(long)]
        state: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::ServeMock {
            port,
            token_lifetime_secs,
        } => serve_mock(&config, port, token_lifetime_secs).await,
        Command::Login { email, password } => login(&open(config)?, &email, &password).await,
        Command::Logout => logout(&open(config)?).await,
        Command::Status => {
            print_status(&open(config)?);
            Ok(())
        }
        Command::Analyze { file } => analyze(&open(config)?, file).await,
        Command::SocialUrl {
            provider,
            redirect_uri,
        } => {
            let request = open(config)?
                .social
                .authorize_url(&provider, &redirect_uri)?;
            println!("{}", request.url);
            println!("state: {}", request.state);
            Ok(())
        }
        Command::SocialCallback { url, state } => {
            let context = open(config)?;
            context.social.complete(&url, &state)?;
            print_status(&context);
            Ok(())
        }
    }
}

fn open(config: ClientConfig) -> Result<ClientContext> {
    ClientContext::open(config).context("Failed to open session store")
}

async fn serve_mock(config: &ClientConfig, port: u16, token_lifetime_secs: i64) -> Result<()> {
    info!("Starting LabTrack mock backend on port {}", port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let token_lifetime = chrono::Duration::try_seconds(token_lifetime_secs)
        .with_context(|| format!("Token lifetime out of range: {}s", token_lifetime_secs))?;

    let state = MockState::new(
        EventBus::new(EVENT_BUS_CAPACITY),
        UploadLimits::from_config(&config.upload),
    )
    .with_token_lifetime(token_lifetime);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    mock_server::serve(state, addr, shutdown_signal())
        .await
        .context("Mock backend error")
}

async fn login(context: &ClientContext, email: &str, password: &str) -> Result<()> {
    if !context.auth.sign_in(email, password).await {
        bail!("Sign-in failed for {}", email);
    }
    print_status(context);
    Ok(())
}

async fn logout(context: &ClientContext) -> Result<()> {
    if !context.auth.logout().await {
        warn!("Backend logout failed; local session cleared anyway");
    }
    println!("Signed out");
    Ok(())
}

fn print_status(context: &ClientContext) {
    let state = context.auth.get_state();
    if !state.is_authenticated {
        println!("Not signed in");
        return;
    }

    let name = state
        .user
        .as_ref()
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|| "User".to_string());
    println!("Signed in as {}", name);

    let info = context.auth.token_info();
    if let Some(remaining) = info.time_until_expiry {
        println!("Token expires in {} min", remaining.num_minutes());
    }
}

async fn analyze(context: &ClientContext, path: PathBuf) -> Result<()> {
    let workflow = context.workflow();
    let file = SelectedFile::from_path_within(&path, workflow.limits().max_bytes())
        .with_context(|| format!("Failed to read {}", path.display()))?;

    workflow
        .select_file(file)
        .await
        .with_context(|| format!("{} was rejected", path.display()))?;

    let mut events = context.credentials.bus().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let LabEvent::UploadProgress { progress, .. } = event {
                eprint!("\rAnalyzing... {:>3}%", progress);
                if progress >= 100 {
                    eprintln!();
                }
            }
        }
    });

    let outcome = workflow.start_analysis().await;
    progress.abort();
    workflow.unmount().await;

    match outcome? {
        AnalyzeOutcome::Completed(result) => {
            print!("{}", ResultsView::from(&result).render_text());
            Ok(())
        }
        AnalyzeOutcome::AuthRequired { .. } => {
            bail!("Sign in first: labtrack login --email <EMAIL> --password <PASSWORD>")
        }
        AnalyzeOutcome::Failed { message } => bail!("Analysis failed: {}", message),
        AnalyzeOutcome::Superseded => bail!("Analysis was interrupted"),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifetime_is_bounded() {
        let parse = |secs: &str| {
            Args::try_parse_from(["labtrack", "serve-mock", "--token-lifetime-secs", secs])
        };

        assert!(parse("3600").is_ok());
        assert!(parse("0").is_err());
        assert!(parse("-5").is_err());
        assert!(parse("9223372036854775807").is_err());
    }

    #[test]
    fn test_analyze_takes_a_path() {
        let args = Args::try_parse_from(["labtrack", "analyze", "result.pdf"]).unwrap();
        assert!(matches!(args.command, Command::Analyze { file } if file == PathBuf::from("result.pdf")));
    }
}
