use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quillr::auth::TokenCodec;
use quillr::config::ServerConfig;
use quillr::oauth::GoogleProvider;
use quillr::server::{AppState, create_router};
use quillr::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "quillr")]
#[command(about = "A blogging backend with Google sign-in", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Mint a session credential for an existing user
    IssueToken {
        /// Id of the user the credential is issued for
        #[arg(long)]
        user_id: i64,

        /// Data directory holding the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Secret used to sign session credentials
        #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
        secret_key: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, short, default_value = "8000")]
    port: u16,

    /// Data directory for the database
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Externally reachable base URL (e.g., "https://api.quillr.app").
    /// Used to build the Google callback URL.
    #[arg(long, env = "BASE_URL")]
    base_url: String,

    /// Frontend origin. Allowed for CORS and used as the post-login redirect target.
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: String,

    /// Secret used to sign session credentials
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    google_client_secret: String,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            data_dir: args.data_dir.into(),
            base_url: args.base_url,
            frontend_url: args.frontend_url,
            secret_key: args.secret_key,
            google_client_id: args.google_client_id,
            google_client_secret: args.google_client_secret,
        }
    }
}

fn run_issue_token(user_id: i64, data_dir: String, secret_key: String) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir: data_dir.into(),
        ..ServerConfig::default()
    };

    if !config.db_path().exists() {
        bail!("No database at {}. Start the server once first.", config.db_path().display());
    }

    let store = SqliteStore::new(config.db_path())?;
    if store.get_user(user_id)?.is_none() {
        bail!("User {user_id} does not exist");
    }

    let codec = TokenCodec::new(secret_key.as_bytes())?;
    let credential = codec.issue(user_id, Utc::now())?;

    println!();
    println!("========================================");
    println!("Session token for user {user_id} (valid {} days):", codec.ttl().num_days());
    println!();
    println!("  {credential}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let config = config.validate()?;

    fs::create_dir_all(&config.data_dir)?;
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let codec = TokenCodec::new(config.secret_key.as_bytes())?;
    let provider = GoogleProvider::new(config.google())?;

    let state = Arc::new(AppState::new(
        Arc::new(store),
        codec,
        Arc::new(provider),
        config.frontend_url.clone(),
    ));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Database at {}", config.db_path().display());
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quillr=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::IssueToken {
                user_id,
                data_dir,
                secret_key,
            } => {
                run_issue_token(user_id, data_dir, secret_key)?;
            }
        },
        Commands::Serve(args) => {
            run_serve(args.into()).await?;
        }
    }

    Ok(())
}
