use anyhow::Context;
use backend_lib::{
    auth::{token_generator::generate_signing_secret, Authenticator, PasswordHasher},
    config::{LogFormat, Settings, DEFAULT_CONFIG_FILE},
    router,
    storage::FlatFileStorage,
    AppState,
};
use clap::{Parser, Subcommand};
use dashkit_common::Role;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "dashkit", version, about = "Session authentication server")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an account in the data directory
    AddUser {
        email: String,
        #[arg(long, default_value_t = Role::User)]
        role: Role,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Hash a password read from stdin
    HashPassword {
        #[arg(long)]
        cost: Option<u8>,
    },
    /// Print a fresh signing secret
    GenSecret,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(Settings::load_from(&cli.config)?).await,
        Command::AddUser {
            email,
            role,
            password,
        } => add_user(Settings::extract_from(&cli.config)?, &email, role, password).await,
        Command::HashPassword { cost } => {
            let settings = Settings::extract_from(&cli.config)?;
            let hasher = PasswordHasher::new(cost.unwrap_or(settings.hash_cost_factor))?;
            println!("{}", hasher.hash(&read_stdin_line()?)?);
            Ok(())
        },
        Command::GenSecret => {
            println!("{}", generate_signing_secret());
            Ok(())
        },
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    init_tracing(&settings);

    let addr = settings.bind_addr;
    let state = Arc::new(AppState::with_flat_file_storage(settings)?);

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_SWEEP);
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });

    let app = router::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn add_user(
    settings: Settings,
    email: &str,
    role: Role,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_stdin_line()?,
    };

    let storage = FlatFileStorage::new(&settings.data_dir)?;
    let authenticator = Authenticator::new(
        Arc::new(storage),
        settings.password_hasher()?,
        settings.session_lifetimes(),
    )
    .with_password_requirements(settings.password_requirements.clone());

    let record = authenticator.register_user(email, &password, role).await?;
    println!("created {} ({}) with id {}", record.identifier, record.role, record.id);
    Ok(())
}

fn read_stdin_line() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
