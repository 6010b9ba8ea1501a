pub mod app;
pub mod blob;
pub mod config;
mod http_api;
pub mod in_process;
pub mod locale;
pub mod seed;
mod server_security;
pub mod sessions;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use kata_protocol::serialize_json;
use kata_rpc::{DbHandle, MemoryDatabase, RpcService};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::blob::SignedUrlStore;
use crate::config::{ExecutionMode, ServerConfig, SupportedLocales, UPLOAD_SECRET_ENV};
use crate::http_api::HttpState;

const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "kata")]
#[command(about = "Exercise backend served over a typed RPC pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the RPC API over HTTP
    Serve(ServeArgs),
    /// Print the procedure listing as JSON
    Procedures,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:3000
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Allow binding to non-loopback addresses
    #[arg(long)]
    public: bool,

    /// Execution mode (env: KATA_MODE); development logs every call
    #[arg(long, value_enum)]
    mode: Option<ExecutionMode>,

    /// Comma-separated locales accepted by /api/locale
    #[arg(long, default_value = "en,de,fr")]
    locales: String,

    /// Base URL of the blob storage service that verifies upload URLs
    #[arg(long, default_value = "http://127.0.0.1:9000/blobs")]
    upload_base_url: String,

    /// Secret shared with the blob storage service (env: KATA_UPLOAD_SECRET)
    #[arg(long)]
    upload_secret: Option<String>,

    /// Load demo users and exercises and print their session tokens
    #[arg(long)]
    seed: bool,
}

impl ServeArgs {
    fn into_config(self) -> Result<ServerConfig> {
        let upload_secret = match self
            .upload_secret
            .or_else(|| std::env::var(UPLOAD_SECRET_ENV).ok())
            .filter(|s| !s.trim().is_empty())
        {
            Some(secret) => secret,
            None => {
                log::warn!(
                    "No upload secret configured ({UPLOAD_SECRET_ENV}); using a random one. Upload URLs will not verify across restarts."
                );
                server_security::random_hex(32)?
            }
        };
        Ok(ServerConfig {
            bind: self.bind,
            public: self.public,
            mode: ExecutionMode::resolve(self.mode)?,
            locales: SupportedLocales::parse(&self.locales)?,
            upload_base_url: self.upload_base_url,
            upload_secret,
            seed: self.seed,
        })
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Serve(args) => serve(args.into_config()?).await?,
        Commands::Procedures => print_procedures()?,
    }
    Ok(())
}

/// The HTTP surface (`/rpc`, `/health`, `/api/locale`) over a built service.
pub fn http_router(service: RpcService, locales: SupportedLocales) -> axum::Router {
    http_api::router(Arc::new(HttpState { service, locales }))
}

fn new_database() -> DbHandle {
    Arc::new(MemoryDatabase::with_tables(app::models::TABLES))
}

fn print_procedures() -> Result<()> {
    let blobs = Arc::new(SignedUrlStore::new("http://localhost", "listing", UPLOAD_URL_TTL));
    let service = app::build_service(new_database(), blobs, false)?;
    let listing = service.listing(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    print_stdout(&serialize_json(&listing)?)
}

async fn serve(config: ServerConfig) -> Result<()> {
    let addrs = server_security::resolve_guarded_bind_addrs(&config.bind, config.public).await?;

    let db = new_database();
    if config.seed {
        let tokens = seed::seed_demo(&db).await.context("Failed to seed demo data")?;
        print_stdout(&format!("Demo admin token: {}", tokens.admin))?;
        print_stdout(&format!("Demo member token: {}", tokens.member))?;
    }

    let blobs = Arc::new(SignedUrlStore::new(
        config.upload_base_url.clone(),
        config.upload_secret.clone(),
        UPLOAD_URL_TTL,
    ));
    let service = app::build_service(db, blobs, config.mode.logs_calls())
        .context("Failed to build procedure router")?;
    log::info!(
        "mode={} procedures={} locales={}",
        config.mode.as_str(),
        service.router().len(),
        config.locales.codes().join(",")
    );

    let app = http_router(service, config.locales);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving RPC API: {base_url}/rpc"))?;
    print_stdout(&format!("Health endpoint: {base_url}/health"))?;
    if config.public {
        let addrs = addrs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        print_stdout(&format!(
            "Public bind enabled (--public). Resolved addresses: {addrs}"
        ))?;
    }
    print_stdout(&format!("Try: curl {base_url}/rpc"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
