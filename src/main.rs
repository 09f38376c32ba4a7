//! Newsdesk - A role-based news publishing service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api::{self, AppState},
    config::Config,
    db::{self, DynDatabasePool},
    models::UserRole,
    services::{create_mailer, DispatchReport, RegisterInput},
};

/// Interval of the session and rate limiter cleanup task
const MAINTENANCE_INTERVAL_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations, then start the HTTP server (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Create an account with any role, admin included
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "reader")]
        role: UserRole,
    },
    /// Run a single notification and newsletter dispatch pass
    Notify,
    /// Check configuration and database connectivity
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let pool = db::create_pool(&config.database).await?;
            migrate(&pool).await?;
            pool.close().await;
            Ok(())
        }
        Command::CreateUser {
            username,
            email,
            password,
            role,
        } => {
            // Account creation signs nothing, so an ephemeral key will do
            config.ensure_secret_key();
            let state = connect(&config).await?;
            let user = state
                .user_service
                .create_user(RegisterInput::new(username, email, password), role)
                .await?;
            println!("Created {} user '{}' (id {})", user.role, user.username, user.id);
            Ok(())
        }
        Command::Notify => {
            config.require_secret_key()?;
            let state = connect(&config).await?;
            let (newsletters, report) = dispatch_once(&state).await?;
            println!(
                "Newsletters sent: {}, emails sent: {}, failed: {}",
                newsletters, report.sent, report.failed
            );
            Ok(())
        }
        Command::Check => check(&config).await,
    }
}

/// Apply migrations first; a failure aborts start-up before the listener binds
async fn serve(mut config: Config) -> Result<()> {
    tracing::info!("Starting Newsdesk...");
    config.ensure_secret_key();

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);
    migrate(&pool)
        .await
        .context("Database migrations failed, refusing to start")?;

    let mailer = create_mailer(&config.email)?;
    tracing::info!("Mailer: {}", mailer.name());
    let state = AppState::new(pool, &config, mailer)?;

    spawn_dispatcher(
        state.clone(),
        Duration::from_secs(config.notifications.poll_interval_secs.max(1)),
    );
    spawn_maintenance(state.clone());

    let app = api::build_router(state.clone(), &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn migrate(pool: &DynDatabasePool) -> Result<()> {
    let applied = db::migrations::run_migrations(pool).await?;
    if applied > 0 {
        tracing::info!("Applied {} migration(s)", applied);
    } else {
        tracing::info!("Database schema is up to date");
    }
    Ok(())
}

/// Connect, migrate and wire the services for one-shot commands
async fn connect(config: &Config) -> Result<AppState> {
    let pool = db::create_pool(&config.database).await?;
    migrate(&pool).await?;
    let mailer = create_mailer(&config.email)?;
    AppState::new(pool, config, mailer)
}

/// Send newsletters that are due, then drain a batch of the outbox
async fn dispatch_once(state: &AppState) -> Result<(usize, DispatchReport)> {
    let newsletters = state.newsletter_service.dispatch_due().await?;
    let report = state.notification_service.dispatch_pending().await?;
    Ok((newsletters, report))
}

fn spawn_dispatcher(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match dispatch_once(&state).await {
                Ok((newsletters, report)) => {
                    if newsletters > 0 || report.sent > 0 || report.failed > 0 {
                        tracing::info!(
                            newsletters,
                            sent = report.sent,
                            failed = report.failed,
                            "Dispatch pass finished"
                        );
                    }
                }
                Err(e) => tracing::error!("Dispatch pass failed: {:#}", e),
            }
        }
    });
}

fn spawn_maintenance(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            state.rate_limiter.cleanup().await;
            match state.user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Removed {} expired session(s)", removed),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });
}

async fn check(config: &Config) -> Result<()> {
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await.context("Database ping failed")?;
    let version = pool.server_version().await?;
    println!("Database: {:?} {}", config.database.driver, version);
    println!(
        "Pending migrations: {}",
        db::migrations::pending_count(&pool).await?
    );
    println!(
        "Mail: {}",
        if config.email.is_smtp_configured() {
            "smtp"
        } else {
            "log"
        }
    );
    if config.require_secret_key().is_err() {
        println!("Warning: no secret key configured, unsubscribe links will not survive a restart");
    }
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
