//! invoice-recovery: HTTP gateway and CSV import CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use invoice_recovery::api::{ApiState, build_router, start_server};
use invoice_recovery::auth::ActorContext;
use invoice_recovery::config::Config;
use invoice_recovery::db::connect_from_config;
use invoice_recovery::recovery::import::{import_rows, parse_csv};
use invoice_recovery::recovery::lifecycle::InvoiceService;
use invoice_recovery::services::{DeliveryRouter, billing_from_config};
use invoice_recovery::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "invoice-recovery", version, about)]
struct Cli {
    /// Settings file (TOML). Environment variables override its values.
    #[arg(long, env = "INVOICE_RECOVERY_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Import invoices from a CSV file into a workspace.
    Import {
        /// Target workspace slug; defaults to the configured workspace.
        #[arg(long)]
        workspace: Option<String>,
        /// Actor recorded on the audit entry.
        #[arg(long)]
        actor: Option<String>,
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "invoice_recovery=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|value| value.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let settings_path = cli.settings.unwrap_or_else(Settings::default_path);
    let config = Config::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;

    let db = connect_from_config(&config.database)
        .await
        .context("opening database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, config).await,
        Command::Import {
            workspace,
            actor,
            file,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let rows = parse_csv(&raw)?;
            let service = InvoiceService::new(db, config.escalation.clone());
            let report = import_rows(
                &service,
                workspace.as_deref(),
                &rows,
                &ActorContext::from_email(actor.as_deref()),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(db: Arc<dyn invoice_recovery::db::Database>, config: Config) -> anyhow::Result<()> {
    let delivery = DeliveryRouter::from_config(&config.sms).context("configuring SMS delivery")?;
    let billing = billing_from_config(&config.billing, &config.gateway.app_url)
        .context("configuring billing")?;
    let state = Arc::new(ApiState::new(db, &config, Arc::new(delivery), billing));

    let router = build_router(
        state,
        config.gateway.auth_token.as_ref(),
        &config.gateway.app_url,
        config.gateway.cors_allow_any,
    );
    let addr = config.gateway.socket_addr()?;
    let handle = start_server(addr, router).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    handle.shutdown().await;
    Ok(())
}
