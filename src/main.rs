//! Shardeum Ledger - command line entry point
//!
//! Connects a wallet, sends transfers, and keeps a local ledger of the
//! transfers made from this machine with notes, categories and spending
//! analytics.
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::{debug, info};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use shardeum_ledger::view::{
    AnalyticsView, HistoryView, TerminalAnalyticsView, TerminalHistoryView, TerminalWalletView,
    WalletView,
};
use shardeum_ledger::{
    aggregate, category_distribution, category_flows, Annotation, AppConfig, Category,
    LedgerError, LedgerSync, ServiceContainer, TransactionRepository, TransactionStatus,
    WalletSession,
};

const CONFIRMATION_CHECK: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "shardeum-ledger",
    version,
    about = "Personal transaction ledger for a Shardeum wallet"
)]
struct Cli {
    /// Configuration file (default: ./ledger.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect the wallet and switch it to the Shardeum network.
    Connect,
    /// Show the balance of the connected account.
    Balance,
    /// List the ledger entries of the connected account.
    History {
        /// Maximum number of entries (default: history_limit).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Send coins and record the transfer.
    Send(SendArgs),
    /// Set the note or category of a recorded transfer.
    Annotate(AnnotateArgs),
    /// Spending summary of the connected account.
    Analytics {
        /// Print the summary, chart slices and flows as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Estimate the network fee of a transfer.
    Estimate {
        to: String,
        amount: String,
    },
    /// Follow the ledger and print it whenever it changes.
    Watch,
    /// Fold notes kept in the legacy notes entry into the records.
    MigrateNotes,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    to: String,

    /// Amount in whole coins, e.g. 0.5
    amount: String,

    #[arg(long)]
    note: Option<String>,

    /// One of the predefined categories.
    #[arg(long)]
    category: Option<String>,

    /// Return once submitted instead of waiting for the final status.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Transaction hash.
    id: String,

    /// New note, an empty string clears it.
    #[arg(long)]
    note: Option<String>,

    #[arg(long, conflicts_with = "clear_category")]
    category: Option<String>,

    #[arg(long)]
    clear_category: bool,
}

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging with default level of "info"
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = TerminalWalletView::stdout().display_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config);
    info!("Starting Shardeum Ledger v{}", shardeum_ledger::VERSION);

    let container = ServiceContainer::build(config).await?;

    match cli.command {
        Command::Connect => connect(&container).await,
        Command::Balance => balance(&container).await,
        Command::History { limit } => history(&container, limit).await,
        Command::Send(args) => send(&container, args).await,
        Command::Annotate(args) => annotate(&container, args).await,
        Command::Analytics { json } => analytics(&container, json).await,
        Command::Estimate { to, amount } => estimate(&container, &to, &amount).await,
        Command::Watch => watch(&container).await,
        Command::MigrateNotes => migrate_notes(&container).await,
    }
}

/// Session restored from the wallet, as after a page reload.
async fn restored_session(container: &ServiceContainer) -> Option<WalletSession> {
    let session = container.wallet_session();
    let restored = session.restore().await;
    restored.map(|_| session)
}

/// Ledger sync loaded for the restored account. `None` when no wallet is connected.
async fn loaded_sync(container: &ServiceContainer) -> Option<(WalletSession, LedgerSync)> {
    let session = restored_session(container).await?;
    let sync = container.ledger_sync();
    sync.set_address(session.address().await).await;
    Some((session, sync))
}

async fn connect(container: &ServiceContainer) -> Result<()> {
    let session = container.wallet_session();
    let user = session.connect().await?;
    TerminalWalletView::stdout().display_connected(&user, &container.config().network)
}

async fn balance(container: &ServiceContainer) -> Result<()> {
    let view = TerminalWalletView::stdout();
    let session = match restored_session(container).await {
        Some(session) => session,
        None => return view.display_not_connected(),
    };

    session.refresh_balance().await?;
    let user = session.user().await.ok_or(LedgerError::WalletNotConnected)?;
    view.display_balance(&user.address, user.balance, &container.config().network)
}

async fn history(container: &ServiceContainer, limit: Option<usize>) -> Result<()> {
    let view = TerminalHistoryView::stdout();
    let network = &container.config().network;
    let (_session, sync) = match loaded_sync(container).await {
        Some(loaded) => loaded,
        None => return view.display_history(&Default::default(), network),
    };

    let mut snapshot = sync.snapshot().await;
    if let Some(limit) = limit {
        snapshot.transactions.truncate(limit);
    }
    view.display_history(&snapshot, network)
}

async fn send(container: &ServiceContainer, args: SendArgs) -> Result<()> {
    let view = TerminalWalletView::stdout();
    let (_session, sync) = match loaded_sync(container).await {
        Some(loaded) => loaded,
        None => return view.display_not_connected(),
    };

    let mut annotation = Annotation::default();
    if let Some(note) = args.note {
        annotation = annotation.note(note);
    }
    if let Some(category) = args.category {
        annotation = annotation.category(Category::from_str(&category)?);
    }

    let id = match sync
        .send_with_annotation(&args.to, &args.amount, &annotation)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            debug!("Send failed with code {}", e.code());
            let context = if e.is_rejected_before_submission() {
                "Transaction not sent, fix the input and try again"
            } else {
                "Transaction may have been submitted, check `history` before retrying"
            };
            return Err(anyhow::Error::new(e).context(context));
        }
    };
    view.display_sent(&id)?;

    if args.no_wait {
        return Ok(());
    }

    info!("Waiting for confirmation of {}", id);
    let mut revisions = sync.subscribe();
    while sync.pending_confirmations() > 0 {
        // The watcher deregisters after its last revision bump
        let _ = tokio::time::timeout(CONFIRMATION_CHECK, revisions.changed()).await;
    }

    let record = container
        .repository()
        .find_by_id(&id)
        .await?
        .with_context(|| format!("Transaction {} is missing from the ledger", id))?;
    match record.status {
        TransactionStatus::Confirmed => {
            let balance = container.wallet_service().balance(&record.from).await?;
            view.display_balance(&record.from, balance, &container.config().network)
        }
        TransactionStatus::Failed => view.display_error(&format!("Transaction {} failed", id)),
        TransactionStatus::Pending => {
            view.display_error(&format!("Transaction {} is still pending", id))
        }
    }
}

async fn annotate(container: &ServiceContainer, args: AnnotateArgs) -> Result<()> {
    let mut annotation = Annotation::default();
    if let Some(note) = args.note {
        annotation = annotation.note(note);
    }
    if let Some(category) = args.category {
        annotation = annotation.category(Category::from_str(&category)?);
    }
    if args.clear_category {
        annotation = annotation.without_category();
    }
    if annotation.is_empty() {
        anyhow::bail!("Nothing to update, pass --note, --category or --clear-category");
    }

    let sync = container.ledger_sync();
    sync.annotate(&args.id, &annotation).await?;

    let record = container
        .repository()
        .find_by_id(&args.id)
        .await?
        .with_context(|| format!("Unknown transaction {}", args.id))?;
    TerminalHistoryView::stdout().display_annotated(&record)
}

async fn analytics(container: &ServiceContainer, as_json: bool) -> Result<()> {
    let view = TerminalAnalyticsView::stdout();
    let (_session, sync) = match loaded_sync(container).await {
        Some(loaded) => loaded,
        None => return view.display_no_wallet(),
    };

    let snapshot = sync.snapshot().await;
    let owner = snapshot.address.clone().unwrap_or_default();
    let summary = aggregate(&snapshot.transactions, &owner);

    if as_json {
        let document = json!({
            "summary": summary,
            "distribution": category_distribution(&summary),
            "flows": category_flows(&summary),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }
    view.display_analytics(&summary, &container.config().network)
}

async fn estimate(container: &ServiceContainer, to: &str, amount: &str) -> Result<()> {
    let estimate = container.wallet_service().estimate_fee(to, amount).await?;
    TerminalWalletView::stdout().display_fee_estimate(&estimate, &container.config().network)
}

async fn watch(container: &ServiceContainer) -> Result<()> {
    let view = TerminalHistoryView::stdout();
    let network = container.config().network.clone();

    let session = container.wallet_session();
    if session.restore().await.is_none() {
        info!("No wallet connected, waiting for one");
    }

    let mut sync = container.ledger_sync();
    let mut revisions = sync.subscribe();
    sync.start(container.ledger_store().subscribe(), session.subscribe_address());

    info!("Watching the ledger. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = sync.snapshot().await;
                if !snapshot.is_loading {
                    view.display_history(&snapshot, &network)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    sync.stop().await;
    Ok(())
}

async fn migrate_notes(container: &ServiceContainer) -> Result<()> {
    let migrated = container.repository().migrate_legacy_notes().await?;
    TerminalHistoryView::stdout().display_migrated_notes(migrated)
}
