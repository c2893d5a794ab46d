use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dns_warden::clients::{ChatJudge, HttpScorer};
use dns_warden::config::Config;
use dns_warden::engine::{Arbiter, ClassifierDispatcher, HttpEvidence, IgnoreCache};
use dns_warden::init::{init_verdict_db, init_verdict_logger, setup_logging};
use dns_warden::queue::LineQueue;
use dns_warden::reconcile::Reconciler;
use dns_warden::stats::DispatchStats;
use dns_warden::store::StoreSet;
use dns_warden::Domain;

#[derive(Parser)]
#[command(name = "dns-warden", version, about = "DNS domain reputation pipeline")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify domain events read from the queue (one per line on stdin)
    Dispatch,
    /// Run one arbitration pass over the Suspect store
    Arbitrate,
    /// Rebuild the Final block list from remote and local signals
    Reconcile,
    /// Show where a domain currently stands
    Check {
        domain: String,
        /// Number of recorded verdicts to show
        #[arg(long, default_value_t = 5)]
        history: usize,
    },
    /// Mark a domain safe
    Allow { domain: String },
    /// Mark a domain unsafe
    Block { domain: String },
    /// Return a domain to the unclassified state
    Forget { domain: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = if config_exists {
        Config::load(&cli.config).await?
    } else {
        Config::default()
    };

    setup_logging(&config);
    if !config_exists {
        info!("Config file {} not found, using defaults.", cli.config.display());
    }

    let stores = StoreSet::from_config(&config.stores);
    stores.ensure_dir()?;

    match cli.command {
        Command::Dispatch => dispatch(&config, stores).await,
        Command::Arbitrate => arbitrate(&config, stores).await,
        Command::Reconcile => reconcile(&config, stores).await,
        Command::Check { domain, history } => check(&config, &stores, &domain, history),
        Command::Allow { domain } => {
            let domain = parse_domain(&domain)?;
            stores.allow(&domain)?;
            println!("{domain} moved to whitelist");
            Ok(())
        }
        Command::Block { domain } => {
            let domain = parse_domain(&domain)?;
            stores.block(&domain)?;
            println!("{domain} moved to blacklist");
            Ok(())
        }
        Command::Forget { domain } => {
            let domain = parse_domain(&domain)?;
            if stores.forget(&domain)? {
                println!("{domain} forgotten");
            } else {
                println!("{domain} was not classified");
            }
            Ok(())
        }
    }
}

fn parse_domain(raw: &str) -> Result<Domain> {
    Domain::parse(raw).with_context(|| format!("'{raw}' is not a valid domain name"))
}

/// Cancels the returned token on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            trigger.cancel();
        }
    });
    token
}

async fn dispatch(config: &Config, stores: StoreSet) -> Result<()> {
    if config.dispatcher.queue != "stdin" {
        bail!("unsupported queue transport '{}'", config.dispatcher.queue);
    }

    let scorer = HttpScorer::connect(&config.scorer).await?;
    let stats = DispatchStats::new(&config.stats);
    let cache = IgnoreCache::new(
        stores.clone(),
        Duration::from_secs(config.dispatcher.cache_refresh_secs),
    );

    let mut dispatcher = ClassifierDispatcher::new(
        LineQueue::stdin(),
        Arc::new(scorer),
        cache,
        stores.suspect.clone(),
        (&config.dispatcher).into(),
        stats,
    );
    dispatcher.run(shutdown_token()).await?;
    Ok(())
}

async fn arbitrate(config: &Config, stores: StoreSet) -> Result<()> {
    let judge = ChatJudge::from_env(&config.judge)?;
    let evidence = HttpEvidence::new(&config.arbiter).context("building evidence client")?;
    let (verdicts, _db) = init_verdict_logger(config);

    let arbiter = Arbiter::new(
        stores,
        Arc::new(evidence),
        Arc::new(judge),
        (&config.arbiter).into(),
    )
    .with_verdict_logger(verdicts.clone());

    let outcome = arbiter.run_pass(&shutdown_token()).await;
    drop(arbiter);
    verdicts.shutdown().await;

    let report = outcome?;
    info!(
        "Arbiter pass: {} whitelisted, {} blacklisted, {} retained ({} already listed)",
        report.whitelisted.len(),
        report.blacklisted.len(),
        report.retained.len(),
        report.settled
    );
    Ok(())
}

async fn reconcile(config: &Config, stores: StoreSet) -> Result<()> {
    let reconciler =
        Reconciler::from_config(&config.reconciler, stores).context("building HTTP client")?;
    let report = reconciler.run(&shutdown_token()).await?;
    for (name, count) in &report.sources_ok {
        info!("  {}: {} domains", name, count);
    }
    if !report.sources_failed.is_empty() {
        info!("  failed: {}", report.sources_failed.join(", "));
    }
    Ok(())
}

fn check(config: &Config, stores: &StoreSet, raw: &str, history: usize) -> Result<()> {
    let domain = parse_domain(raw)?;
    let placement = stores.locate(&domain)?;

    let state = match (placement.whitelist, placement.blacklist, placement.suspect) {
        (true, _, _) => "SAFE (whitelisted)",
        (_, true, _) => "UNSAFE (blacklisted)",
        (_, _, true) => "SUSPECT (awaiting arbitration)",
        _ => "unclassified",
    };
    println!("{domain}: {state}");
    println!(
        "  final block list: {}",
        if placement.final_list { "blocked" } else { "not blocked" }
    );

    if history > 0 && Path::new(&config.logging.sqlite_path).exists() {
        if let Some(db) = init_verdict_db(config) {
            let totals = db.counts()?;
            println!(
                "  arbiter totals: {} safe, {} unsafe, {} retried",
                totals.whitelisted, totals.blacklisted, totals.retained
            );
            for record in db.history(domain.as_str(), history)? {
                let at = chrono::DateTime::from_timestamp(record.timestamp, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!(
                    "  {at} {} after {} attempt(s): {}",
                    record.action, record.attempts, record.evidence
                );
            }
        }
    }
    Ok(())
}
