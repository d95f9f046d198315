use pharos_project::account::{Account, AccountOrchestrator};
use pharos_project::config::PharosConfig;
use pharos_project::task::build_workflows;
use pharos_project::utils::{HttpRpcConnector, NonceTracker, TransactionSubmitter};

use anyhow::Result;
use clap::Parser;
use core_logic::metrics::MetricsCollector;
use core_logic::{
    setup_logger, HttpProbe, HttpServiceConnector, ProxyPool, Scheduler, WalletManager,
};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/pharos/config.toml")]
    config: String,
    /// Run a single pass over the accounts and exit
    #[arg(long)]
    once: bool,
    #[arg(short, long)]
    export_metrics: Option<String>,
    #[arg(long, default_value = "30")]
    metrics_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let config = PharosConfig::load(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", args.config, e))?;
    let _log_guard = setup_logger(&config.log_dir);
    info!("Configuration loaded for chain ID: {}", config.chain_id);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let secrets = match WalletManager::load_secrets(&config.accounts_file) {
        Ok(secrets) => secrets,
        Err(e) => {
            error!("Failed to load accounts: {}", e);
            return Err(e.into());
        }
    };
    let accounts = Account::load_all(&secrets, config.chain_id);
    drop(secrets);
    if accounts.is_empty() {
        error!("No valid private keys in {}", config.accounts_file);
        anyhow::bail!("no usable accounts in {}", config.accounts_file);
    }
    info!("Loaded {} accounts", accounts.len());

    let proxies = if config.proxy.enabled {
        ProxyPool::load(&config.proxy.file)?
    } else {
        ProxyPool::default()
    };
    if !proxies.is_empty() {
        info!("Loaded {} proxies for rotation.", proxies.len());
    }

    let workflows = build_workflows(&config)?;
    info!(
        "Enabled workflows: {}",
        workflows
            .iter()
            .map(|w| w.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let config = Arc::new(config);
    let submitter = Arc::new(TransactionSubmitter::new(
        Arc::new(NonceTracker::new()),
        config.submitter.clone(),
    ));
    let orchestrator = AccountOrchestrator::new(
        config.clone(),
        Arc::new(proxies),
        Box::new(HttpProbe::new(&config.probe)),
        Box::new(HttpRpcConnector::new(
            config.rpc_url.clone(),
            config.chain_id,
            config.http.timeout(),
        )),
        Box::new(HttpServiceConnector::new(config.http.clone())),
        submitter,
        workflows,
    );

    let metrics_task = args.export_metrics.clone().map(|path| {
        let interval_secs = args.metrics_interval.max(1);
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if let Err(e) = MetricsCollector::global().export_to_file(&path).await {
                    error!("Metrics export failed: {}", e);
                }
            }
        })
    });

    let scheduler = Scheduler::new(config.scheduler.clone());
    let token = Scheduler::shutdown_on_ctrl_c();
    if args.once {
        let started = std::time::Instant::now();
        let reports = scheduler.run_pass(&orchestrator, &accounts, &token).await;
        Scheduler::log_summary(&reports, started.elapsed());
    } else {
        scheduler.run(&orchestrator, &accounts, token).await;
    }

    if let Some(task) = metrics_task {
        task.abort();
    }

    if let Some(metrics_path) = args.export_metrics {
        match MetricsCollector::global().export_to_file(&metrics_path).await {
            Ok(_) => info!("Final metrics exported to {}", metrics_path),
            Err(e) => error!("Failed to export final metrics: {}", e),
        }
    }

    Ok(())
}
