use crate::config::SchedulerSettings;
use crate::traits::AccountProcessor;
use crate::workflow::{AccountReport, AccountStatus, WorkflowStatus};
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Walks the account list, one [`AccountProcessor::process`] per account.
pub struct Scheduler {
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    /// Token cancelled on Ctrl+C.
    pub fn shutdown_on_ctrl_c() -> CancellationToken {
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Received Ctrl+C. Initiating graceful shutdown...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        token
    }

    /// One pass over every account. Reports come back in file order.
    ///
    /// With `concurrency == 1` accounts run strictly one after another.
    /// Cancellation is only observed before an account starts: accounts
    /// already running finish their workflows, the rest are left out of the
    /// returned reports.
    pub async fn run_pass<P>(
        &self,
        processor: &P,
        accounts: &[P::Account],
        token: &CancellationToken,
    ) -> Vec<AccountReport>
    where
        P: AccountProcessor,
    {
        let total = accounts.len();
        let account_delay = Duration::from_secs(self.settings.account_delay_secs);
        let concurrency = self.settings.concurrency.max(1);

        stream::iter(accounts.iter().enumerate())
            .map(|(i, account)| {
                let span = tracing::info_span!("account", index = format!("{}/{}", i + 1, total));
                async move {
                    if token.is_cancelled() {
                        debug!("Shutdown requested, account not started");
                        return None;
                    }
                    let report = processor.process(account).await;
                    if i + 1 < total && !account_delay.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(account_delay) => {}
                        }
                    }
                    Some(report)
                }
                .instrument(span)
            })
            .buffered(concurrency)
            .filter_map(|report| async move { report })
            .collect()
            .await
    }

    /// Repeats passes with the cooldown in between until `token` is cancelled.
    pub async fn run<P>(&self, processor: &P, accounts: &[P::Account], token: CancellationToken)
    where
        P: AccountProcessor,
    {
        let cooldown = Duration::from_secs(self.settings.cooldown_secs);
        let mut pass = 1u64;

        loop {
            info!("Starting pass {} over {} accounts", pass, accounts.len());
            let started = Instant::now();

            let reports = self.run_pass(processor, accounts, &token).await;
            Self::log_summary(&reports, started.elapsed());

            if token.is_cancelled() {
                info!("Worker stopping (cancelled).");
                break;
            }

            info!("All accounts processed. Waiting {}s before the next pass", cooldown.as_secs());
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Worker stopping (cancelled).");
                    break;
                }
                _ = tokio::time::sleep(cooldown) => {}
            }
            pass += 1;
        }

        info!("🛑 Shutdown Complete.");
    }

    pub fn log_summary(reports: &[AccountReport], elapsed: Duration) {
        let aborted_accounts = reports
            .iter()
            .filter(|r| r.status == AccountStatus::Aborted)
            .count();
        let completed: usize = reports.iter().map(|r| r.count(WorkflowStatus::Completed)).sum();
        let skipped: usize = reports.iter().map(|r| r.count(WorkflowStatus::Skipped)).sum();
        let aborted: usize = reports.iter().map(|r| r.count(WorkflowStatus::Aborted)).sum();
        let confirmed: usize = reports.iter().map(AccountReport::confirmed_transactions).sum();

        info!(
            target: "task_result",
            "Pass finished in {:.1}s | Accounts: {} ({} unreachable) | Workflows completed: {} skipped: {} aborted: {} | Confirmed txs: {}",
            elapsed.as_secs_f64(),
            reports.len(),
            aborted_accounts,
            completed,
            skipped,
            aborted,
            confirmed
        );
    }
}
