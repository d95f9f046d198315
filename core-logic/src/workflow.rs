//! # Workflow Engine
//!
//! Sequences one account's protocol workflows:
//!
//! ```text
//! Start -> ConnectivityCheck -> { Ok: EligibilityGate, Fail: Aborted }
//! EligibilityGate -> { all gates pass: StepExecution, else: Skipped }
//! StepExecution -> each step in order -> { fatal failure: Aborted, done: Completed }
//! ```
//!
//! A failing workflow never affects the next workflow of the same account,
//! and nothing here returns an error to the scheduler: every failure ends up
//! in the [`AccountReport`].

use crate::config::{DelayRange, RoundRange};
use crate::error::WorkflowError;
use crate::metrics::MetricsCollector;
use crate::traits::{Gate, GateDecision, Step, StepOutcome};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Named, ordered list of gated steps for one protocol.
///
/// The step list runs `rounds` times back to back; a skip or a fatal failure
/// in any round ends the whole workflow.
pub struct Workflow<Ctx: Sync> {
    name: String,
    gates: Vec<Box<dyn Gate<Ctx>>>,
    steps: Vec<Box<dyn Step<Ctx>>>,
    rounds: RoundRange,
}

impl<Ctx: Sync> Workflow<Ctx> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gates: Vec::new(),
            steps: Vec::new(),
            rounds: RoundRange::ONCE,
        }
    }

    /// Repeats the step list a number of times drawn from `rounds` on every run.
    pub fn repeat(mut self, rounds: RoundRange) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn gate(mut self, gate: impl Gate<Ctx> + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    pub fn step(mut self, step: impl Step<Ctx> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn boxed_step(mut self, step: Box<dyn Step<Ctx>>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rounds(&self) -> RoundRange {
        self.rounds
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Skipped,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStepResult {
    pub step: String,
    pub success: bool,
    pub outcome: Option<StepOutcome>,
    pub failure: Option<WorkflowError>,
}

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub workflow: String,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStepResult>,
    pub reason: Option<String>,
}

impl WorkflowReport {
    pub fn confirmed_transactions(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Some(StepOutcome::Confirmed(_))))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Processed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: String,
    pub status: AccountStatus,
    pub workflows: Vec<WorkflowReport>,
    pub failure: Option<WorkflowError>,
}

impl AccountReport {
    pub fn aborted(account: &str, failure: WorkflowError) -> Self {
        Self {
            account: account.to_string(),
            status: AccountStatus::Aborted,
            workflows: Vec::new(),
            failure: Some(failure),
        }
    }

    pub fn count(&self, status: WorkflowStatus) -> usize {
        self.workflows.iter().filter(|w| w.status == status).count()
    }

    pub fn confirmed_transactions(&self) -> usize {
        self.workflows
            .iter()
            .map(WorkflowReport::confirmed_transactions)
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowEngine {
    delay: DelayRange,
}

impl WorkflowEngine {
    pub fn new(delay: DelayRange) -> Self {
        Self { delay }
    }

    /// Connects the account, then runs each workflow against the same context.
    ///
    /// `connect` covers the connectivity check and session setup; its failure
    /// aborts the account's pass.
    pub async fn run_account<Ctx, F, Fut>(
        &self,
        account: &str,
        connect: F,
        workflows: &[Workflow<Ctx>],
    ) -> AccountReport
    where
        Ctx: Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Ctx, WorkflowError>>,
    {
        let ctx = match connect().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(target: "task_result", account, outcome = e.kind(), "Account FAILED: {}", e);
                return AccountReport::aborted(account, e);
            }
        };

        let mut reports = Vec::with_capacity(workflows.len());
        for workflow in workflows {
            reports.push(self.run_workflow(account, workflow, &ctx).await);
        }

        AccountReport {
            account: account.to_string(),
            status: AccountStatus::Processed,
            workflows: reports,
            failure: None,
        }
    }

    pub async fn run_workflow<Ctx: Sync>(
        &self,
        account: &str,
        workflow: &Workflow<Ctx>,
        ctx: &Ctx,
    ) -> WorkflowReport {
        let name = workflow.name();

        for gate in &workflow.gates {
            let decision = gate.check(ctx).await;
            let skip_reason = match decision {
                Ok(GateDecision::Proceed) => {
                    debug!(account, workflow = name, gate = gate.name(), "Gate passed");
                    continue;
                }
                Ok(GateDecision::Skip { reason }) => reason,
                Err(e) if e.is_skip() => e.to_string(),
                Err(e) => {
                    warn!(
                        target: "task_result",
                        account,
                        workflow = name,
                        gate = gate.name(),
                        outcome = e.kind(),
                        "Gate FAILED: {}", e
                    );
                    MetricsCollector::global().record_workflow(WorkflowStatus::Aborted);
                    return WorkflowReport {
                        workflow: name.to_string(),
                        status: WorkflowStatus::Aborted,
                        steps: Vec::new(),
                        reason: Some(e.to_string()),
                    };
                }
            };

            warn!(
                target: "task_result",
                account,
                workflow = name,
                gate = gate.name(),
                outcome = "skipped",
                "Workflow SKIPPED: {}", skip_reason
            );
            MetricsCollector::global().record_workflow(WorkflowStatus::Skipped);
            return WorkflowReport {
                workflow: name.to_string(),
                status: WorkflowStatus::Skipped,
                steps: Vec::new(),
                reason: Some(skip_reason),
            };
        }

        let mut results = Vec::with_capacity(workflow.steps.len());
        let mut status = WorkflowStatus::Completed;
        let mut reason = None;
        let mut value_moved = false;

        let rounds = workflow.rounds.sample();
        'rounds: for round in 1..=rounds {
            if rounds > 1 {
                info!(account, workflow = name, "Round {} of {}", round, rounds);
            }

            for step in &workflow.steps {
                if step.moves_value() && value_moved {
                    let pause = self.delay.sample();
                    info!(account, workflow = name, "Waiting {}s before {}", pause.as_secs(), step.name());
                    tokio::time::sleep(pause).await;
                }

                let started = Instant::now();
                let result = step.run(ctx).await;
                MetricsCollector::global().record_step(step.name(), started.elapsed(), &result);

                match result {
                    Ok(outcome) => {
                        log_outcome(account, name, step.name(), &outcome);
                        if step.moves_value() && outcome.transaction().is_some() {
                            value_moved = true;
                        }
                        results.push(WorkflowStepResult {
                            step: step.name().to_string(),
                            success: true,
                            outcome: Some(outcome),
                            failure: None,
                        });
                    }
                    Err(e) => {
                        results.push(WorkflowStepResult {
                            step: step.name().to_string(),
                            success: false,
                            outcome: None,
                            failure: Some(e.clone()),
                        });

                        if e.is_skip() {
                            warn!(
                                target: "task_result",
                                account,
                                workflow = name,
                                step = step.name(),
                                outcome = "skipped",
                                "Step SKIPPED: {}", e
                            );
                            status = WorkflowStatus::Skipped;
                            reason = Some(e.to_string());
                            break 'rounds;
                        }

                        if step.optional() {
                            warn!(
                                target: "task_result",
                                account,
                                workflow = name,
                                step = step.name(),
                                outcome = e.kind(),
                                "Optional step Failed, continuing: {}", e
                            );
                            continue;
                        }

                        warn!(
                            target: "task_result",
                            account,
                            workflow = name,
                            step = step.name(),
                            outcome = e.kind(),
                            "Step FAILED: {}", e
                        );
                        status = WorkflowStatus::Aborted;
                        reason = Some(e.to_string());
                        break 'rounds;
                    }
                }
            }
        }

        MetricsCollector::global().record_workflow(status);
        WorkflowReport {
            workflow: name.to_string(),
            status,
            steps: results,
            reason,
        }
    }
}

fn log_outcome(account: &str, workflow: &str, step: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Confirmed(tx) => info!(
            target: "task_result",
            account,
            workflow,
            step,
            outcome = outcome.kind(),
            tx_hash = %tx.tx_hash,
            block = tx.block_number,
            "Step SUCCESS"
        ),
        StepOutcome::AlreadySatisfied { detail } | StepOutcome::Done { detail } => info!(
            target: "task_result",
            account,
            workflow,
            step,
            outcome = outcome.kind(),
            "Step SUCCESS: {}", detail
        ),
    }
}
