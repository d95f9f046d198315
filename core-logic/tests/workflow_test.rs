use async_trait::async_trait;
use core_logic::{
    AccountStatus, DelayRange, Gate, GateDecision, MetricsCollector, RoundRange, Step,
    StepOutcome, TransactionOutcome, Workflow, WorkflowEngine, WorkflowError, WorkflowStatus,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Ctx {
    calls: Mutex<Vec<String>>,
}

impl Ctx {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptStep {
    name: &'static str,
    moves_value: bool,
    optional: bool,
    result: Result<StepOutcome, WorkflowError>,
}

impl ScriptStep {
    fn ok(name: &'static str, outcome: StepOutcome) -> Self {
        Self {
            name,
            moves_value: false,
            optional: false,
            result: Ok(outcome),
        }
    }

    fn err(name: &'static str, error: WorkflowError) -> Self {
        Self {
            name,
            moves_value: false,
            optional: false,
            result: Err(error),
        }
    }

    fn value_moving(mut self) -> Self {
        self.moves_value = true;
        self
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[async_trait]
impl Step<Ctx> for ScriptStep {
    fn name(&self) -> &str {
        self.name
    }

    fn moves_value(&self) -> bool {
        self.moves_value
    }

    fn optional(&self) -> bool {
        self.optional
    }

    async fn run(&self, ctx: &Ctx) -> Result<StepOutcome, WorkflowError> {
        ctx.calls.lock().unwrap().push(self.name.to_string());
        self.result.clone()
    }
}

/// Confirms until its funds run out, then reports a shortfall.
struct DrainingStep {
    remaining: AtomicU32,
}

#[async_trait]
impl Step<Ctx> for DrainingStep {
    fn name(&self) -> &str {
        "trade"
    }

    async fn run(&self, ctx: &Ctx) -> Result<StepOutcome, WorkflowError> {
        ctx.calls.lock().unwrap().push("trade".to_string());
        match self.remaining.fetch_sub(1, Ordering::SeqCst) {
            0 => Err(shortfall()),
            left => Ok(confirmed(left as u64)),
        }
    }
}

struct FixedGate(GateDecision);

#[async_trait]
impl Gate<Ctx> for FixedGate {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn check(&self, _ctx: &Ctx) -> Result<GateDecision, WorkflowError> {
        Ok(self.0.clone())
    }
}

struct FailingGate;

#[async_trait]
impl Gate<Ctx> for FailingGate {
    fn name(&self) -> &str {
        "failing"
    }

    async fn check(&self, _ctx: &Ctx) -> Result<GateDecision, WorkflowError> {
        Err(WorkflowError::rpc("eth_getBalance", "timeout"))
    }
}

fn confirmed(block: u64) -> StepOutcome {
    StepOutcome::Confirmed(TransactionOutcome {
        tx_hash: format!("0x{:064x}", block),
        block_number: block,
    })
}

fn shortfall() -> WorkflowError {
    WorkflowError::InsufficientBalance {
        asset: "USDC".into(),
        required: "50".into(),
        available: "10".into(),
    }
}

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(DelayRange::NONE)
}

#[tokio::test]
async fn test_completed_workflow_records_every_step() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("buy")
        .step(ScriptStep::ok("balance", StepOutcome::done("100 >= 50")))
        .step(ScriptStep::ok("approve", StepOutcome::satisfied("allowance 1000")))
        .step(ScriptStep::ok("buy", confirmed(42)).value_moving());

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.steps.len(), 3);
    assert!(report.steps.iter().all(|s| s.success));
    assert_eq!(report.confirmed_transactions(), 1);
    assert_eq!(
        report.steps[1].outcome,
        Some(StepOutcome::satisfied("allowance 1000"))
    );
}

#[tokio::test]
async fn test_insufficient_balance_skips_value_moving_step() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("buy")
        .step(ScriptStep::err("balance", shortfall()))
        .step(ScriptStep::ok("buy", confirmed(1)).value_moving());

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Skipped);
    assert_eq!(ctx.calls(), vec!["balance"]);
    assert_eq!(report.steps[0].failure, Some(shortfall()));
    assert!(!report.steps[0].success);
}

#[tokio::test]
async fn test_fatal_failure_stops_only_current_workflow() {
    let ctx = Ctx::default();
    let failing = Workflow::new("kyc")
        .step(ScriptStep::err(
            "deploy",
            WorkflowError::SubmissionExhausted {
                attempts: 5,
                last_error: "rpc down".into(),
            },
        ))
        .step(ScriptStep::ok("claim", confirmed(2)));
    let healthy = Workflow::new("stake").step(ScriptStep::ok("stake", confirmed(3)));

    let report = engine()
        .run_account("0xabc", || async { Ok(ctx) }, &[failing, healthy])
        .await;

    assert_eq!(report.status, AccountStatus::Processed);
    assert_eq!(report.workflows[0].status, WorkflowStatus::Aborted);
    assert_eq!(report.workflows[0].steps.len(), 1);
    assert_eq!(report.workflows[1].status, WorkflowStatus::Completed);
    assert_eq!(report.count(WorkflowStatus::Aborted), 1);
    assert_eq!(report.confirmed_transactions(), 1);
}

#[tokio::test]
async fn test_gate_skip_runs_no_steps() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("kyc")
        .gate(FixedGate(GateDecision::skip("no native balance")))
        .step(ScriptStep::ok("deploy", confirmed(1)));

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Skipped);
    assert_eq!(report.reason.as_deref(), Some("no native balance"));
    assert!(ctx.calls().is_empty());
}

#[tokio::test]
async fn test_gate_error_aborts_and_is_counted() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("kyc")
        .gate(FailingGate)
        .step(ScriptStep::ok("deploy", confirmed(1)));
    let before = MetricsCollector::global().snapshot().workflows.aborted;

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Aborted);
    assert!(ctx.calls().is_empty());
    assert!(MetricsCollector::global().snapshot().workflows.aborted > before);
}

#[tokio::test]
async fn test_connect_failure_aborts_account() {
    let workflow = Workflow::new("buy").step(ScriptStep::ok("buy", confirmed(1)));
    let failure = WorkflowError::ConnectivityFailure {
        account: "0xabc".into(),
        attempts: 3,
    };

    let report = engine()
        .run_account(
            "0xabc",
            || async { Err::<Ctx, _>(failure.clone()) },
            &[workflow],
        )
        .await;

    assert_eq!(report.status, AccountStatus::Aborted);
    assert!(report.workflows.is_empty());
    assert_eq!(report.failure, Some(failure));
}

#[tokio::test]
async fn test_optional_step_failure_continues() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("stake")
        .step(ScriptStep::err("faucet", WorkflowError::rpc("eth_call", "reverted")).optional())
        .step(ScriptStep::ok("stake", confirmed(7)));

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(ctx.calls(), vec!["faucet", "stake"]);
    assert!(!report.steps[0].success);
}

#[tokio::test]
async fn test_delay_inserted_between_value_moving_steps() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("buy")
        .step(ScriptStep::ok("buy-1", confirmed(1)).value_moving())
        .step(ScriptStep::ok("approve", StepOutcome::satisfied("ok")))
        .step(ScriptStep::ok("buy-2", confirmed(2)).value_moving());

    let engine = WorkflowEngine::new(DelayRange::new(1, 1));
    let start = Instant::now();
    let report = engine.run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn test_repeated_workflow_runs_steps_every_round() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("trade")
        .repeat(RoundRange::fixed(3))
        .step(ScriptStep::ok("quote", StepOutcome::satisfied("ok")))
        .step(ScriptStep::ok("order", confirmed(3)));

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.steps.len(), 6);
    assert_eq!(report.confirmed_transactions(), 3);
    assert_eq!(
        ctx.calls(),
        vec!["quote", "order", "quote", "order", "quote", "order"]
    );
}

#[tokio::test]
async fn test_shortfall_mid_rounds_stops_remaining_rounds() {
    let ctx = Ctx::default();
    let workflow = Workflow::new("trade")
        .repeat(RoundRange::fixed(4))
        .step(DrainingStep {
            remaining: AtomicU32::new(1),
        })
        .step(ScriptStep::ok("log", StepOutcome::satisfied("ok")));

    let report = engine().run_workflow("0xabc", &workflow, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Skipped);
    assert_eq!(ctx.calls(), vec!["trade", "log", "trade"]);
    assert_eq!(report.confirmed_transactions(), 1);
    assert!(matches!(
        report.steps.last().and_then(|s| s.failure.clone()),
        Some(WorkflowError::InsufficientBalance { .. })
    ));
}
