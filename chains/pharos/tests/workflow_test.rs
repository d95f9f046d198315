mod common;

use async_trait::async_trait;
use common::{
    context, submitter, test_config, MockApi, MockRpc, MockSigner, ReceiptMode, BLOCK,
};
use core_logic::{
    AccountProcessor, AccountStatus, DelayRange, JsonService, Probe, ProxyPool, RoundRange,
    ServiceConnector, StepOutcome, WorkflowEngine, WorkflowError, WorkflowStatus,
};
use ethers::types::Address;
use pharos_project::account::{Account, AccountOrchestrator};
use pharos_project::config::SpoutSettings;
use pharos_project::task::{spout, PharosWorkflow};
use pharos_project::utils::{ChainRpc, RpcConnector};
use serde_json::json;
use std::sync::Arc;

const ACCOUNT: &str = "0x1111...1111";

fn spout_buy() -> PharosWorkflow {
    let settings = SpoutSettings {
        actions: vec!["buy".to_string()],
        trade_count: RoundRange::ONCE,
        usdc_amount: 50.0,
        ..SpoutSettings::default()
    };
    spout::workflows(&settings).unwrap().remove(0)
}

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(DelayRange::new(0, 0))
}

fn verified_chain(pending: u64, balance: u64, allowance: u64) -> MockRpc {
    MockRpc::new(pending)
        .with_token(balance, allowance)
        .with_kyc(Address::repeat_byte(0x44), 1)
}

#[tokio::test]
async fn test_buy_skips_covered_approval_and_submits_order() {
    let rpc = Arc::new(verified_chain(7, 100, 1000));
    let submitter = submitter();
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter.clone());
    submitter.nonces().seed(ctx.address(), 7).await;

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    let steps: Vec<&str> = report.steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(steps, vec!["require_balance_usdc", "approve_usdc", "buy_asset"]);
    assert!(matches!(
        report.steps[1].outcome,
        Some(StepOutcome::AlreadySatisfied { .. })
    ));
    match &report.steps[2].outcome {
        Some(StepOutcome::Confirmed(tx)) => assert_eq!(tx.block_number, BLOCK),
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(rpc.broadcast_nonces(), vec![7]);
    assert_eq!(submitter.nonces().current(ctx.address()).await, Some(8));
}

#[tokio::test]
async fn test_missing_allowance_is_approved_before_order() {
    let rpc = Arc::new(verified_chain(2, 100, 0));
    let submitter = submitter();
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter.clone());
    submitter.nonces().seed(ctx.address(), 2).await;

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Completed);
    assert_eq!(report.confirmed_transactions(), 2);
    assert_eq!(rpc.broadcast_nonces(), vec![2, 3]);
}

#[tokio::test]
async fn test_unconfirmed_order_is_not_resent_on_next_feed() {
    let rpc = Arc::new(verified_chain(7, 100, 1000).with_receipts(ReceiptMode::Unavailable));
    let submitter = submitter();
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter.clone());
    submitter.nonces().seed(ctx.address(), 7).await;

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Aborted);
    assert!(matches!(
        report.steps[2].failure,
        Some(WorkflowError::ConfirmationExhausted { .. })
    ));
    assert_eq!(rpc.broadcast_nonces(), vec![7]);
    assert_eq!(submitter.nonces().current(ctx.address()).await, Some(8));
}

#[tokio::test]
async fn test_reverted_order_falls_back_to_next_feed() {
    let rpc = Arc::new(verified_chain(7, 100, 1000).with_receipts(ReceiptMode::Reverted));
    let submitter = submitter();
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter.clone());
    submitter.nonces().seed(ctx.address(), 7).await;

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Aborted);
    assert!(matches!(
        report.steps[2].failure,
        Some(WorkflowError::TransactionReverted { .. })
    ));
    assert_eq!(rpc.broadcast_nonces(), vec![7, 8]);
}

#[tokio::test]
async fn test_balance_shortfall_skips_without_broadcasting() {
    let rpc = Arc::new(verified_chain(7, 10, 1000));
    let submitter = submitter();
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter.clone());
    submitter.nonces().seed(ctx.address(), 7).await;

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Skipped);
    assert_eq!(report.steps.len(), 1);
    assert!(matches!(
        report.steps[0].failure,
        Some(WorkflowError::InsufficientBalance { .. })
    ));
    assert_eq!(rpc.broadcast_attempts(), 0);
    assert_eq!(submitter.nonces().current(ctx.address()).await, Some(7));
}

#[tokio::test]
async fn test_buy_gated_on_kyc() {
    let rpc = Arc::new(MockRpc::new(0).with_token(100, 1000));
    let ctx = context(rpc.clone(), Arc::new(MockApi::ok(json!({}))), submitter());

    let report = engine().run_workflow(ACCOUNT, &spout_buy(), &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Skipped);
    assert!(report.steps.is_empty());
    assert!(report.reason.unwrap().contains("identity"));
    assert_eq!(rpc.broadcast_attempts(), 0);
}

#[tokio::test]
async fn test_kyc_signature_outage_aborts_claim() {
    let settings = SpoutSettings {
        actions: vec!["kyc".to_string()],
        ..SpoutSettings::default()
    };
    let kyc = spout::workflows(&settings).unwrap().remove(0);
    let rpc = Arc::new(MockRpc::new(0).with_kyc(Address::repeat_byte(0x44), 0));
    let api = Arc::new(MockApi::failing());
    let ctx = context(rpc.clone(), api.clone(), submitter());

    let report = engine().run_workflow(ACCOUNT, &kyc, &ctx).await;

    assert_eq!(report.status, WorkflowStatus::Aborted);
    assert!(matches!(
        report.steps[0].outcome,
        Some(StepOutcome::AlreadySatisfied { .. })
    ));
    assert!(matches!(
        report.steps[1].failure,
        Some(WorkflowError::ExternalServiceFailure { .. })
    ));
    assert_eq!(api.requests.lock().unwrap().len(), 1);
    assert_eq!(rpc.broadcast_attempts(), 0);
}

struct FixedProbe(bool);

#[async_trait]
impl Probe for FixedProbe {
    async fn check(&self, _proxy: Option<&str>) -> bool {
        self.0
    }
}

struct SharedRpc(Arc<MockRpc>);

impl RpcConnector for SharedRpc {
    fn connect(&self, _proxy: Option<&str>) -> Result<Arc<dyn ChainRpc>, WorkflowError> {
        Ok(self.0.clone())
    }
}

struct SharedApi(Arc<MockApi>);

impl ServiceConnector for SharedApi {
    fn connect(&self, _proxy: Option<&str>) -> Result<Arc<dyn JsonService>, WorkflowError> {
        Ok(self.0.clone())
    }
}

fn orchestrator(rpc: Arc<MockRpc>, reachable: bool) -> AccountOrchestrator {
    AccountOrchestrator::new(
        Arc::new(test_config()),
        Arc::new(ProxyPool::default()),
        Box::new(FixedProbe(reachable)),
        Box::new(SharedRpc(rpc)),
        Box::new(SharedApi(Arc::new(MockApi::ok(json!({}))))),
        submitter(),
        vec![spout_buy()],
    )
}

#[tokio::test]
async fn test_orchestrator_seeds_nonce_from_chain() {
    let rpc = Arc::new(verified_chain(7, 100, 1000));
    let orchestrator = orchestrator(rpc.clone(), true);
    let account = Account::new(Arc::new(MockSigner::new()));

    let report = orchestrator.process(&account).await;

    assert_eq!(report.status, AccountStatus::Processed);
    assert_eq!(report.count(WorkflowStatus::Completed), 1);
    assert_eq!(report.confirmed_transactions(), 1);
    assert_eq!(rpc.broadcast_nonces(), vec![7]);

    // Second pass continues from the tracked nonce.
    let report = orchestrator.process(&account).await;
    assert_eq!(report.confirmed_transactions(), 1);
    assert_eq!(rpc.broadcast_nonces(), vec![7, 8]);
}

#[tokio::test]
async fn test_unreachable_account_is_aborted_before_any_workflow() {
    let rpc = Arc::new(verified_chain(0, 100, 1000));
    let orchestrator = orchestrator(rpc.clone(), false);
    let account = Account::new(Arc::new(MockSigner::new()));

    let report = orchestrator.process(&account).await;

    assert_eq!(report.status, AccountStatus::Aborted);
    assert!(report.workflows.is_empty());
    assert!(matches!(
        report.failure,
        Some(WorkflowError::ConnectivityFailure { attempts: 1, .. })
    ));
    assert_eq!(rpc.broadcast_attempts(), 0);
}

#[tokio::test]
async fn test_proxy_assignment_is_keyed_by_full_address() {
    let rpc = Arc::new(verified_chain(0, 100, 1000));
    let mut config = test_config();
    config.proxy.enabled = true;
    let proxies = Arc::new(ProxyPool::new(["10.0.0.1:8080", "10.0.0.2:8080"]));
    let orchestrator = AccountOrchestrator::new(
        Arc::new(config),
        proxies.clone(),
        Box::new(FixedProbe(true)),
        Box::new(SharedRpc(rpc)),
        Box::new(SharedApi(Arc::new(MockApi::ok(json!({}))))),
        submitter(),
        Vec::new(),
    );
    let account = Account::new(Arc::new(MockSigner::new()));

    let report = orchestrator.process(&account).await;

    assert_eq!(report.status, AccountStatus::Processed);
    assert_eq!(
        proxies.current(&account.identity()).as_deref(),
        Some("http://10.0.0.1:8080")
    );
    assert_eq!(proxies.current(&account.id()), None);
}
