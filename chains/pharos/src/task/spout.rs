//! Spout Finance: on-chain identity, KYC claim, and RWA buy/sell orders.

use crate::config::SpoutSettings;
use crate::task::common::{ApprovalAmount, Approve, NativeBalanceGate, RequireBalance, TokenAmount};
use crate::task::{parse_address, PharosWorkflow, TaskContext};
use crate::utils::abi::{decode_address, decode_bytes32_array, encode_call, pack_signature};
use async_trait::async_trait;
use core_logic::{ConfigError, Gate, GateDecision, Step, StepOutcome, Workflow, WorkflowError};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};
use tracing::{debug, warn};

const FACTORY: &str = "0x18cB5F2774a80121d1067007933285B32516226a";
const GATEWAY: &str = "0x126F0c11F3e5EafE37AB143D4AA688429ef7DCB3";
const ORDERS: &str = "0x81b33972f8bdf14fD7968aC99CAc59BcaB7f4E9A";
const USDC: &str = "0x72df0bcd7276f2dFbAc900D1CE63c272C4BCcCED";
const SLQD: &str = "0x54b753555853ce22f66Ac8cB8e324EB607C4e4eE";
const ISSUER: &str = "0xA5C77b623BEB3bC0071fA568de99e15Ccc06C7cb";

const KYC_TOPIC: u64 = 1;
const CLAIM_SCHEME: u64 = 1;
const CLAIM_DATA: &str = "KYC passed";
const COUNTRY_CODE: u64 = 91;
const ASSET_TICKER: &str = "LQD";
/// Price feeds tried in order until one order goes through.
const FEED_IDS: [u64; 2] = [2_000_002, 2_000_001];

#[derive(Debug, Clone, Copy)]
struct SpoutContracts {
    factory: Address,
    gateway: Address,
    orders: Address,
    usdc: Address,
    slqd: Address,
    issuer: Address,
}

impl SpoutContracts {
    fn pharos() -> Result<Self, ConfigError> {
        Ok(Self {
            factory: parse_address("spout.factory", FACTORY)?,
            gateway: parse_address("spout.gateway", GATEWAY)?,
            orders: parse_address("spout.orders", ORDERS)?,
            usdc: parse_address("spout.usdc", USDC)?,
            slqd: parse_address("spout.slqd", SLQD)?,
            issuer: parse_address("spout.issuer", ISSUER)?,
        })
    }
}

/// `spout_kyc`, `spout_buy` and `spout_sell`, in the configured action order.
pub fn workflows(settings: &SpoutSettings) -> Result<Vec<PharosWorkflow>, ConfigError> {
    let contracts = SpoutContracts::pharos()?;
    let mut workflows = Vec::new();

    for action in &settings.actions {
        match action.as_str() {
            "kyc" => workflows.push(
                Workflow::new("spout_kyc")
                    .gate(NativeBalanceGate)
                    .step(DeployIdentity::new(contracts.factory, contracts.gateway))
                    .step(AddKycClaim::new(
                        contracts.factory,
                        contracts.issuer,
                        &settings.api_base,
                    )),
            ),
            "buy" => {
                let usdc = TokenAmount::new("USDC", contracts.usdc, settings.usdc_amount);
                workflows.push(
                    Workflow::new("spout_buy")
                        .repeat(settings.trade_count)
                        .gate(KycVerifiedGate::new(contracts.factory))
                        .step(RequireBalance::new(usdc.clone()))
                        .step(Approve::new(usdc.clone(), contracts.orders, ApprovalAmount::Exact))
                        .step(Order::buy(contracts.orders, contracts.slqd, usdc)),
                );
            }
            "sell" => {
                let slqd = TokenAmount::new("SLQD", contracts.slqd, settings.slqd_amount);
                workflows.push(
                    Workflow::new("spout_sell")
                        .repeat(settings.trade_count)
                        .gate(KycVerifiedGate::new(contracts.factory))
                        .step(RequireBalance::new(slqd.clone()))
                        .step(Approve::new(slqd.clone(), contracts.orders, ApprovalAmount::Exact))
                        .step(Order::sell(contracts.orders, contracts.slqd, slqd)),
                );
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "spout.actions".to_string(),
                    reason: format!("unknown action '{}'", other),
                })
            }
        }
    }

    Ok(workflows)
}

/// Identity registered for the account, zero address when none.
async fn read_identity(ctx: &TaskContext, factory: Address) -> Result<Address, WorkflowError> {
    if let Some(identity) = ctx.identities.get(ctx.address()) {
        return Ok(identity);
    }

    let data = encode_call("getIdentity(address)", &[Token::Address(ctx.address())]);
    let identity = decode_address(&ctx.call(factory, data).await?)?;
    if !identity.is_zero() {
        ctx.identities.insert(ctx.address(), identity);
    }
    Ok(identity)
}

async fn kyc_claims(ctx: &TaskContext, identity: Address) -> Result<usize, WorkflowError> {
    let data = encode_call(
        "getClaimIdsByTopic(uint256)",
        &[Token::Uint(U256::from(KYC_TOPIC))],
    );
    Ok(decode_bytes32_array(&ctx.call(identity, data).await?)?.len())
}

pub struct DeployIdentity {
    factory: Address,
    gateway: Address,
}

impl DeployIdentity {
    pub fn new(factory: Address, gateway: Address) -> Self {
        Self { factory, gateway }
    }
}

#[async_trait]
impl Step<TaskContext> for DeployIdentity {
    fn name(&self) -> &str {
        "deploy_identity"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let existing = read_identity(ctx, self.factory).await?;
        if !existing.is_zero() {
            return Ok(StepOutcome::satisfied(format!("identity {:?} already exists", existing)));
        }

        let data = encode_call(
            "deployIdentityForWallet(address)",
            &[Token::Address(ctx.address())],
        );
        let outcome = ctx
            .send(self.gateway, data, ctx.gas.limits().deploy_identity)
            .await?;

        let identity = read_identity(ctx, self.factory).await?;
        if identity.is_zero() {
            return Err(WorkflowError::precondition(format!(
                "no identity registered after {}",
                outcome.tx_hash
            )));
        }
        debug!("Identity {:?} deployed", identity);
        Ok(StepOutcome::Confirmed(outcome))
    }
}

/// Issuer-signed claim returned by the KYC signature endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct KycSignature {
    pub signature: Bytes,
    pub issuer: Address,
    pub data: Bytes,
    pub topic: u64,
}

impl KycSignature {
    /// Missing issuer, data hash or topic fall back to the Spout defaults.
    pub fn from_response(response: &Value, default_issuer: Address) -> Result<Self, WorkflowError> {
        let invalid = |reason: &str| WorkflowError::service("spout kyc-signature", reason);

        let sig = response
            .get("signature")
            .ok_or_else(|| invalid("response has no signature"))?;
        let r = sig.get("r").and_then(Value::as_str).ok_or_else(|| invalid("signature has no r"))?;
        let s = sig.get("s").and_then(Value::as_str).ok_or_else(|| invalid("signature has no s"))?;
        let v = sig.get("v").and_then(Value::as_u64).ok_or_else(|| invalid("signature has no v"))?;

        let issuer = match response.get("issuerAddress").and_then(Value::as_str) {
            Some(raw) => raw.parse().map_err(|_| invalid("issuerAddress is not an address"))?,
            None => default_issuer,
        };

        let data = match response.get("dataHash").and_then(Value::as_str) {
            Some(raw) => hex::decode(raw.trim_start_matches("0x"))
                .map(Bytes::from)
                .map_err(|_| invalid("dataHash is not hex"))?,
            None => Bytes::from(keccak256(CLAIM_DATA.as_bytes()).to_vec()),
        };

        Ok(Self {
            signature: pack_signature(r, s, v)?,
            issuer,
            data,
            topic: response.get("topic").and_then(Value::as_u64).unwrap_or(KYC_TOPIC),
        })
    }
}

pub struct AddKycClaim {
    factory: Address,
    issuer: Address,
    endpoint: String,
}

impl AddKycClaim {
    pub fn new(factory: Address, issuer: Address, api_base: &str) -> Self {
        Self {
            factory,
            issuer,
            endpoint: format!("{}/kyc-signature", api_base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Step<TaskContext> for AddKycClaim {
    fn name(&self) -> &str {
        "add_kyc_claim"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let identity = read_identity(ctx, self.factory).await?;
        if identity.is_zero() {
            return Err(WorkflowError::precondition("account has no on-chain identity"));
        }

        let claims = kyc_claims(ctx, identity).await?;
        if claims > 0 {
            return Ok(StepOutcome::satisfied(format!("{} KYC claim(s) already on {:?}", claims, identity)));
        }

        let body = json!({
            "userAddress": format!("{:?}", ctx.address()),
            "onchainIDAddress": format!("{:?}", identity),
            "claimData": CLAIM_DATA,
            "topic": KYC_TOPIC,
            "countryCode": COUNTRY_CODE,
        });
        let response = ctx.api.post_json(&self.endpoint, &body, &[]).await?;
        let claim = KycSignature::from_response(&response, self.issuer)?;

        let data = encode_call(
            "addClaim(uint256,uint256,address,bytes,bytes,string)",
            &[
                Token::Uint(U256::from(claim.topic)),
                Token::Uint(U256::from(CLAIM_SCHEME)),
                Token::Address(claim.issuer),
                Token::Bytes(claim.signature.to_vec()),
                Token::Bytes(claim.data.to_vec()),
                Token::String(String::new()),
            ],
        );
        let outcome = ctx.send(identity, data, ctx.gas.limits().add_claim).await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}

/// Passes once the account has an identity with at least one KYC claim.
pub struct KycVerifiedGate {
    factory: Address,
}

impl KycVerifiedGate {
    pub fn new(factory: Address) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl Gate<TaskContext> for KycVerifiedGate {
    fn name(&self) -> &str {
        "kyc_verified"
    }

    async fn check(&self, ctx: &TaskContext) -> Result<GateDecision, WorkflowError> {
        let identity = read_identity(ctx, self.factory).await?;
        if identity.is_zero() {
            return Ok(GateDecision::skip("no identity found, complete KYC first"));
        }
        if kyc_claims(ctx, identity).await? == 0 {
            return Ok(GateDecision::skip("no KYC claim found, complete KYC first"));
        }
        Ok(GateDecision::Proceed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

/// `buyAsset` pays USDC for SLQD, `sellAsset` returns SLQD for USDC.
pub struct Order {
    side: Side,
    orders: Address,
    token: Address,
    amount: TokenAmount,
}

impl Order {
    pub fn buy(orders: Address, token: Address, usdc: TokenAmount) -> Self {
        Self {
            side: Side::Buy,
            orders,
            token,
            amount: usdc,
        }
    }

    pub fn sell(orders: Address, token: Address, slqd: TokenAmount) -> Self {
        Self {
            side: Side::Sell,
            orders,
            token,
            amount: slqd,
        }
    }

    fn signature(&self) -> &'static str {
        match self.side {
            Side::Buy => "buyAsset(uint256,string,address,uint256)",
            Side::Sell => "sellAsset(uint256,string,address,uint256)",
        }
    }
}

#[async_trait]
impl Step<TaskContext> for Order {
    fn name(&self) -> &str {
        match self.side {
            Side::Buy => "buy_asset",
            Side::Sell => "sell_asset",
        }
    }

    fn moves_value(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let (amount, _) = self.amount.resolve(ctx).await?;

        let mut last_error = None;
        for feed_id in FEED_IDS {
            let data = encode_call(
                self.signature(),
                &[
                    Token::Uint(U256::from(feed_id)),
                    Token::String(ASSET_TICKER.to_string()),
                    Token::Address(self.token),
                    Token::Uint(amount),
                ],
            );
            match ctx.send(self.orders, data, ctx.gas.limits().trade).await {
                Ok(outcome) => return Ok(StepOutcome::Confirmed(outcome)),
                Err(e) if feed_rejected(&e) => {
                    warn!("{} with feed {} failed: {}", self.name(), feed_id, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| WorkflowError::precondition("no price feed configured")))
    }
}

/// Only an order that never landed or landed reverted may be retried on
/// another feed. Anything else may still confirm with its nonce consumed.
fn feed_rejected(error: &WorkflowError) -> bool {
    matches!(
        error,
        WorkflowError::TransactionReverted { .. } | WorkflowError::SubmissionExhausted { .. }
    )
}
