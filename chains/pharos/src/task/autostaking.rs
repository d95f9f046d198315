//! AutoStaking: MockUSD faucet plus AI-allocated stablecoin staking through
//! the staking router.

use crate::config::AutoStakingSettings;
use crate::task::common::{ApprovalAmount, Approve, RequireBalance, TokenAmount};
use crate::task::{parse_address, PharosWorkflow, TaskContext};
use crate::utils::abi::{decode_uint, encode_call};
use async_trait::async_trait;
use chrono::Utc;
use core_logic::{ConfigError, Step, StepOutcome, Workflow, WorkflowError};
use ethers::types::{Address, Bytes, U256};
use serde_json::{json, Value};
use std::fmt;

const USDC: &str = "0x72df0bcd7276f2dFbAc900D1CE63c272C4BCcCED";
const USDT: &str = "0xD4071393f8716661958F766DF660033b3d35fD29";
const MUSD: &str = "0x7F5e05460F927Ee351005534423917976F92495e";
const MV_MUSD: &str = "0xF1CF5D79bE4682D50f7A60A047eACa9bD351fF8e";
const STAKING_ROUTER: &str = "0x11cD3700B310339003641Fdce57c1f9BD21aE015";

const ORIGIN: &str = "https://autostaking.pro";
const REFERER: &str = "https://autostaking.pro/";

const PROFILE: &str = "1. Mandatory Requirement: The product's TVL must be higher than one million USD.\n\
2. Balance Preference: Prioritize products that have a good balance of high current APY and high TVL.\n\
3. Portfolio Allocation: Select the 3 products with the best combined ranking in terms of current APY and TVL among those with TVL > 1,000,000 USD. \
To determine the combined ranking, rank all eligible products by current APY (highest to lowest) and by TVL (highest to lowest), \
then sum the two ranks for each product. Choose the 3 products with the smallest sum of ranks. Allocate the investment equally among these 3 products, \
with each receiving approximately 33.3% of the investment.";

pub fn workflow(settings: &AutoStakingSettings) -> Result<PharosWorkflow, ConfigError> {
    let router = parse_address("autostaking.router", STAKING_ROUTER)?;
    let faucet = parse_address("autostaking.faucet", MV_MUSD)?;
    let assets = [
        TokenAmount::new("USDC", parse_address("autostaking.usdc", USDC)?, settings.amount),
        TokenAmount::new("USDT", parse_address("autostaking.usdt", USDT)?, settings.amount),
        TokenAmount::new("MockUSD", parse_address("autostaking.musd", MUSD)?, settings.amount),
    ];

    let mut workflow = Workflow::new("autostaking").step(ClaimFaucet::new(faucet));
    for asset in &assets {
        workflow = workflow.step(RequireBalance::new(asset.clone()));
    }
    for asset in &assets {
        workflow = workflow.step(Approve::new(asset.clone(), router, ApprovalAmount::Unlimited));
    }

    Ok(workflow.step(Stake {
        router,
        assets: assets.to_vec(),
        api_base: settings.api_base.trim_end_matches('/').to_string(),
        auth_token: settings.auth_token.clone(),
    }))
}

/// MockUSD faucet. Optional: a failed claim does not stop staking.
struct ClaimFaucet {
    faucet: Address,
}

impl ClaimFaucet {
    fn new(faucet: Address) -> Self {
        Self { faucet }
    }
}

#[async_trait]
impl Step<TaskContext> for ClaimFaucet {
    fn name(&self) -> &str {
        "claim_faucet"
    }

    fn optional(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let data = encode_call(
            "getNextFaucetClaimTime(address)",
            &[ethers::abi::Token::Address(ctx.address())],
        );
        let next_claim = decode_uint(&ctx.call(self.faucet, data).await?)?;
        let now = U256::from(Utc::now().timestamp().max(0) as u64);

        if now < next_claim {
            return Ok(StepOutcome::satisfied(format!(
                "faucet already claimed, next claim at {}",
                next_claim
            )));
        }

        let data = encode_call("claimFaucet()", &[]);
        let outcome = ctx.send(self.faucet, data, ctx.gas.limits().faucet).await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}

struct Stake {
    router: Address,
    assets: Vec<TokenAmount>,
    api_base: String,
    auth_token: String,
}

impl fmt::Debug for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stake")
            .field("router", &self.router)
            .field("api_base", &self.api_base)
            .field("auth_token", &"***REDACTED***")
            .finish()
    }
}

impl Stake {
    fn headers(&self) -> [(&str, &str); 3] {
        [
            ("Authorization", self.auth_token.as_str()),
            ("Origin", ORIGIN),
            ("Referer", REFERER),
        ]
    }
}

/// Portfolio recommendation request for equal amounts of each stablecoin.
pub fn recommendation_payload(user: Address, chain_id: u64, assets: &[TokenAmount]) -> Value {
    let user_assets: Vec<Value> = assets
        .iter()
        .map(|asset| {
            json!({
                "chain": { "id": chain_id },
                "name": asset.symbol,
                "symbol": asset.symbol,
                "decimals": 6,
                "address": format!("{:?}", asset.token),
                "assets": ((asset.amount * 1e6).floor() as u64).to_string(),
                "price": 1,
                "assetsUsd": asset.amount,
            })
        })
        .collect();

    json!({
        "user": format!("{:?}", user),
        "profile": PROFILE,
        "userPositions": [],
        "userAssets": user_assets,
        "chainIds": [chain_id],
        "tokens": assets.iter().map(|a| a.symbol.as_str()).collect::<Vec<_>>(),
        "protocols": ["MockVault"],
        "env": "pharos",
    })
}

/// Router calldata for `chain_id` out of a change-transactions response.
pub fn change_calldata(response: &Value, chain_id: u64) -> Result<Bytes, String> {
    let raw = response
        .get("data")
        .and_then(|d| d.get(chain_id.to_string()))
        .and_then(|c| c.get("data"))
        .and_then(Value::as_str)
        .ok_or_else(|| format!("no calldata for chain {}", chain_id))?;
    hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| format!("calldata is not hex: {}", e))
}

#[async_trait]
impl Step<TaskContext> for Stake {
    fn name(&self) -> &str {
        "stake"
    }

    fn moves_value(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let chain_id = ctx.rpc.chain_id();
        let headers = self.headers();

        let url = format!("{}/investment/financial-portfolio-recommendation", self.api_base);
        let payload = recommendation_payload(ctx.address(), chain_id, &self.assets);
        let recommendation = ctx.api.post_json(&url, &payload, &headers).await?;
        let changes = recommendation
            .get("data")
            .and_then(|d| d.get("changes"))
            .cloned()
            .ok_or_else(|| WorkflowError::service(&url, "recommendation has no changes"))?;

        let url = format!("{}/investment/generate-change-transactions", self.api_base);
        let body = json!({
            "user": format!("{:?}", ctx.address()),
            "changes": changes,
            "prevTransactionResults": {},
        });
        let transactions = ctx.api.post_json(&url, &body, &headers).await?;
        let calldata =
            change_calldata(&transactions, chain_id).map_err(|e| WorkflowError::service(&url, e))?;

        let outcome = ctx
            .send(self.router, calldata, ctx.gas.limits().staking)
            .await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}
